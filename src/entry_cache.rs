use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{read_json, write_json, Storage};

pub const DEFAULT_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// Capped id -> value map persisted under one storage key.
///
/// Writers are serialized so concurrent inserts merge instead of
/// overwriting each other. Once over `max_entries` the least recently
/// written entries are dropped.
pub struct EntryCache<V> {
    storage: Arc<dyn Storage>,
    key: &'static str,
    max_entries: usize,
    write_lock: Mutex<()>,
    _value: PhantomData<fn() -> V>,
}

impl<V> EntryCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn new(storage: Arc<dyn Storage>, key: &'static str, max_entries: usize) -> Self {
        Self {
            storage,
            key,
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
            _value: PhantomData,
        }
    }

    async fn read(&self) -> HashMap<String, CachedEntry<V>> {
        read_json(self.storage.as_ref(), self.key)
            .await
            .unwrap_or_default()
    }

    pub async fn get(&self, id: &str) -> Option<V> {
        self.read().await.remove(id).map(|entry| entry.value)
    }

    pub async fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> HashMap<String, V> {
        let mut entries = self.read().await;
        ids.into_iter()
            .filter_map(|id| entries.remove(id).map(|entry| (id.to_string(), entry.value)))
            .collect()
    }

    pub async fn insert(&self, id: &str, value: V) {
        self.insert_many(vec![(id.to_string(), value)]).await;
    }

    pub async fn insert_many(&self, values: Vec<(String, V)>) {
        if values.is_empty() {
            return;
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.read().await;
        let cached_at = Utc::now();
        for (id, value) in values {
            entries.insert(id, CachedEntry { value, cached_at });
        }

        if entries.len() > self.max_entries {
            let mut ordered: Vec<(String, CachedEntry<V>)> = entries.into_iter().collect();
            ordered.sort_by(|(a_id, a), (b_id, b)| {
                b.cached_at.cmp(&a.cached_at).then_with(|| a_id.cmp(b_id))
            });
            ordered.truncate(self.max_entries);
            entries = ordered.into_iter().collect();
            debug!("Trimmed '{}' to {} entries", self.key, entries.len());
        }

        write_json(self.storage.as_ref(), self.key, &entries).await;
    }

    pub async fn len(&self) -> usize {
        self.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
