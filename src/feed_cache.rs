use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::models::FeedItem;
use crate::storage::{keys, read_json, write_json, Storage};

pub const DEFAULT_MAX_ITEMS: usize = 300;

/// Capped id -> item cache so a feed can be reopened without re-fetching.
///
/// The cache is never a source of truth: failed reads look like an empty
/// cache and failed writes are dropped.
pub struct FeedCache {
    storage: Arc<dyn Storage>,
    max_items: usize,
    write_lock: Mutex<()>,
}

impl FeedCache {
    pub fn new(storage: Arc<dyn Storage>, max_items: usize) -> Self {
        Self {
            storage,
            max_items,
            write_lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> HashMap<String, FeedItem> {
        read_json(self.storage.as_ref(), keys::FEED_CACHE)
            .await
            .unwrap_or_default()
    }

    /// Merge items by id, then keep only the newest `max_items` by publish date.
    pub async fn put(&self, items: &[FeedItem]) {
        if items.is_empty() {
            return;
        }

        // Concurrent category fetches all land here
        let _guard = self.write_lock.lock().await;
        let mut cache = self.read().await;
        for item in items {
            cache.insert(item.id.clone(), item.clone());
        }

        let retained = evict_oldest(cache, self.max_items);
        debug!("Feed cache now holds {} items", retained.len());
        write_json(self.storage.as_ref(), keys::FEED_CACHE, &retained).await;
    }

    pub async fn get_by_id(&self, feed_id: &str) -> Option<FeedItem> {
        self.read().await.remove(feed_id)
    }

    /// Resolve ids in the given order, skipping any that are not cached.
    pub async fn get_by_ids(&self, feed_ids: &[String]) -> Vec<FeedItem> {
        let mut cache = self.read().await;
        feed_ids.iter().filter_map(|id| cache.remove(id)).collect()
    }

    pub async fn len(&self) -> usize {
        self.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict_oldest(cache: HashMap<String, FeedItem>, max_items: usize) -> HashMap<String, FeedItem> {
    if cache.len() <= max_items {
        return cache;
    }

    let mut entries: Vec<(String, FeedItem)> = cache.into_iter().collect();
    entries.sort_by(|(a_id, a), (b_id, b)| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a_id.cmp(b_id))
    });
    entries.truncate(max_items);
    entries.into_iter().collect()
}
