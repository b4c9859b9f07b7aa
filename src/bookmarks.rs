use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::feed_cache::FeedCache;
use crate::models::FeedItem;
use crate::storage::{keys, read_string_list, write_json, Storage};

const EVENT_CAPACITY: usize = 64;

/// Emitted after every bookmark mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEvent {
    pub feed_id: String,
    pub bookmarked: bool,
}

/// Persisted, ordered set of bookmarked feed ids (most recently added first).
///
/// The items themselves live in the [`FeedCache`]; a bookmark whose item was
/// evicted simply drops out of [`BookmarkStore::list`] until it is fetched again.
pub struct BookmarkStore {
    storage: Arc<dyn Storage>,
    cache: Arc<FeedCache>,
    events: broadcast::Sender<BookmarkEvent>,
    write_lock: Mutex<()>,
}

impl BookmarkStore {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<FeedCache>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            cache,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// Receive a [`BookmarkEvent`] for every subsequent toggle.
    pub fn subscribe(&self) -> broadcast::Receiver<BookmarkEvent> {
        self.events.subscribe()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids = read_string_list(self.storage.as_ref(), keys::BOOKMARKS).await;
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        ids
    }

    pub async fn is_bookmarked(&self, feed_id: &str) -> bool {
        self.ids().await.iter().any(|id| id == feed_id)
    }

    /// Add or remove the item. Returns whether it is bookmarked afterwards.
    pub async fn toggle(&self, item: &FeedItem) -> bool {
        let _guard = self.write_lock.lock().await;
        let mut ids = self.ids().await;

        let bookmarked = if let Some(pos) = ids.iter().position(|id| *id == item.id) {
            ids.remove(pos);
            false
        } else {
            self.cache.put(std::slice::from_ref(item)).await;
            ids.insert(0, item.id.clone());
            true
        };

        write_json(self.storage.as_ref(), keys::BOOKMARKS, &ids).await;
        info!(
            "Feed '{}' {}",
            item.id,
            if bookmarked { "bookmarked" } else { "unbookmarked" }
        );

        // No subscribers is fine
        let _ = self.events.send(BookmarkEvent {
            feed_id: item.id.clone(),
            bookmarked,
        });

        bookmarked
    }

    /// Bookmarked items still present in the cache, most recent first.
    pub async fn list(&self) -> Vec<FeedItem> {
        let ids = self.ids().await;
        self.cache.get_by_ids(&ids).await
    }

    pub async fn count(&self) -> usize {
        self.ids().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn create_item(id: &str) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            category_id: "3".to_string(),
            title: format!("Title {}", id),
            excerpt: String::new(),
            content: String::new(),
            image_url: None,
            published_at: Utc::now(),
            source: "example.com".to_string(),
            link: Some(format!("https://example.com/{}", id)),
        }
    }

    fn create_store() -> (BookmarkStore, Arc<MemoryStorage>, Arc<FeedCache>) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(FeedCache::new(storage.clone(), 300));
        (
            BookmarkStore::new(storage.clone(), cache.clone()),
            storage,
            cache,
        )
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (store, _, _) = create_store();
        let item = create_item("a");

        assert!(store.toggle(&item).await);
        assert!(store.is_bookmarked("a").await);

        assert!(!store.toggle(&item).await);
        assert!(!store.is_bookmarked("a").await);
    }

    #[tokio::test]
    async fn test_double_toggle_restores_membership() {
        let (store, _, _) = create_store();
        store.toggle(&create_item("keep")).await;

        let item = create_item("x");
        let before = store.ids().await;
        store.toggle(&item).await;
        store.toggle(&item).await;
        assert_eq!(store.ids().await, before);
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let (store, _, _) = create_store();
        for id in ["a", "b", "c"] {
            store.toggle(&create_item(id)).await;
        }

        let listed: Vec<String> = store.list().await.into_iter().map(|i| i.id).collect();
        assert_eq!(listed, vec!["c", "b", "a"]);
        assert_eq!(store.count().await, 3);
    }

    #[tokio::test]
    async fn test_toggle_caches_item() {
        let (store, _, cache) = create_store();
        store.toggle(&create_item("a")).await;
        assert!(cache.get_by_id("a").await.is_some());
    }

    #[tokio::test]
    async fn test_evicted_item_drops_out_of_list() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(FeedCache::new(storage.clone(), 1));
        let store = BookmarkStore::new(storage.clone(), cache.clone());

        let mut old = create_item("old");
        old.published_at = Utc::now() - chrono::Duration::days(3);
        store.toggle(&old).await;
        store.toggle(&create_item("new")).await;

        assert_eq!(store.count().await, 2);
        let listed: Vec<String> = store.list().await.into_iter().map(|i| i.id).collect();
        assert_eq!(listed, vec!["new"]);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let (store, _, _) = create_store();
        let mut rx = store.subscribe();
        let item = create_item("a");

        store.toggle(&item).await;
        store.toggle(&item).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            BookmarkEvent {
                feed_id: "a".to_string(),
                bookmarked: true
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            BookmarkEvent {
                feed_id: "a".to_string(),
                bookmarked: false
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_bookmarks_read_as_empty() {
        let (store, storage, _) = create_store();
        storage.put(keys::BOOKMARKS, "{{{").await.unwrap();

        assert!(store.ids().await.is_empty());
        assert!(store.toggle(&create_item("a")).await);
        assert_eq!(store.ids().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_on_disk_are_collapsed() {
        let (store, storage, _) = create_store();
        storage
            .put(keys::BOOKMARKS, r#"["a", "b", "a"]"#)
            .await
            .unwrap();
        assert_eq!(store.ids().await, vec!["a", "b"]);
    }
}
