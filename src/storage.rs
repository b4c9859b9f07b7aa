//! Key/value persistence used by the session, caches and bookmarks.
//!
//! Every store in the crate talks to an injected [`Storage`] so it can run
//! against SQLite in the service and an in-memory map in tests. Reads are
//! tolerant: missing keys, backend failures and corrupt JSON all read as
//! "absent". Writes are best-effort and only logged when they fail.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::NewsResult;

/// Namespaced keys for everything the service persists.
pub mod keys {
    pub const SELECTED_CATEGORIES: &str = "dailyTrends.selectedCategories";
    pub const ENTERED_HOME: &str = "dailyTrends.enteredHome";
    pub const BOOKMARKS: &str = "dailyTrends.bookmarks";
    pub const FEED_CACHE: &str = "dailyTrends.feedCache";
    pub const ARTICLE_CONTENT: &str = "dailyTrends.fullArticleContent.v4";
    pub const SUMMARY_CACHE: &str = "dailyTrends.sarvamSummary.v3";
    pub const FEED_TRANSLATION: &str = "dailyTrends.feedTranslation.v2";
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> NewsResult<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> NewsResult<()>;

    async fn delete(&self, key: &str) -> NewsResult<()>;
}

/// Read and decode a JSON value. Anything unreadable is treated as absent.
pub async fn read_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let raw = match storage.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read '{}': {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring corrupt value under '{}': {}", key, e);
            None
        }
    }
}

pub async fn write_json<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to encode '{}': {}", key, e);
            return;
        }
    };

    if let Err(e) = storage.put(key, &raw).await {
        warn!("Failed to persist '{}': {}", key, e);
    }
}

pub async fn read_string_list(storage: &dyn Storage, key: &str) -> Vec<String> {
    read_json::<Vec<serde_json::Value>>(storage, key)
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> NewsResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> NewsResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> NewsResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(database_url: &str) -> NewsResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> NewsResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn keys(&self) -> NewsResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get(&self, key: &str) -> NewsResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str) -> NewsResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> NewsResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
