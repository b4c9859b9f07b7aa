use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::chat::{extract_json_object, ChatClient};
use crate::entry_cache::EntryCache;
use crate::error::{NewsError, NewsResult};
use crate::models::FeedItem;
use crate::storage::{keys, Storage};
use crate::text::{cap_chars, collapse_whitespace, take_chars};

pub const BATCH_LIMIT: usize = 15;
const TITLE_INPUT_LIMIT: usize = 220;
const EXCERPT_INPUT_LIMIT: usize = 420;
const TITLE_OUTPUT_LIMIT: usize = 180;
const EXCERPT_OUTPUT_LIMIT: usize = 260;

const SYSTEM_PROMPT: &str = "You are an expert multilingual editor. Translate feed content accurately and return strict JSON only.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTranslation {
    pub title: String,
    pub excerpt: String,
}

#[derive(Debug, Serialize)]
struct PendingFeed {
    id: String,
    title: String,
    excerpt: String,
}

#[derive(Debug, PartialEq)]
struct TranslatedRow {
    id: String,
    title: String,
    excerpt: String,
}

/// Translates feed titles and excerpts to English in batches.
pub struct FeedTranslator {
    chat: Arc<ChatClient>,
    cache: EntryCache<FeedTranslation>,
}

impl FeedTranslator {
    pub fn new(chat: Arc<ChatClient>, storage: Arc<dyn Storage>, max_entries: usize) -> Self {
        Self {
            chat,
            cache: EntryCache::new(storage, keys::FEED_TRANSLATION, max_entries),
        }
    }

    /// Translate up to [`BATCH_LIMIT`] feeds, keyed by feed id.
    ///
    /// Cached translations are served without a request. Unlike
    /// summarization this fails loudly: a missing key, a bad reply or a
    /// reply that skips a feed is an error and nothing new is cached.
    pub async fn translate_batch(
        &self,
        feeds: &[FeedItem],
    ) -> NewsResult<HashMap<String, FeedTranslation>> {
        let batch = &feeds[..feeds.len().min(BATCH_LIMIT)];
        if batch.is_empty() {
            return Ok(HashMap::new());
        }

        let mut resolved = self
            .cache
            .get_many(batch.iter().map(|feed| feed.id.as_str()))
            .await;
        let pending: Vec<&FeedItem> = batch
            .iter()
            .filter(|feed| !resolved.contains_key(&feed.id))
            .collect();
        if pending.is_empty() {
            return Ok(resolved);
        }

        if !self.chat.is_enabled() {
            return Err(NewsError::MissingConfig("chat API key"));
        }

        let payload: Vec<PendingFeed> = pending
            .iter()
            .map(|feed| PendingFeed {
                id: feed.id.clone(),
                title: take_chars(&feed.title, TITLE_INPUT_LIMIT),
                excerpt: take_chars(&feed.excerpt, EXCERPT_INPUT_LIMIT),
            })
            .collect();
        let prompt = build_prompt(&serde_json::to_string(&payload)?);

        let pending_count = pending.len();
        let raw = self.chat.complete(SYSTEM_PROMPT, &prompt, 0.1, 1600).await?;
        let rows: HashMap<String, TranslatedRow> = parse_batch_payload(&raw)?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let mut translated = Vec::with_capacity(pending_count);
        for feed in pending {
            let row = rows.get(&feed.id).ok_or_else(|| {
                NewsError::Parse(format!("Translation missing item for feed {}", feed.id))
            })?;
            let item = FeedTranslation {
                title: normalize_single_line(&row.title, &feed.title, TITLE_OUTPUT_LIMIT),
                excerpt: normalize_single_line(&row.excerpt, &feed.excerpt, EXCERPT_OUTPUT_LIMIT),
            };
            resolved.insert(feed.id.clone(), item.clone());
            translated.push((feed.id.clone(), item));
        }

        self.cache.insert_many(translated).await;
        info!("Translated {} feeds", pending_count);
        Ok(resolved)
    }
}

fn build_prompt(items_json: &str) -> String {
    [
        "Translate each feed item into natural English.",
        "If already English, lightly polish while preserving original meaning.",
        "Do not add facts, bullet points, or markdown.",
        "Return valid JSON only in this exact schema:",
        r#"{"items":[{"id":"<same id>","title":"...","excerpt":"..."}]}"#,
        "",
        "Feed items:",
        items_json,
    ]
    .join("\n")
}

fn parse_batch_payload(text: &str) -> NewsResult<Vec<TranslatedRow>> {
    let json = extract_json_object(text)
        .ok_or_else(|| NewsError::Parse("Translation response is not valid JSON".to_string()))?;
    let parsed: Value = serde_json::from_str(json)?;
    let items = parsed
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| NewsError::Parse("Translation response has no items array".to_string()))?;

    let text_field = |row: &Value, key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(items
        .iter()
        .filter_map(|row| {
            let id = row.get("id")?.as_str()?.trim();
            if id.is_empty() {
                return None;
            }
            Some(TranslatedRow {
                id: id.to_string(),
                title: text_field(row, "title"),
                excerpt: text_field(row, "excerpt"),
            })
        })
        .collect())
}

/// Collapse to one line, use `fallback` when blank, and cap the length.
pub fn normalize_single_line(value: &str, fallback: &str, max_chars: usize) -> String {
    let clean = collapse_whitespace(value);
    let base = if clean.is_empty() { fallback } else { clean.as_str() };
    cap_chars(base, max_chars)
}
