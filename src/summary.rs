//! Optional summarization of readable article content.
//!
//! Summaries are an enhancement only: a missing API key, a failed request or
//! an unusable reply all yield the unsummarized content and original title.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chat::{extract_json_object, ChatClient};
use crate::entry_cache::EntryCache;
use crate::error::NewsResult;
use crate::storage::{keys, Storage};
use crate::text::{
    cap_chars, collapse_whitespace, decode_entities, escape_html, split_sentences, strip_html,
    take_chars,
};

const MAX_INPUT_CHARS: usize = 12_000;
const TITLE_LIMIT: usize = 80;
const PARAGRAPH_TARGET: usize = 170;
const MULTI_PARAGRAPH_THRESHOLD: usize = 600;
const MIN_PARAGRAPH: usize = 150;

const SYSTEM_PROMPT: &str =
    "You are an expert news editor. Return only polished English summary paragraphs.";

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph pattern is valid"));

static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\n)\s*title\s*:\s*(.+)").expect("title pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub title: String,
    pub summary_html: String,
}

pub struct Summarizer {
    chat: Arc<ChatClient>,
    cache: EntryCache<ArticleSummary>,
}

impl Summarizer {
    pub fn new(chat: Arc<ChatClient>, storage: Arc<dyn Storage>, max_entries: usize) -> Self {
        Self {
            chat,
            cache: EntryCache::new(storage, keys::SUMMARY_CACHE, max_entries),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.chat.is_enabled()
    }

    /// Summarize an article, caching successful results by article id.
    pub async fn summarize(&self, article_id: &str, title: &str, html: &str) -> ArticleSummary {
        let original = || ArticleSummary {
            title: title.to_string(),
            summary_html: html.to_string(),
        };

        if !self.chat.is_enabled() {
            return original();
        }

        if let Some(cached) = self.cache.get(article_id).await {
            debug!("Summary cache hit for {}", article_id);
            return cached;
        }

        let plain = html_to_plain_text(html);
        if plain.is_empty() {
            return original();
        }

        let summary = match self.request_summary(title, &plain).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarization failed for '{}': {}", article_id, e);
                return original();
            }
        };

        info!("Summarized article '{}'", article_id);
        self.cache.insert(article_id, summary.clone()).await;
        summary
    }

    async fn request_summary(&self, title: &str, plain: &str) -> NewsResult<ArticleSummary> {
        let prompt = build_prompt(title, &take_chars(plain, MAX_INPUT_CHARS));
        let raw = self.chat.complete(SYSTEM_PROMPT, &prompt, 0.2, 700).await?;

        let (refined_title, summary_text) = parse_refined_payload(&raw, title);
        let refined_title = match refined_title.trim() {
            "" => cap_chars(title, TITLE_LIMIT),
            trimmed => cap_chars(trimmed, TITLE_LIMIT),
        };
        let summary_text = match summary_text.trim() {
            "" => raw.as_str(),
            trimmed => trimmed,
        };

        Ok(ArticleSummary {
            title: refined_title,
            summary_html: to_summary_html(summary_text),
        })
    }
}

fn build_prompt(title: &str, content: &str) -> String {
    [
        format!("Article title: {}", title),
        String::new(),
        "Task:".to_string(),
        "- Remove unrelated or noisy content (ads, references, links, navigation text).".to_string(),
        "- Rewrite the title to be clear and meaningful in plain English.".to_string(),
        "- Preserve core meaning of the original title.".to_string(),
        "- Keep the rewritten title within 80 characters maximum.".to_string(),
        "- Produce one clean English summary only.".to_string(),
        "- Keep full meaningful detail; do not over-compress.".to_string(),
        "- Prefer 3 or more paragraphs when content is long.".to_string(),
        "- Each paragraph should be substantial (ideally more than 150 characters).".to_string(),
        "- Keep factual meaning and key points intact.".to_string(),
        "- Do not include URLs or bullet points.".to_string(),
        "- Respond in valid JSON exactly with keys: \"title\" and \"summary\".".to_string(),
        String::new(),
        "Article content:".to_string(),
        content.to_string(),
    ]
    .join("\n")
}

pub fn html_to_plain_text(html: &str) -> String {
    collapse_whitespace(&decode_entities(&strip_html(html)))
}

fn non_blank_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pull a title and summary text out of a model reply.
///
/// A JSON object with `title`/`summary` is preferred; otherwise a `title:`
/// line is used and the whole reply is the summary.
pub fn parse_refined_payload(response: &str, fallback_title: &str) -> (String, String) {
    if let Some(parsed) = extract_json_object(response)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
    {
        let title = non_blank_str(&parsed, "title").unwrap_or(fallback_title);
        let summary = non_blank_str(&parsed, "summary").unwrap_or(response);
        return (cap_chars(title, TITLE_LIMIT), summary.to_string());
    }

    let title = TITLE_LINE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title);
    (cap_chars(title, TITLE_LIMIT), response.to_string())
}

/// Pack sentences greedily into paragraphs shorter than `target` chars.
fn pack_sentences(text: &str, target: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let next = if current.is_empty() {
            sentence.clone()
        } else {
            format!("{} {}", current, sentence)
        };
        if next.chars().count() < target {
            current = next;
        } else {
            if !current.is_empty() {
                paragraphs.push(current);
            }
            current = sentence;
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Render summary text as escaped `<p>` blocks of reasonable size.
pub fn to_summary_html(text: &str) -> String {
    let clean = text.trim();
    if clean.is_empty() {
        return "<p>No summary available.</p>".to_string();
    }

    let mut paragraphs: Vec<String> = BLANK_LINES
        .split(clean)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if paragraphs.len() <= 1 {
        paragraphs = pack_sentences(clean, PARAGRAPH_TARGET);
    }

    if paragraphs.len() < 3 && clean.chars().count() > MULTI_PARAGRAPH_THRESHOLD {
        let sentences = split_sentences(&paragraphs.join(" "));
        let chunk_size = sentences.len().div_ceil(3).max(1);
        paragraphs = sentences
            .chunks(chunk_size)
            .map(|chunk| chunk.join(" ").trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    let mut normalized: Vec<String> = Vec::with_capacity(paragraphs.len());
    for paragraph in paragraphs {
        match normalized.last_mut() {
            Some(last) if paragraph.chars().count() < MIN_PARAGRAPH => {
                last.push(' ');
                last.push_str(&paragraph);
                *last = last.trim().to_string();
            }
            _ => normalized.push(paragraph),
        }
    }

    normalized
        .iter()
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect()
}
