//! Readable article text via an extraction proxy.
//!
//! The proxy returns loosely formatted text (markdown-ish, with navigation
//! and reference noise). [`to_readable_html`] filters that down to prose and
//! re-chunks it into short paragraphs.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::{Captures, Regex};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ContentConfig;
use crate::error::{NewsError, NewsResult};
use crate::models::FeedItem;
use crate::entry_cache::EntryCache;
use crate::storage::{keys, Storage};
use crate::text::{collapse_whitespace, decode_entities, escape_html, split_sentences};

const EMPTY_CONTENT: &str = "<p>No readable article content available.</p>";
const SENTENCES_PER_PARAGRAPH: usize = 3;
const URL_CLUSTER_MAX_LEN: usize = 260;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("url pattern is valid"));

static REFERENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[[^\]]+\]:\s*https?://\S+").expect("reference pattern is valid")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]{3,}").expect("word pattern is valid"));

static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:learn more|for more information|read more)\b|\bsources?\b\s*:")
        .expect("boilerplate pattern is valid")
});

static STAR_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*\*[^*]+\*\*\*|\*\*[^*]+\*\*|\*[^*]+\*").expect("star pattern is valid")
});

static STAR_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*]*\*").expect("star pattern is valid"));

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[|·]\s+").expect("separator pattern is valid"));

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[([^\]]+)\]\((?:https?://[^\s)]+)\)|(https?://[^\s<]+)")
        .expect("link pattern is valid")
});

static TRAILING_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,!?);:]+$").expect("punctuation pattern is valid"));

pub struct ContentFetcher {
    client: Client,
    proxy_base_url: String,
    timeout: Duration,
    cache: EntryCache<String>,
}

impl ContentFetcher {
    pub fn new(
        config: &ContentConfig,
        storage: Arc<dyn Storage>,
        max_entries: usize,
    ) -> NewsResult<Self> {
        let client = Client::builder()
            .user_agent("DailyTrends/1.0 (News Reader)")
            .build()?;

        Ok(Self {
            client,
            proxy_base_url: config.proxy_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            cache: EntryCache::new(storage, keys::ARTICLE_CONTENT, max_entries),
        })
    }

    /// Readable HTML for an article, cached per link.
    pub async fn fetch_readable_html(&self, article_url: &str) -> NewsResult<String> {
        if let Some(html) = self.cache.get(article_url).await {
            debug!("Readable content cache hit for {}", article_url);
            return Ok(html);
        }

        let response = self.client.get(proxy_endpoint(&self.proxy_base_url, article_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Api {
                status: status.as_u16(),
                message: format!("Readable extraction failed ({})", status),
            });
        }

        let html = to_readable_html(&response.text().await?);
        self.cache.insert(article_url, html.clone()).await;
        Ok(html)
    }

    /// Readable HTML within the configured deadline, else the item's excerpt.
    pub async fn readable_or_excerpt(&self, item: &FeedItem) -> String {
        let Some(link) = item.link.as_deref().filter(|l| !l.trim().is_empty()) else {
            return excerpt_html(item);
        };

        let result = match tokio::time::timeout(self.timeout, self.fetch_readable_html(link)).await {
            Ok(result) => result,
            Err(_) => Err(NewsError::Timeout(self.timeout)),
        };

        match result {
            Ok(html) => html,
            Err(e) => {
                warn!("Falling back to excerpt for '{}': {}", item.id, e);
                excerpt_html(item)
            }
        }
    }
}

fn proxy_endpoint(proxy_base_url: &str, article_url: &str) -> String {
    let without_scheme = article_url
        .strip_prefix("https://")
        .or_else(|| article_url.strip_prefix("http://"))
        .unwrap_or(article_url);
    format!("{}/http://{}", proxy_base_url, without_scheme)
}

fn excerpt_html(item: &FeedItem) -> String {
    format!("<p>{}</p>", escape_html(&item.excerpt))
}

fn keep_line(line: &str) -> bool {
    if line.is_empty()
        || line.starts_with("URL Source:")
        || line.starts_with("Markdown Content:")
        || line.starts_with("Title:")
        || REFERENCE_LINE.is_match(line)
    {
        return false;
    }

    let urls = URL.find_iter(line).count();
    if urls >= 2 && line.chars().count() < URL_CLUSTER_MAX_LEN {
        return false;
    }
    WORD.find_iter(line).count() >= 3 || urls > 0
}

fn trim_after_boilerplate(value: &str) -> &str {
    match BOILERPLATE.find(value) {
        Some(m) => value[..m.start()].trim(),
        None => value,
    }
}

/// Remove everything wrapped in `*`, `**` or `***`, stars included.
fn strip_star_wrapped(value: &str) -> String {
    let mut cleaned = value.to_string();
    while STAR_PAIR.is_match(&cleaned) || STAR_ANY.is_match(&cleaned) {
        let pass = STAR_PAIR.replace_all(&cleaned, " ");
        cleaned = STAR_ANY.replace_all(&pass, " ").into_owned();
    }
    collapse_whitespace(&cleaned)
}

/// Escape `value`, reducing markdown links to their label and dropping bare
/// URLs while keeping any punctuation that trailed them.
pub fn strip_all_links(value: &str) -> String {
    let text = decode_entities(value);
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for caps in LINK.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        output.push_str(&escape_html(&text[last..whole.start()]));
        output.push_str(&link_replacement(&caps));
        last = whole.end();
    }

    output.push_str(&escape_html(&text[last..]));
    output
}

fn link_replacement(caps: &Captures<'_>) -> String {
    if let Some(label) = caps.get(1) {
        return escape_html(label.as_str());
    }
    caps.get(2)
        .and_then(|url| TRAILING_PUNCTUATION.find(url.as_str()))
        .map(|trailing| escape_html(trailing.as_str()))
        .unwrap_or_default()
}

/// Clean proxy output into a sequence of `<p>` blocks.
pub fn to_readable_html(raw_text: &str) -> String {
    let lines: Vec<String> = raw_text
        .lines()
        .map(|line| decode_entities(line.trim()))
        .filter(|line| keep_line(line))
        .collect();

    let joined = lines.join(" ");
    let body = strip_star_wrapped(trim_after_boilerplate(&joined));
    let body = SEPARATOR.replace_all(&collapse_whitespace(&body), ". ").trim().to_string();

    if body.is_empty() {
        return EMPTY_CONTENT.to_string();
    }

    split_sentences(&body)
        .chunks(SENTENCES_PER_PARAGRAPH)
        .map(|chunk| format!("<p>{}</p>", strip_all_links(&chunk.join(" "))))
        .collect()
}
