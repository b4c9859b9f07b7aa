//! Small string helpers shared by the fetcher, banner and enrichment stages.
//!
//! All length limits count characters, never bytes, so multi-byte titles are
//! never cut inside a code point.

use std::sync::LazyLock;

use regex::Regex;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Replace markup with spaces and collapse the remaining whitespace.
pub fn strip_html(value: &str) -> String {
    collapse_whitespace(&TAG_PATTERN.replace_all(value, " "))
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the handful of entities the upstream services actually emit.
pub fn decode_entities(value: &str) -> String {
    value
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Cut to `limit` characters, marking the cut with `...`.
pub fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let kept: String = value.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Like [`truncate`], but trims trailing whitespace before the ellipsis.
pub fn cap_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// First `limit` characters, without any marker.
pub fn take_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

/// Split prose into sentences at whitespace following `.`, `!` or `?`.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() && matches!(current.chars().last(), Some('.' | '!' | '?')) {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}
