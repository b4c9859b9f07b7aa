//! Generated header images for articles.
//!
//! The news provider rarely returns usable images, so every item gets an SVG
//! banner showing its source, publish time and title on a category-coloured
//! gradient. The SVG is inlined as a `data:` URI.

use chrono::{DateTime, Utc};

use crate::models::{find_category, Category, FeedItem};
use crate::text::{cap_chars, escape_html, truncate};

const WIDTH: u32 = 1200;
const PADDING: u32 = 70;
const TITLE_START_Y: u32 = 190;
const TITLE_LINE_HEIGHT: u32 = 56;
const MIN_HEIGHT: u32 = 320;
const MAX_HEIGHT: u32 = 980;
const FONT: &str = "-apple-system,Segoe UI,Roboto,Arial";

fn colors_for(slug: &str) -> (&'static str, &'static str) {
    match slug {
        "business" => ("#0f766e", "#115e59"),
        "social" => ("#2563eb", "#1d4ed8"),
        "ai" => ("#7c3aed", "#6d28d9"),
        "robotics" => ("#334155", "#1e293b"),
        "beauty" => ("#db2777", "#be185d"),
        "tech" => ("#0891b2", "#0e7490"),
        "health" => ("#16a34a", "#15803d"),
        "science" => ("#4f46e5", "#4338ca"),
        "entertainment" => ("#d97706", "#b45309"),
        "sports" => ("#ea580c", "#c2410c"),
        "finance" => ("#059669", "#047857"),
        "fashion" => ("#9333ea", "#7e22ce"),
        "travel" => ("#0284c7", "#0369a1"),
        "food" => ("#dc2626", "#b91c1c"),
        "environment" => ("#16a34a", "#166534"),
        _ => ("#2563eb", "#1d4ed8"),
    }
}

/// Greedy word wrap. The last line is ellipsized when words were left over.
pub fn split_title_lines(value: &str, max_chars_per_line: usize, max_lines: usize) -> Vec<String> {
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.is_empty() {
        return vec![String::new()];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in &words {
        let next = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if next.chars().count() <= max_chars_per_line {
            current = next;
            continue;
        }

        if !current.is_empty() {
            lines.push(current);
        }
        current = word.to_string();
        if lines.len() + 1 >= max_lines {
            break;
        }
    }

    if !current.is_empty() && lines.len() < max_lines {
        lines.push(current);
    }

    let wrapped_len = lines.join(" ").chars().count();
    if lines.len() == max_lines && words.join(" ").chars().count() > wrapped_len {
        let last = max_lines - 1;
        lines[last] = truncate(&lines[last], max_chars_per_line);
    }

    lines
}

pub fn render_banner(
    category: &Category,
    title: &str,
    source: &str,
    published_at: DateTime<Utc>,
) -> String {
    let (top, bottom) = colors_for(category.slug);
    let content_width = WIDTH - PADDING * 2;
    let lines = split_title_lines(&cap_chars(title, 80), 28, 8);

    let title_bottom_y = TITLE_START_Y + (lines.len() as u32 - 1) * TITLE_LINE_HEIGHT + 20;
    let height = (title_bottom_y + 56).clamp(MIN_HEIGHT, MAX_HEIGHT);
    let clip_height = height - 160;

    let source = if source.is_empty() { "Unknown source" } else { source };
    let source_text = escape_html(&truncate(source, 44));
    let time_text = escape_html(&published_at.format("%b %-d, %Y, %H:%M UTC").to_string());

    let title_lines: String = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let y = TITLE_START_Y + index as u32 * TITLE_LINE_HEIGHT;
            format!(
                "<text x='{PADDING}' y='{y}' font-size='48' font-family='{FONT}' fill='white' font-weight='700'>{}</text>",
                escape_html(line)
            )
        })
        .collect();

    let svg = format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{WIDTH}' height='{height}' viewBox='0 0 {WIDTH} {height}'>\
<defs>\
<linearGradient id='g' x1='0' y1='0' x2='1' y2='1'>\
<stop offset='0%' stop-color='{top}'/>\
<stop offset='100%' stop-color='{bottom}'/>\
</linearGradient>\
<clipPath id='titleClip'><rect x='{PADDING}' y='132' width='{content_width}' height='{clip_height}' /></clipPath>\
</defs>\
<rect width='{WIDTH}' height='{height}' fill='url(#g)'/>\
<text x='{PADDING}' y='74' font-size='24' font-family='{FONT}' fill='rgba(255,255,255,0.95)'>Source: <tspan font-weight='600'>{source_text}</tspan></text>\
<text x='{PADDING}' y='110' font-size='22' font-family='{FONT}' fill='rgba(255,255,255,0.92)'>Published: <tspan font-weight='600'>{time_text}</tspan></text>\
<g clip-path='url(#titleClip)'>{title_lines}</g>\
</svg>"
    );

    format!("data:image/svg+xml,{}", urlencoding::encode(&svg))
}

/// Rebuild an item's banner, optionally with a different title.
/// Items from unknown categories keep whatever image they already had.
pub fn banner_for_feed(item: &FeedItem, title_override: Option<&str>) -> Option<String> {
    let Some(category) = find_category(&item.category_id) else {
        return item.image_url.clone();
    };

    Some(render_banner(
        category,
        title_override.unwrap_or(&item.title),
        &item.source,
        item.published_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn decode(uri: &str) -> String {
        let encoded = uri.strip_prefix("data:image/svg+xml,").unwrap();
        urlencoding::decode(encoded).unwrap().into_owned()
    }

    fn published() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap()
    }

    mod split_title_lines_tests {
        use super::*;

        #[test]
        fn test_empty_title() {
            assert_eq!(split_title_lines("   ", 28, 8), vec![String::new()]);
        }

        #[test]
        fn test_wraps_on_word_boundaries() {
            let lines = split_title_lines("one two three four five six", 9, 8);
            assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
        }

        #[test]
        fn test_long_word_gets_its_own_line() {
            let lines = split_title_lines("a supercalifragilistic b", 10, 8);
            assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
        }

        #[test]
        fn test_ellipsizes_when_lines_run_out() {
            let lines = split_title_lines("aa bb cc dd ee ff", 2, 3);
            assert_eq!(lines.len(), 3);
            assert_eq!(lines[0], "aa");
            assert_eq!(lines[1], "bb");
        }
    }

    #[test]
    fn test_render_banner_is_data_uri_with_escaped_content() {
        let category = find_category("3").unwrap();
        let uri = render_banner(category, "AI <beats> humans & more", "example.com", published());

        assert!(uri.starts_with("data:image/svg+xml,"));
        let svg = decode(&uri);
        assert!(svg.contains("#7c3aed"));
        assert!(svg.contains("AI &lt;beats&gt; humans &amp;"));
        assert!(svg.contains("example.com"));
        assert!(svg.contains("Jan 31, 2024, 12:00 UTC"));
    }

    #[test]
    fn test_render_banner_height_is_clamped() {
        let category = find_category("1").unwrap();
        let svg = decode(&render_banner(category, "Short", "", published()));
        assert!(svg.contains("height='320'"));
        assert!(svg.contains("Unknown source"));
    }

    #[test]
    fn test_banner_for_unknown_category_keeps_existing_image() {
        let item = FeedItem {
            id: "x".to_string(),
            category_id: "404".to_string(),
            title: "Title".to_string(),
            excerpt: String::new(),
            content: String::new(),
            image_url: Some("https://img.example.com/a.png".to_string()),
            published_at: published(),
            source: "example.com".to_string(),
            link: None,
        };
        assert_eq!(
            banner_for_feed(&item, None),
            Some("https://img.example.com/a.png".to_string())
        );
    }

    #[test]
    fn test_banner_for_feed_uses_title_override() {
        let item = FeedItem {
            id: "x".to_string(),
            category_id: "6".to_string(),
            title: "Original".to_string(),
            excerpt: String::new(),
            content: String::new(),
            image_url: None,
            published_at: published(),
            source: "example.com".to_string(),
            link: None,
        };
        let svg = decode(&banner_for_feed(&item, Some("Refined headline")).unwrap());
        assert!(svg.contains("Refined headline"));
        assert!(!svg.contains("Original"));
    }
}
