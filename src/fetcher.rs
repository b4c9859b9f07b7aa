use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::banner::render_banner;
use crate::config::NewsConfig;
use crate::error::{NewsError, NewsResult};
use crate::feed_cache::FeedCache;
use crate::models::{find_category, Category, FeedItem};
use crate::text::{escape_html, strip_html, take_chars};

const EXCERPT_LIMIT: usize = 180;

static COMPACT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(\d{2})(\d{2})T(\d{2})(\d{2})(\d{2})Z$").expect("timestamp pattern is valid")
});

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
    pub url: Option<String>,
    pub url_mobile: Option<String>,
    pub title: Option<String>,
    pub seendate: Option<String>,
    pub domain: Option<String>,
    pub sourcecountry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

/// Source adapter for the news-search API.
pub struct Fetcher {
    client: Client,
    base_url: String,
    timespan: String,
    sort: String,
    cache: Arc<FeedCache>,
}

impl Fetcher {
    pub fn new(config: &NewsConfig, cache: Arc<FeedCache>) -> NewsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("DailyTrends/1.0 (News Reader)")
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timespan: config.timespan.clone(),
            sort: config.sort.clone(),
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub async fn fetch_articles(&self, query: &str, limit: usize) -> NewsResult<Vec<RawArticle>> {
        let max_records = limit.max(10).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("query", query),
                ("mode", "ArtList"),
                ("format", "json"),
                ("sort", self.sort.as_str()),
                ("maxrecords", max_records.as_str()),
                ("timespan", self.timespan.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Api {
                status: status.as_u16(),
                message: format!("News search request failed ({})", status),
            });
        }

        let body = response.text().await?;
        parse_search_body(&body)
    }

    // Walks the fallback queries; exhausted fallbacks yield an empty list
    pub async fn fetch_category(&self, category: &Category, limit: usize) -> Vec<FeedItem> {
        let attempts = [
            category.topic.to_string(),
            category.name.to_string(),
            format!("{} news", category.name),
        ];

        let mut articles = Vec::new();
        for query in &attempts {
            match self.fetch_articles(query, limit).await {
                Ok(result) if !result.is_empty() => {
                    articles = result;
                    break;
                }
                Ok(_) => debug!("No results for '{}' in {}", query, category.name),
                Err(e) => warn!("Query '{}' for {} failed: {}", query, category.name, e),
            }
        }

        let feeds = map_articles(&articles, category, limit, Utc::now());
        info!("Fetched {} items for category '{}'", feeds.len(), category.name);

        self.cache.put(&feeds).await;
        feeds
    }

    pub async fn fetch_feeds_for_category(
        &self,
        category_id: &str,
        limit: usize,
    ) -> NewsResult<Vec<FeedItem>> {
        let category = find_category(category_id)
            .ok_or_else(|| NewsError::UnknownCategory(category_id.to_string()))?;
        Ok(self.fetch_category(category, limit).await)
    }
}

fn parse_search_body(body: &str) -> NewsResult<Vec<RawArticle>> {
    match serde_json::from_str::<SearchResponse>(body) {
        Ok(parsed) => Ok(parsed.articles),
        Err(_) => {
            let snippet = take_chars(body, 120);
            let snippet = snippet.trim();
            Err(NewsError::Parse(if snippet.is_empty() {
                "Unexpected news API response".to_string()
            } else {
                snippet.to_string()
            }))
        }
    }
}

pub fn map_articles(
    articles: &[RawArticle],
    category: &Category,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    articles
        .iter()
        .take(limit)
        .filter_map(|article| {
            let title = non_empty(article.title.as_deref())?;
            let link = non_empty(article.url.as_deref())
                .or_else(|| non_empty(article.url_mobile.as_deref()))?;

            let source = non_empty(article.domain.as_deref())
                .or_else(|| non_empty(article.sourcecountry.as_deref()))
                .unwrap_or("GDELT")
                .to_string();
            let published_at = normalize_published_at(article.seendate.as_deref(), now);
            let excerpt = format!("{}. Open this article to load full readable content.", title);

            Some(FeedItem {
                id: feed_id(category.id, link),
                category_id: category.id.to_string(),
                title: title.to_string(),
                excerpt: truncate_excerpt(&excerpt),
                content: preview_content(title),
                image_url: Some(render_banner(category, title, &source, published_at)),
                published_at,
                source,
                link: Some(link.to_string()),
            })
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn truncate_excerpt(excerpt: &str) -> String {
    if excerpt.chars().count() > EXCERPT_LIMIT {
        format!("{}...", take_chars(excerpt, EXCERPT_LIMIT))
    } else {
        excerpt.to_string()
    }
}

fn preview_content(title: &str) -> String {
    format!(
        "<p>{}</p><p>Loading full article content...</p>",
        escape_html(&strip_html(title))
    )
}

// 32-bit FNV-1a
pub fn fnv1a(value: &str) -> u32 {
    value.bytes().fold(0x811c_9dc5, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

pub fn feed_id(category_id: &str, link: &str) -> String {
    format!("rss-{}-{}", category_id, fnv1a(&format!("{}:{}", category_id, link)))
}

pub fn normalize_published_at(value: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return now;
    };

    if let Some(caps) = COMPACT_TIMESTAMP.captures(value) {
        let field = |i: usize| caps[i].parse::<u32>().ok();
        let parsed = (|| {
            let date = NaiveDate::from_ymd_opt(field(1)? as i32, field(2)?, field(3)?)?;
            date.and_hms_opt(field(4)?, field(5)?, field(6)?)
        })();
        if let Some(naive) = parsed {
            return Utc.from_utc_datetime(&naive);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }
    if let Some(naive) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Utc.from_utc_datetime(&naive);
    }

    now
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap()
    }

    fn raw(url: Option<&str>, title: Option<&str>) -> RawArticle {
        RawArticle {
            url: url.map(str::to_string),
            title: title.map(str::to_string),
            seendate: Some("20240131T120000Z".to_string()),
            domain: Some("example.com".to_string()),
            ..Default::default()
        }
    }

    fn create_fetcher(base_url: &str) -> (Fetcher, Arc<FeedCache>) {
        let cache = Arc::new(FeedCache::new(Arc::new(MemoryStorage::new()), 300));
        let config = NewsConfig {
            base_url: base_url.to_string(),
            ..NewsConfig::default()
        };
        (Fetcher::new(&config, cache.clone()).unwrap(), cache)
    }

    fn articles_body(links: &[&str]) -> serde_json::Value {
        let articles: Vec<serde_json::Value> = links
            .iter()
            .map(|link| {
                serde_json::json!({
                    "url": link,
                    "title": format!("Story at {}", link),
                    "seendate": "20240131T120000Z",
                    "domain": "example.com"
                })
            })
            .collect();
        serde_json::json!({ "articles": articles })
    }

    mod id_tests {
        use super::*;

        #[test]
        fn test_fnv1a_reference_vectors() {
            assert_eq!(fnv1a(""), 0x811c_9dc5);
            assert_eq!(fnv1a("a"), 0xe40c_292c);
            assert_eq!(fnv1a("foobar"), 0xbf9c_f968);
        }

        #[test]
        fn test_feed_id_is_stable() {
            let a = feed_id("3", "https://example.com/story");
            let b = feed_id("3", "https://example.com/story");
            assert_eq!(a, b);
            assert!(a.starts_with("rss-3-"));
        }

        #[test]
        fn test_feed_id_is_category_scoped() {
            assert_ne!(
                feed_id("3", "https://example.com/story"),
                feed_id("6", "https://example.com/story")
            );
            assert_ne!(
                feed_id("3", "https://example.com/a"),
                feed_id("3", "https://example.com/b")
            );
        }
    }

    mod normalize_published_at_tests {
        use super::*;

        #[test]
        fn test_compact_utc_format() {
            let parsed = normalize_published_at(Some("20240131T120000Z"), fixed_now());
            assert_eq!(format_timestamp(parsed), "2024-01-31T12:00:00Z");
        }

        #[test]
        fn test_rfc3339_with_offset() {
            let parsed = normalize_published_at(Some("2024-01-31T14:00:00+02:00"), fixed_now());
            assert_eq!(format_timestamp(parsed), "2024-01-31T12:00:00Z");
        }

        #[test]
        fn test_rfc2822() {
            let parsed = normalize_published_at(Some("Wed, 31 Jan 2024 12:00:00 GMT"), fixed_now());
            assert_eq!(format_timestamp(parsed), "2024-01-31T12:00:00Z");
        }

        #[test]
        fn test_plain_date() {
            let parsed = normalize_published_at(Some("2024-01-31"), fixed_now());
            assert_eq!(format_timestamp(parsed), "2024-01-31T00:00:00Z");
        }

        #[test]
        fn test_missing_or_garbage_falls_back_to_now() {
            assert_eq!(normalize_published_at(None, fixed_now()), fixed_now());
            assert_eq!(normalize_published_at(Some(""), fixed_now()), fixed_now());
            assert_eq!(normalize_published_at(Some("yesterday"), fixed_now()), fixed_now());
        }

        #[test]
        fn test_compact_with_invalid_month_falls_back_to_now() {
            assert_eq!(
                normalize_published_at(Some("20241331T120000Z"), fixed_now()),
                fixed_now()
            );
        }
    }

    mod map_articles_tests {
        use super::*;

        #[test]
        fn test_maps_fields() {
            let category = find_category("3").unwrap();
            let feeds = map_articles(
                &[raw(Some("https://example.com/a"), Some("  AI story  "))],
                category,
                10,
                fixed_now(),
            );

            assert_eq!(feeds.len(), 1);
            let feed = &feeds[0];
            assert_eq!(feed.id, feed_id("3", "https://example.com/a"));
            assert_eq!(feed.category_id, "3");
            assert_eq!(feed.title, "AI story");
            assert_eq!(feed.source, "example.com");
            assert_eq!(feed.link.as_deref(), Some("https://example.com/a"));
            assert_eq!(
                feed.excerpt,
                "AI story. Open this article to load full readable content."
            );
            assert_eq!(
                feed.content,
                "<p>AI story</p><p>Loading full article content...</p>"
            );
            assert_eq!(format_timestamp(feed.published_at), "2024-01-31T12:00:00Z");
            assert!(feed
                .image_url
                .as_deref()
                .unwrap()
                .starts_with("data:image/svg+xml,"));
        }

        #[test]
        fn test_skips_entries_without_title_or_link() {
            let category = find_category("1").unwrap();
            let feeds = map_articles(
                &[
                    raw(None, Some("No link")),
                    raw(Some("https://example.com/b"), None),
                    raw(Some("https://example.com/c"), Some("   ")),
                    raw(Some("https://example.com/d"), Some("Kept")),
                ],
                category,
                10,
                fixed_now(),
            );
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].title, "Kept");
        }

        #[test]
        fn test_mobile_url_and_source_fallbacks() {
            let category = find_category("1").unwrap();
            let article = RawArticle {
                url_mobile: Some("https://m.example.com/a".to_string()),
                title: Some("Mobile".to_string()),
                sourcecountry: Some("India".to_string()),
                ..Default::default()
            };
            let bare = RawArticle {
                url: Some("https://example.com/bare".to_string()),
                title: Some("Bare".to_string()),
                ..Default::default()
            };

            let feeds = map_articles(&[article, bare], category, 10, fixed_now());
            assert_eq!(feeds[0].link.as_deref(), Some("https://m.example.com/a"));
            assert_eq!(feeds[0].source, "India");
            assert_eq!(feeds[1].source, "GDELT");
            assert_eq!(feeds[1].published_at, fixed_now());
        }

        #[test]
        fn test_limit_applies_before_filtering() {
            let category = find_category("1").unwrap();
            let feeds = map_articles(
                &[
                    raw(None, Some("Dropped")),
                    raw(Some("https://example.com/1"), Some("One")),
                    raw(Some("https://example.com/2"), Some("Two")),
                ],
                category,
                2,
                fixed_now(),
            );
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].title, "One");
        }

        #[test]
        fn test_long_excerpt_is_truncated() {
            let category = find_category("1").unwrap();
            let title = "word ".repeat(60);
            let feeds = map_articles(
                &[raw(Some("https://example.com/long"), Some(&title))],
                category,
                10,
                fixed_now(),
            );
            assert_eq!(feeds[0].excerpt.chars().count(), EXCERPT_LIMIT + 3);
            assert!(feeds[0].excerpt.ends_with("..."));
        }

        #[test]
        fn test_preview_strips_markup() {
            assert_eq!(
                preview_content("<b>Bold</b> & plain"),
                "<p>Bold &amp; plain</p><p>Loading full article content...</p>"
            );
        }
    }

    mod parse_search_body_tests {
        use super::*;

        #[test]
        fn test_missing_articles_is_empty() {
            assert!(parse_search_body("{}").unwrap().is_empty());
        }

        #[test]
        fn test_non_json_body_carries_snippet() {
            let err = parse_search_body("  Rate limit exceeded, slow down  ").unwrap_err();
            assert!(matches!(err, NewsError::Parse(ref msg) if msg == "Rate limit exceeded, slow down"));
        }

        #[test]
        fn test_empty_body_has_generic_message() {
            let err = parse_search_body("").unwrap_err();
            assert!(matches!(err, NewsError::Parse(ref msg) if msg == "Unexpected news API response"));
        }
    }

    mod http_tests {
        use super::*;

        #[tokio::test]
        async fn test_fetch_articles_sends_search_parameters() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(query_param("query", "robots"))
                .and(query_param("mode", "ArtList"))
                .and(query_param("format", "json"))
                .and(query_param("maxrecords", "10"))
                .and(query_param("timespan", "7days"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(articles_body(&["https://a.com/1"])),
                )
                .expect(1)
                .mount(&server)
                .await;

            let (fetcher, _) = create_fetcher(&server.uri());
            let articles = fetcher.fetch_articles("robots", 3).await.unwrap();
            assert_eq!(articles.len(), 1);
        }

        #[tokio::test]
        async fn test_fetch_articles_non_success_is_api_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let (fetcher, _) = create_fetcher(&server.uri());
            let err = fetcher.fetch_articles("anything", 10).await.unwrap_err();
            assert!(matches!(err, NewsError::Api { status: 503, .. }));
        }

        #[tokio::test]
        async fn test_fetch_category_walks_fallback_queries() {
            let server = MockServer::start().await;
            let category = find_category("3").unwrap();

            Mock::given(method("GET"))
                .and(query_param("query", category.topic))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("query", "AI"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("query", "AI news"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(articles_body(&["https://a.com/1", "https://a.com/2"])),
                )
                .expect(1)
                .mount(&server)
                .await;

            let (fetcher, cache) = create_fetcher(&server.uri());
            let feeds = fetcher.fetch_category(category, 10).await;

            assert_eq!(feeds.len(), 2);
            assert_eq!(cache.len().await, 2);
            assert!(cache.get_by_id(&feeds[0].id).await.is_some());
        }

        #[tokio::test]
        async fn test_fetch_category_stops_at_first_success() {
            let server = MockServer::start().await;
            let category = find_category("6").unwrap();

            Mock::given(method("GET"))
                .and(query_param("query", category.topic))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(articles_body(&["https://t.com/1"])),
                )
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(query_param("query", "Tech"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let (fetcher, _) = create_fetcher(&server.uri());
            assert_eq!(fetcher.fetch_category(category, 10).await.len(), 1);
        }

        #[tokio::test]
        async fn test_fetch_category_all_failures_is_empty() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .expect(3)
                .mount(&server)
                .await;

            let (fetcher, cache) = create_fetcher(&server.uri());
            let feeds = fetcher
                .fetch_category(find_category("1").unwrap(), 10)
                .await;
            assert!(feeds.is_empty());
            assert!(cache.is_empty().await);
        }

        #[tokio::test]
        async fn test_unknown_category_is_an_error() {
            let (fetcher, _) = create_fetcher("http://127.0.0.1:9");
            let err = fetcher.fetch_feeds_for_category("404", 10).await.unwrap_err();
            assert!(matches!(err, NewsError::UnknownCategory(ref id) if id == "404"));
        }
    }
}
