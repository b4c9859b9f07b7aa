use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{NewsError, NewsResult};
use crate::fetcher::{format_timestamp, map_articles, Fetcher};
use crate::models::{categories_for, FeedItem};
use crate::session::Session;

// Every category gets at least this many results before merging
const MIN_PER_CATEGORY: usize = 5;

// Largest record count requested from the source in one query
pub const MAX_WINDOW: usize = 250;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub page: usize,
    pub has_more: bool,
}

pub struct Aggregator {
    fetcher: Arc<Fetcher>,
    fallback_query: String,
    refreshing: Arc<RwLock<bool>>,
}

impl Aggregator {
    pub fn new(fetcher: Arc<Fetcher>, fallback_query: impl Into<String>) -> Self {
        Self {
            fetcher,
            fallback_query: fallback_query.into(),
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Top `limit` items across the selected categories, newest first.
    ///
    /// Categories are fetched concurrently and a category that fails simply
    /// contributes nothing. When nothing at all comes back, one broad query
    /// is issued so the view is never empty; if that fails too the error is
    /// [`NewsError::Unavailable`].
    pub async fn fetch_top(&self, category_ids: &[String], limit: usize) -> NewsResult<Vec<FeedItem>> {
        let selected = categories_for(category_ids);
        let Some(primary) = selected.first().copied() else {
            return Ok(Vec::new());
        };

        let limit = limit.min(MAX_WINDOW);
        let per_category = limit.max(MIN_PER_CATEGORY);
        let results = join_all(
            selected
                .iter()
                .map(|category| self.fetcher.fetch_category(category, per_category)),
        )
        .await;

        let merged = merge_feeds(results.into_iter().flatten().collect(), limit);
        if !merged.is_empty() {
            return Ok(merged);
        }

        info!(
            "No category results for {:?}, using global fallback query",
            category_ids
        );
        let articles = self
            .fetcher
            .fetch_articles(&self.fallback_query, limit)
            .await
            .map_err(|e| {
                warn!("Global fallback query failed: {}", e);
                NewsError::Unavailable
            })?;

        let feeds = map_articles(&articles, primary, limit, Utc::now());
        self.fetcher.cache().put(&feeds).await;
        Ok(feeds)
    }

    pub async fn fetch_page(
        &self,
        category_ids: &[String],
        page: usize,
        page_size: usize,
    ) -> NewsResult<FeedPage> {
        let page_size = page_size.max(1);
        let window = page
            .checked_add(1)
            .and_then(|pages| pages.checked_mul(page_size))
            .filter(|window| *window <= MAX_WINDOW);
        let Some(window) = window else {
            debug!("Page {} of size {} is beyond the source window", page, page_size);
            return Ok(FeedPage {
                items: Vec::new(),
                page,
                has_more: false,
            });
        };

        let all = self.fetch_top(category_ids, window).await?;
        let has_more = all.len() >= window && window < MAX_WINDOW;

        Ok(FeedPage {
            items: all.into_iter().skip(window - page_size).collect(),
            page,
            has_more,
        })
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    pub async fn refresh_selected(&self, session: &Session, limit: usize) -> NewsResult<()> {
        // Check if already refreshing
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let result = self.do_refresh(session, limit).await;

        // Clear refreshing flag
        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh(&self, session: &Session, limit: usize) -> NewsResult<()> {
        let selected = session.selected_categories().await;
        if selected.is_empty() {
            info!("No categories selected, nothing to refresh");
            return Ok(());
        }

        let feeds = self.fetch_top(&selected, limit).await?;
        info!(
            "Refresh complete: {} items across {} categories, newest {}",
            feeds.len(),
            selected.len(),
            feeds
                .first()
                .map(|feed| format_timestamp(feed.published_at))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(())
    }
}

pub fn dedupe_feeds(feeds: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    feeds
        .into_iter()
        .filter(|feed| seen.insert(feed.dedupe_key().to_string()))
        .collect()
}

// Dedupe, newest first, at most `limit`
pub fn merge_feeds(feeds: Vec<FeedItem>, limit: usize) -> Vec<FeedItem> {
    let mut deduped = dedupe_feeds(feeds);
    deduped.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    deduped.truncate(limit);
    deduped
}

/// Grows a feed page by page without duplicate ids.
pub struct FeedPager {
    category_ids: Vec<String>,
    page_size: usize,
    next_page: usize,
    has_more: bool,
    items: Vec<FeedItem>,
    seen: HashSet<String>,
}

impl FeedPager {
    pub fn new(category_ids: Vec<String>, page_size: usize) -> Self {
        Self {
            category_ids,
            page_size: page_size.max(1),
            next_page: 0,
            has_more: true,
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn pages_loaded(&self) -> usize {
        self.next_page
    }

    // Returns only the newly added items
    pub async fn load_next(&mut self, aggregator: &Aggregator) -> NewsResult<&[FeedItem]> {
        if !self.has_more {
            return Ok(&[]);
        }

        let page = aggregator
            .fetch_page(&self.category_ids, self.next_page, self.page_size)
            .await?;

        let start = self.items.len();
        for item in page.items {
            if self.seen.insert(item.id.clone()) {
                self.items.push(item);
            }
        }

        self.next_page += 1;
        self.has_more = page.has_more && self.items.len() > start;
        Ok(&self.items[start..])
    }

    pub fn reset(&mut self) {
        self.next_page = 0;
        self.has_more = true;
        self.items.clear();
        self.seen.clear();
    }
}

pub async fn start_background_refresh(
    aggregator: Arc<Aggregator>,
    session: Session,
    interval_minutes: u64,
    limit: usize,
) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    // Do initial fetch
    info!("Starting initial feed refresh");
    if let Err(e) = aggregator.refresh_selected(&session, limit).await {
        error!("Initial feed refresh failed: {}", e);
    }

    // Then schedule periodic refreshes
    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = aggregator.refresh_selected(&session, limit).await {
            error!("Scheduled feed refresh failed: {}", e);
        }
    }
}
