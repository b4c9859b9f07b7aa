use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::error;

use crate::aggregator::{Aggregator, FeedPage, MAX_WINDOW};
use crate::banner::banner_for_feed;
use crate::bookmarks::{BookmarkEvent, BookmarkStore};
use crate::chat::ChatClient;
use crate::config::Config;
use crate::content::ContentFetcher;
use crate::error::{NewsError, NewsResult};
use crate::feed_cache::FeedCache;
use crate::fetcher::Fetcher;
use crate::models::{FeedItem, CATEGORIES};
use crate::session::Session;
use crate::storage::Storage;
use crate::summary::Summarizer;
use crate::translation::{FeedTranslation, FeedTranslator};

const MAX_PAGE_SIZE: usize = 50;

pub struct AppState {
    pub session: Session,
    pub cache: Arc<FeedCache>,
    pub aggregator: Arc<Aggregator>,
    pub bookmarks: Arc<BookmarkStore>,
    pub content: Arc<ContentFetcher>,
    pub summarizer: Summarizer,
    pub translator: FeedTranslator,
    pub default_categories: Vec<String>,
    pub page_size: usize,
}

impl AppState {
    pub fn new(config: &Config, storage: Arc<dyn Storage>) -> NewsResult<Self> {
        let cache = Arc::new(FeedCache::new(storage.clone(), config.cache.max_items));
        let fetcher = Arc::new(Fetcher::new(&config.news, cache.clone())?);
        let chat = Arc::new(ChatClient::new(&config.chat)?);

        Ok(Self {
            session: Session::new(storage.clone()),
            aggregator: Arc::new(Aggregator::new(
                fetcher,
                config.news.fallback_query.clone(),
            )),
            bookmarks: Arc::new(BookmarkStore::new(storage.clone(), cache.clone())),
            content: Arc::new(ContentFetcher::new(
                &config.content,
                storage.clone(),
                config.cache.max_entries,
            )?),
            summarizer: Summarizer::new(chat.clone(), storage.clone(), config.cache.max_entries),
            translator: FeedTranslator::new(chat, storage, config.cache.max_entries),
            cache,
            default_categories: config.default_categories.clone(),
            page_size: config.news.page_size.max(1),
        })
    }

    // Request ids, then the session selection, then the configured defaults
    async fn resolve_categories(&self, requested: Option<&str>) -> Vec<String> {
        let requested: Vec<String> = requested
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if !requested.is_empty() {
            return requested;
        }

        let selected = self.session.selected_categories().await;
        if !selected.is_empty() {
            return selected;
        }
        self.default_categories.clone()
    }

    async fn cached_feed(&self, feed_id: &str) -> NewsResult<FeedItem> {
        self.cache
            .get_by_id(feed_id)
            .await
            .ok_or_else(|| NewsError::NotFound(format!("feed {}", feed_id)))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/categories", get(categories))
        .route("/api/categories/:id/feeds", get(category_feeds))
        .route("/api/session", get(session))
        .route("/api/session/categories", put(save_categories))
        .route("/api/feeds", get(feeds))
        .route("/api/feeds/page", get(feeds_page))
        .route("/api/feeds/translate", post(translate_feeds))
        .route("/api/feeds/:id", get(feed))
        .route("/api/feeds/:id/article", get(article))
        .route("/api/bookmarks", get(bookmarks))
        .route("/api/bookmarks/events", get(bookmark_events))
        .route("/api/bookmarks/:id", get(bookmark_status))
        .route("/api/bookmarks/:id/toggle", post(toggle_bookmark))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<NewsError>() {
            Some(NewsError::NotFound(_) | NewsError::UnknownCategory(_)) => StatusCode::NOT_FOUND,
            Some(NewsError::MissingConfig(_) | NewsError::Unavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Some(
                NewsError::Api { .. }
                | NewsError::Request(_)
                | NewsError::Parse(_)
                | NewsError::Timeout(_),
            ) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub selected_categories: Vec<String>,
    pub has_entered_home: bool,
    pub bookmark_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCategoriesRequest {
    pub category_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedsQuery {
    pub categories: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub categories: Option<String>,
    #[serde(default)]
    pub page: usize,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub feed: FeedItem,
    pub title: String,
    pub content_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub summarized: bool,
    pub bookmarked: bool,
}

// Route handlers
pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn categories() -> impl IntoResponse {
    Json(CATEGORIES)
}

pub async fn session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(SessionView {
        selected_categories: state.session.selected_categories().await,
        has_entered_home: state.session.has_entered_home().await,
        bookmark_count: state.bookmarks.count().await,
    })
}

pub async fn save_categories(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveCategoriesRequest>,
) -> Json<SessionView> {
    state
        .session
        .save_selected_categories(&request.category_ids)
        .await;
    session(State(state)).await
}

pub async fn feeds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedsQuery>,
) -> Result<Json<Vec<FeedItem>>, AppError> {
    let ids = state.resolve_categories(query.categories.as_deref()).await;
    let limit = query.limit.unwrap_or(state.page_size).min(MAX_WINDOW);
    Ok(Json(state.aggregator.fetch_top(&ids, limit).await?))
}

pub async fn feeds_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FeedPage>, AppError> {
    let ids = state.resolve_categories(query.categories.as_deref()).await;
    let page_size = query
        .page_size
        .unwrap_or(state.page_size)
        .clamp(1, MAX_PAGE_SIZE);
    Ok(Json(
        state
            .aggregator
            .fetch_page(&ids, query.page, page_size)
            .await?,
    ))
}

pub async fn category_feeds(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<FeedItem>>, AppError> {
    let limit = query.limit.unwrap_or(state.page_size).min(MAX_WINDOW);
    let feeds = state
        .aggregator
        .fetcher()
        .fetch_feeds_for_category(&category_id, limit)
        .await?;
    Ok(Json(feeds))
}

pub async fn feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<FeedItem>, AppError> {
    Ok(Json(state.cached_feed(&feed_id).await?))
}

pub async fn article(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<ArticleView>, AppError> {
    let feed = state.cached_feed(&feed_id).await?;
    let readable = state.content.readable_or_excerpt(&feed).await;
    let summary = state
        .summarizer
        .summarize(&feed.id, &feed.title, &readable)
        .await;

    let summarized = summary.title != feed.title || summary.summary_html != readable;
    let image_url = if summary.title != feed.title {
        banner_for_feed(&feed, Some(&summary.title))
    } else {
        feed.image_url.clone()
    };

    Ok(Json(ArticleView {
        bookmarked: state.bookmarks.is_bookmarked(&feed.id).await,
        title: summary.title,
        content_html: summary.summary_html,
        image_url,
        summarized,
        feed,
    }))
}

pub async fn translate_feeds(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<std::collections::HashMap<String, FeedTranslation>>, AppError> {
    let feeds = state.cache.get_by_ids(&request.ids).await;
    Ok(Json(state.translator.translate_batch(&feeds).await?))
}

pub async fn bookmarks(State(state): State<Arc<AppState>>) -> Json<Vec<FeedItem>> {
    Json(state.bookmarks.list().await)
}

pub async fn bookmark_status(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Json<BookmarkEvent> {
    Json(BookmarkEvent {
        bookmarked: state.bookmarks.is_bookmarked(&feed_id).await,
        feed_id,
    })
}

pub async fn toggle_bookmark(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<BookmarkEvent>, AppError> {
    let feed = state.cached_feed(&feed_id).await?;
    let bookmarked = state.bookmarks.toggle(&feed).await;
    Ok(Json(BookmarkEvent {
        feed_id: feed.id,
        bookmarked,
    }))
}

pub async fn bookmark_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(state.bookmarks.subscribe())
        .filter_map(|event| event.ok())
        .map(|event| Event::default().event("bookmark").json_data(event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Spawn the refresh task
    let aggregator = state.aggregator.clone();
    let session = state.session.clone();
    let limit = state.page_size;
    tokio::spawn(async move {
        if let Err(e) = aggregator.refresh_selected(&session, limit).await {
            error!("Manual refresh failed: {}", e);
        }
    });

    // Return refreshing state immediately
    Json(json!({ "refreshing": true }))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "refreshing": state.aggregator.is_refreshing().await }))
}
