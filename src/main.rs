use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daily_trends::aggregator::start_background_refresh;
use daily_trends::config::Config;
use daily_trends::routes::{self, AppState};
use daily_trends::storage::SqliteStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daily_trends=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("trends.toml")?;
    info!(
        "Loaded configuration: refresh every {} minutes, {} default categories",
        config.refresh_interval,
        config.default_categories.len()
    );

    // Initialize storage
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:daily_trends.db?mode=rwc".to_string());
    let storage = SqliteStorage::new(&database_url).await?;
    storage.initialize().await?;
    info!("Storage initialized");

    let state = Arc::new(AppState::new(&config, Arc::new(storage))?);
    if !state.summarizer.is_enabled() {
        info!(
            "{} is not set; summaries and translation are disabled",
            config.chat.api_key_env
        );
    }

    // Start background refresh task
    let aggregator = state.aggregator.clone();
    let session = state.session.clone();
    let refresh_interval = config.refresh_interval;
    let page_size = state.page_size;
    tokio::spawn(async move {
        start_background_refresh(aggregator, session, refresh_interval, page_size).await;
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Server starting on http://{}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
