//! rso-rc - Ratings Cache Microservice
//!
//! **Module Identity:**
//! - Name: rso-rc (Ratings Cache)
//! - Port: 5741 (configurable via TOML)
//!
//! Backend of the streaming ratings overlay: resolves scraped titles
//! against OMDb and serves IMDb / Rotten Tomatoes / Metacritic scores from
//! a multi-layer cache. The browser-side glue integrates via HTTP REST +
//! SSE.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use rso_common::config::{ensure_root_folder, resolve_root_folder, TomlConfig};
use rso_common::events::EventBus;
use rso_rc::services::{FetchOrchestrator, OmdbClient, RateLimiter, RatingStore, SessionCache};
use rso_rc::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification immediately after tracing init, before any
    // database delay
    info!(
        "Starting RSO Ratings Cache (rso-rc) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Root folder resolution: CLI arg → RSO_ROOT → TOML → OS default
    let toml_config = TomlConfig::load();
    let cli_root = std::env::args().nth(1);
    let root_folder = resolve_root_folder(cli_root.as_deref(), &toml_config);
    let db_path = ensure_root_folder(&root_folder)?;
    info!("Database: {}", db_path.display());

    let db_pool = rso_rc::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // OMDb API key: Database → ENV → TOML; the service starts without one
    // and answers from cache until it is configured
    let api_key = rso_rc::config::resolve_omdb_api_key(&db_pool, &toml_config).await?;
    let api_key = Arc::new(RwLock::new(api_key));

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(100);

    // Cache stack, explicitly constructed and injected
    let store = Arc::new(RatingStore::new(db_pool.clone()));
    let session = Arc::new(SessionCache::new());
    let limiter = Arc::new(RateLimiter::default());
    let provider = Arc::new(
        OmdbClient::new().map_err(|e| anyhow::anyhow!("OMDb client init failed: {}", e))?,
    );
    let orchestrator = Arc::new(FetchOrchestrator::new(
        store,
        session,
        limiter,
        provider,
        Arc::clone(&api_key),
        event_bus.clone(),
    ));

    let state = AppState::new(db_pool, event_bus, orchestrator, api_key);
    let app = rso_rc::build_router(state);

    let port = toml_config.port.unwrap_or(5741);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
