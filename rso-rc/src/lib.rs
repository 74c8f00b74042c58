//! rso-rc library interface
//!
//! Exposes the cache stack and HTTP surface for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use rso_common::events::EventBus;

use crate::services::{ApiKeyHandle, FetchOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (settings + durable rating cache)
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// The cache stack behind the message interface
    pub orchestrator: Arc<FetchOrchestrator>,
    /// Live OMDb API key, swapped by the settings endpoint
    pub api_key: ApiKeyHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: Arc<FetchOrchestrator>,
        api_key: ApiKeyHandle,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            api_key,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::ratings_routes())
        .merge(api::cache_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .route("/api/events", get(api::event_stream))
        .route("/api/ratings/events", get(api::title_event_stream))
        .with_state(state)
}
