//! Cache administration endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::models::CacheStats;
use crate::AppState;

/// GET /api/cache/stats response
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub success: bool,
    pub stats: CacheStats,
}

/// POST /api/cache/clear response
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub cleared_count: u64,
}

/// GET /api/cache/stats
///
/// Sizes of both cache layers plus in-flight coalesced requests.
pub async fn get_cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let stats = state.orchestrator.stats().await;
    Json(CacheStatsResponse { success: true, stats })
}

/// POST /api/cache/clear
///
/// Drops every durable key in the rating namespace and the session layer.
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let cleared_count = state.orchestrator.clear().await;
    tracing::info!(cleared_count, "Rating cache cleared");
    Json(ClearCacheResponse { success: true, cleared_count })
}

/// Build cache admin routes
pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cache/stats", get(get_cache_stats))
        .route("/api/cache/clear", post(clear_cache))
}
