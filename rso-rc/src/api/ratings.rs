//! Ratings lookup endpoint
//!
//! POST /api/ratings is the FETCH_RATINGS message: the overlay glue sends
//! whatever identity the scraper could extract, the cache stack answers
//! with a structured result and the layer that satisfied it.

use axum::{extract::State, routing::post, Json, Router};

use crate::models::{FetchRatingsRequest, RatingsResponse};
use crate::services::cache_key;
use crate::{ApiError, ApiResult, AppState};

/// POST /api/ratings
///
/// **Request:** `{"video_id": "...", "title": "...", "year": "...",
/// "check_freshness": false, "enrich_existing": false}` (title required)
///
/// **Response:** `{"success": true, "data": {...}, "source": "memory"}`
///
/// Titles that normalize to nothing are rejected before keying; caching
/// them would collide every unresolvable title on the same key.
pub async fn fetch_ratings(
    State(state): State<AppState>,
    Json(payload): Json<FetchRatingsRequest>,
) -> ApiResult<Json<RatingsResponse>> {
    if payload.video_id.is_none() && cache_key::normalize_title(&payload.title).is_empty() {
        return Err(ApiError::BadRequest(
            "Title must contain at least one alphanumeric character".to_string(),
        ));
    }

    tracing::debug!(
        video_id = ?payload.video_id,
        title = %payload.title,
        year = ?payload.year,
        "Ratings lookup"
    );

    let response = state.orchestrator.get(payload).await;

    if let Some(error) = &response.error {
        *state.last_error.write().await = Some(error.clone());
    }

    Ok(Json(response))
}

/// Build ratings routes
pub fn ratings_routes() -> Router<AppState> {
    Router::new().route("/api/ratings", post(fetch_ratings))
}
