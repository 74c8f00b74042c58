//! Settings API endpoints
//!
//! POST /api/settings/omdb_api_key configures the provider credential:
//! validate, write to database (authoritative), swap the live key handle,
//! sync to TOML as a best-effort backup. Display toggles gate which badges
//! the overlay paints; they never gate fetching or caching.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use rso_common::events::OverlayEvent;

use crate::db::settings::DisplayToggles;
use crate::{ApiError, ApiResult, AppState};

/// Request payload for setting the OMDb API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    /// The OMDb API key to configure
    pub api_key: String,
}

/// Response payload for settings writes
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable status message
    pub message: String,
}

/// POST /api/settings/omdb_api_key
///
/// **Request:** `{"api_key": "your-omdb-key"}`
/// **Response:** `{"success": true, "message": "..."}`
///
/// **Errors:**
/// - 400 Bad Request: empty or whitespace-only key
/// - 500 Internal Server Error: database write failure
///
/// TOML write failures log warnings but do not fail the request.
pub async fn set_omdb_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    // Database is authoritative
    crate::db::settings::set_omdb_api_key(&state.db, payload.api_key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    // Swap the live handle so in-flight fetch decisions see the new key
    *state.api_key.write().await = Some(payload.api_key.clone());

    info!("OMDb API key configured");
    state.event_bus.emit_lossy(OverlayEvent::ApiKeyConfigured { timestamp: Utc::now() });

    // Sync to TOML (best-effort backup)
    if let Some(toml_path) = rso_common::config::config_file_path() {
        let mut settings = HashMap::new();
        settings.insert("omdb_api_key".to_string(), payload.api_key);

        match crate::config::sync_settings_to_toml(settings, &toml_path).await {
            Ok(()) => info!("API key synced to TOML: {}", toml_path.display()),
            Err(e) => warn!("TOML sync failed (database write succeeded): {}", e),
        }
    }

    Ok(Json(SettingsResponse {
        success: true,
        message: "OMDb API key configured successfully".to_string(),
    }))
}

/// GET /api/settings/display
pub async fn get_display_toggles(State(state): State<AppState>) -> ApiResult<Json<DisplayToggles>> {
    let toggles = crate::db::settings::get_display_toggles(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read display settings: {}", e)))?;
    Ok(Json(toggles))
}

/// POST /api/settings/display
pub async fn set_display_toggles(
    State(state): State<AppState>,
    Json(toggles): Json<DisplayToggles>,
) -> ApiResult<Json<SettingsResponse>> {
    crate::db::settings::set_display_toggles(&state.db, toggles)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save display settings: {}", e)))?;

    Ok(Json(SettingsResponse {
        success: true,
        message: "Display settings saved".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/api/settings/omdb_api_key", post(set_omdb_api_key))
        .route("/api/settings/display", get(get_display_toggles).post(set_display_toggles))
}
