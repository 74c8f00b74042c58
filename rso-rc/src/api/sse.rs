//! Server-Sent Events (SSE) stream of cache events
//!
//! Overlay clients keep one stream open and repaint badges when a
//! `RatingsUpdated` event lands for a title they display.

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::services::cache_key;
use crate::AppState;

/// GET /api/events - SSE stream of cache events
///
/// Streams events:
/// - RatingsUpdated
/// - CacheCleared
/// - ApiKeyConfigured
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to cache events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                Ok(event) = rx.recv() => {
                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default()
                                .event(event_type)
                                .data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Identity of the title a client wants to watch
#[derive(Debug, Deserialize)]
pub struct WatchParams {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
}

/// GET /api/ratings/events - SSE stream of updates for one title
///
/// Subscribes to the session layer under the request key. The current
/// cached value, if any, is replayed as the first event; later fetches and
/// background refreshes stream in as they land. Dropping the connection
/// drops the receiver, and the session layer prunes the subscription on
/// its next delivery attempt.
pub async fn title_event_stream(
    State(state): State<AppState>,
    Query(params): Query<WatchParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let key = cache_key::key_for(
        params.video_id.as_deref(),
        params.title.as_deref().unwrap_or_default(),
        params.year.as_deref(),
    );

    info!(key = %key, "New SSE client watching title");
    let mut subscription = state.orchestrator.session().subscribe(&key).await;

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                entry = subscription.rx.recv() => {
                    match entry {
                        Some(entry) => {
                            match serde_json::to_string(&entry) {
                                Ok(json) => yield Ok(Event::default().event("RatingEntry").data(json)),
                                Err(e) => warn!("SSE: Failed to serialize entry: {}", e),
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
