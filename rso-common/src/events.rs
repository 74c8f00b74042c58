//! Event types for the RSO event system
//!
//! Provides shared event definitions and the EventBus used by rso-rc for
//! SSE broadcasting. Events are emitted when the cache learns something a
//! connected overlay client may want to repaint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// RSO event types
///
/// Events are broadcast via the EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OverlayEvent {
    /// Ratings for a title were fetched or refreshed
    ///
    /// Triggers:
    /// - SSE: overlay clients repaint badges for the affected title
    RatingsUpdated {
        /// Master cache key the entry is stored under
        key: String,
        /// Display title
        title: String,
        /// Fetch outcome ("success", "not_found", "error")
        status: String,
        /// When the update was applied
        timestamp: DateTime<Utc>,
    },

    /// The rating cache was cleared
    CacheCleared {
        /// Number of durable keys removed
        cleared_count: u64,
        /// When the clear happened
        timestamp: DateTime<Utc>,
    },

    /// An OMDb API key was configured
    ///
    /// Carries no key material; clients only need to know fetching is
    /// possible again.
    ApiKeyConfigured {
        /// When the key was stored
        timestamp: DateTime<Utc>,
    },
}

impl OverlayEvent {
    /// Event type name for SSE `event:` fields
    pub fn event_type(&self) -> &str {
        match self {
            OverlayEvent::RatingsUpdated { .. } => "RatingsUpdated",
            OverlayEvent::CacheCleared { .. } => "CacheCleared",
            OverlayEvent::ApiKeyConfigured { .. } => "ApiKeyConfigured",
        }
    }
}

/// Broadcast bus carrying [`OverlayEvent`]s to SSE clients
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OverlayEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Cache updates are not critical events; it is acceptable for no
    /// overlay client to be connected.
    pub fn emit_lossy(&self, event: OverlayEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
