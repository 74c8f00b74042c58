//! HTTP API handlers for rso-rc
//!
//! The message interface the overlay glue talks to: ratings lookup, cache
//! administration, settings, health, and the SSE event stream.

pub mod cache;
pub mod health;
pub mod ratings;
pub mod settings;
pub mod sse;

pub use cache::cache_routes;
pub use health::health_routes;
pub use ratings::ratings_routes;
pub use settings::settings_routes;
pub use sse::{event_stream, title_event_stream};
