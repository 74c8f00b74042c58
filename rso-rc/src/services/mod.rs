//! Service modules for the ratings cache
//!
//! Dependency order, leaves first: key derivation, rate limiting, the
//! durable store, the session layer, the merge policy, the OMDb client,
//! and the fetch orchestrator tying them together.

pub mod cache_key;
pub mod fetch_orchestrator;
pub mod omdb_client;
pub mod rate_limiter;
pub mod rating_merger;
pub mod rating_store;
pub mod session_cache;

pub use fetch_orchestrator::{ApiKeyHandle, FetchOrchestrator};
pub use omdb_client::{OmdbClient, OmdbError, ProviderMatch, ProviderResult, RatingsProvider};
pub use rate_limiter::RateLimiter;
pub use rating_store::RatingStore;
pub use session_cache::{SessionCache, Subscription};
