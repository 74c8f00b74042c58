//! Fetch orchestration: coalescing, cache-first lookup, enrichment
//!
//! One logical request is identified by its request key. The first caller
//! for a key runs the fetch; concurrent callers for the same key attach to
//! the in-flight work instead of issuing a second provider call. The
//! pending entry is removed unconditionally when the work settles, so a
//! failed fetch can never leave a stuck coalescing slot behind.
//!
//! Every path resolves to a structured [`RatingsResponse`]; provider and
//! storage failures never cross this boundary as errors. A stale-but-present
//! success entry is always preferred over surfacing a failure.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use rso_common::events::{EventBus, OverlayEvent};

use crate::models::{
    CacheStats, Completeness, FetchRatingsRequest, FetchStatus, RatingEntry, RatingsResponse,
    Source,
};
use crate::services::cache_key;
use crate::services::omdb_client::{OmdbError, ProviderResult, RatingsProvider};
use crate::services::rate_limiter::RateLimiter;
use crate::services::rating_merger;
use crate::services::rating_store::RatingStore;
use crate::services::session_cache::SessionCache;

/// Error code surfaced when no provider credential is configured
const ERR_NO_API_KEY: &str = "NO_API_KEY";
/// Error code for a definitive provider no-record answer
const ERR_NOT_FOUND: &str = "NOT_FOUND";
/// Error code for network/HTTP/parse failures
const ERR_TRANSPORT: &str = "TRANSPORT_ERROR";

/// Shared handle to the configured OMDb API key; the settings endpoint
/// swaps the value at runtime.
pub type ApiKeyHandle = Arc<RwLock<Option<String>>>;

/// Coalescing fetch orchestrator over the cache layers and the provider
pub struct FetchOrchestrator {
    store: Arc<RatingStore>,
    session: Arc<SessionCache>,
    limiter: Arc<RateLimiter>,
    provider: Arc<dyn RatingsProvider>,
    api_key: ApiKeyHandle,
    event_bus: EventBus,
    pending: Mutex<HashMap<String, broadcast::Sender<RatingsResponse>>>,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<RatingStore>,
        session: Arc<SessionCache>,
        limiter: Arc<RateLimiter>,
        provider: Arc<dyn RatingsProvider>,
        api_key: ApiKeyHandle,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            session,
            limiter,
            provider,
            api_key,
            event_bus,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a ratings request through session cache, durable cache and
    /// provider, in that order.
    pub async fn get(self: &Arc<Self>, request: FetchRatingsRequest) -> RatingsResponse {
        if request.video_id.is_none() && cache_key::normalize_title(&request.title).is_empty() {
            return RatingsResponse::failure("Title normalizes to nothing, refusing to cache");
        }

        let request_key = cache_key::key_for(
            request.video_id.as_deref(),
            &request.title,
            request.year.as_deref(),
        );

        // Session layer: exact-key hit answers immediately
        if let Some(entry) = self.session.peek(&request_key).await {
            let enrichable = entry.is_success()
                && entry.is_partial()
                && request.year.is_some()
                && request.enrich_existing;

            if !enrichable {
                if request.check_freshness {
                    // Stale-while-revalidate: the caller gets the cached
                    // value now, the refresh lands via publish later
                    self.spawn_refresh(request.clone());
                }
                return cached_response(entry, Source::Memory);
            }
        }

        self.coalesced(request_key, request).await
    }

    /// Attach to in-flight work for the key, or become the runner
    async fn coalesced(
        self: &Arc<Self>,
        request_key: String,
        request: FetchRatingsRequest,
    ) -> RatingsResponse {
        let mut rx = {
            let mut pending = self.pending.lock().await;
            match pending.get(&request_key) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    pending.insert(request_key.clone(), tx);
                    drop(pending);

                    let response = self.fetch(&request, false).await;

                    // Remove before broadcasting: the map must never hold a
                    // settled request, even if no subscriber is listening
                    let tx = self.pending.lock().await.remove(&request_key);
                    if let Some(tx) = tx {
                        let _ = tx.send(response.clone());
                    }
                    return response;
                }
            }
        };

        tracing::debug!(key = %request_key, "Coalescing onto in-flight request");
        match rx.recv().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key = %request_key, "Coalesced request dropped: {}", e);
                RatingsResponse::failure(ERR_TRANSPORT)
            }
        }
    }

    /// The decision sequence for one fetch. `force_refresh` skips the
    /// cached-return shortcut (used by background revalidation) but keeps
    /// merge semantics.
    async fn fetch(self: &Arc<Self>, request: &FetchRatingsRequest, force_refresh: bool) -> RatingsResponse {
        let video_id = request.video_id.as_deref();
        let year = request.year.as_deref();

        // 1. Persisted entry, most specific candidate key first
        let existing = self.store.get(video_id, &request.title, year).await;

        if let Some(entry) = &existing {
            let enrichable = entry.is_success()
                && entry.is_partial()
                && request.year.is_some()
                && request.enrich_existing;

            // 2. Fresh cached answer (positive or negative) short-circuits
            if !force_refresh && !enrichable {
                self.session.publish(entry).await;
                if request.check_freshness {
                    self.spawn_refresh(request.clone());
                }
                return cached_response(entry.clone(), Source::Storage);
            }
            // 3. Partial entry with a year now available: enrichment fetch,
            //    merged below rather than overwritten
        }

        // 4. No credential: best cached entry wins, else NO_API_KEY
        let api_key = self.api_key.read().await.clone().filter(|k| !k.trim().is_empty());
        let Some(api_key) = api_key else {
            return match existing {
                Some(entry) => cached_response(entry, Source::Storage),
                None => RatingsResponse::failure(ERR_NO_API_KEY),
            };
        };

        // 5. Rate-limiter token (suspends when the bucket is exhausted)
        self.limiter.acquire().await;

        // 6. Provider call
        match self.provider.lookup(&api_key, &request.title, year).await {
            // 7. Success: normalize, attach identity, merge, persist
            Ok(ProviderResult::Found(found)) => {
                let fresh = RatingEntry {
                    video_id: request.video_id.clone(),
                    imdb_id: found.imdb_id,
                    normalized_title: cache_key::normalize_title(&found.title),
                    title: found.title,
                    year: request.year.clone().or(found.year),
                    ratings: found.ratings,
                    status: FetchStatus::Success,
                    // Disambiguation comes from the caller's year, not the
                    // provider's: without it the entry stays enrichable
                    completeness: if request.year.is_some() {
                        Completeness::Full
                    } else {
                        Completeness::Partial
                    },
                    fetched_at: chrono::Utc::now(),
                    enriched_at: None,
                };

                let merged = match &existing {
                    Some(prior) => rating_merger::merge(prior, fresh),
                    None => fresh,
                };

                self.commit(&merged).await;
                RatingsResponse::hit(merged, Source::Api)
            }

            // 8a. Definitive no-record answer
            Ok(ProviderResult::NotFound) => {
                if let Some(entry) = existing.filter(|e| e.is_success()) {
                    tracing::debug!(title = %request.title, "Provider lost the record, serving cached entry");
                    return cached_response(entry, Source::Storage);
                }

                let negative = RatingEntry::negative(
                    FetchStatus::NotFound,
                    request.video_id.clone(),
                    &request.title,
                    request.year.clone(),
                );
                self.commit(&negative).await;
                RatingsResponse::failure_with_entry(ERR_NOT_FOUND, negative, Source::Api)
            }

            // 8b. Transport/API failure
            Err(e) => {
                if matches!(e, OmdbError::InvalidApiKey) {
                    tracing::warn!("OMDb rejected the configured API key");
                    return match existing {
                        Some(entry) => cached_response(entry, Source::Storage),
                        None => RatingsResponse::failure(ERR_NO_API_KEY),
                    };
                }

                tracing::warn!(title = %request.title, "Provider call failed: {}", e);
                if let Some(entry) = existing.filter(|e| e.is_success()) {
                    return cached_response(entry, Source::Storage);
                }

                let negative = RatingEntry::negative(
                    FetchStatus::Error,
                    request.video_id.clone(),
                    &request.title,
                    request.year.clone(),
                );
                self.commit(&negative).await;
                RatingsResponse::failure_with_entry(ERR_TRANSPORT, negative, Source::Api)
            }
        }
    }

    /// Write-through: durable store, session fan-out, event bus
    async fn commit(&self, entry: &RatingEntry) {
        self.store.set(entry).await;
        self.session.publish(entry).await;

        self.event_bus.emit_lossy(OverlayEvent::RatingsUpdated {
            key: entry.master_key(),
            title: entry.title.clone(),
            status: entry.status.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Detached background refresh; never awaited by its trigger, failures
    /// are logged only.
    fn spawn_refresh(self: &Arc<Self>, request: FetchRatingsRequest) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let title = request.title.clone();
            let response = orchestrator.fetch(&request, true).await;
            if !response.success {
                tracing::debug!(
                    title = %title,
                    error = ?response.error,
                    "Background refresh did not produce fresh data"
                );
            }
        });
    }

    /// Session layer handle, for per-key subscription streams
    pub fn session(&self) -> &Arc<SessionCache> {
        &self.session
    }

    /// Cache layer statistics for the admin endpoint
    pub async fn stats(&self) -> CacheStats {
        let (_, storage_size) = self.store.stats().await;
        CacheStats {
            memory_size: self.session.len().await as u64,
            storage_size,
            pending_requests: self.pending.lock().await.len() as u64,
        }
    }

    /// Clear both cache layers; returns the number of durable keys removed
    pub async fn clear(&self) -> u64 {
        let cleared = self.store.clear().await;
        self.session.clear().await;
        self.event_bus.emit_lossy(OverlayEvent::CacheCleared {
            cleared_count: cleared,
            timestamp: chrono::Utc::now(),
        });
        cleared
    }
}

/// Map a cached entry to the response its status implies
fn cached_response(entry: RatingEntry, source: Source) -> RatingsResponse {
    match entry.status {
        FetchStatus::Success => RatingsResponse::hit(entry, source),
        FetchStatus::NotFound => RatingsResponse::failure_with_entry(ERR_NOT_FOUND, entry, source),
        FetchStatus::Error => RatingsResponse::failure_with_entry(ERR_TRANSPORT, entry, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::Ratings;
    use crate::services::omdb_client::ProviderMatch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted provider: counts calls, optionally delays, answers from a
    /// fixed response.
    struct ScriptedProvider {
        calls: AtomicUsize,
        delay: Duration,
        response: Box<dyn Fn() -> Result<ProviderResult, OmdbError> + Send + Sync>,
    }

    impl ScriptedProvider {
        fn found(title: &str, year: Option<&str>, imdb_score: Option<&str>, rt_score: Option<&str>) -> Self {
            let title = title.to_string();
            let year = year.map(str::to_string);
            let imdb_score = imdb_score.map(str::to_string);
            let rt_score = rt_score.map(str::to_string);
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                response: Box::new(move || {
                    Ok(ProviderResult::Found(ProviderMatch {
                        imdb_id: Some("tt1375666".to_string()),
                        title: title.clone(),
                        year: year.clone(),
                        ratings: Ratings {
                            imdb: imdb_score.clone().map(crate::models::SourceRating::new),
                            rotten_tomatoes: rt_score.clone().map(crate::models::SourceRating::new),
                            metacritic: None,
                        },
                    }))
                }),
            }
        }

        fn not_found() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                response: Box::new(|| Ok(ProviderResult::NotFound)),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                response: Box::new(|| Err(OmdbError::NetworkError("connection refused".to_string()))),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RatingsProvider for ScriptedProvider {
        async fn lookup(
            &self,
            _api_key: &str,
            _title: &str,
            _year: Option<&str>,
        ) -> Result<ProviderResult, OmdbError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.response)()
        }
    }

    async fn orchestrator(
        provider: Arc<ScriptedProvider>,
        api_key: Option<&str>,
    ) -> Arc<FetchOrchestrator> {
        let db = test_pool().await;
        Arc::new(FetchOrchestrator::new(
            Arc::new(RatingStore::new(db)),
            Arc::new(SessionCache::new()),
            Arc::new(RateLimiter::new(100, Duration::from_millis(1000))),
            provider,
            Arc::new(RwLock::new(api_key.map(str::to_string))),
            EventBus::new(16),
        ))
    }

    fn request(title: &str, year: Option<&str>) -> FetchRatingsRequest {
        FetchRatingsRequest {
            video_id: None,
            title: title.to_string(),
            year: year.map(str::to_string),
            check_freshness: false,
            enrich_existing: false,
        }
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce_into_one_provider_call() {
        let provider = Arc::new(
            ScriptedProvider::found("Inception", Some("2010"), Some("8.8"), None)
                .with_delay(Duration::from_millis(50)),
        );
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.get(request("Inception", Some("2010"))).await
            }));
        }

        for handle in handles {
            let response = handle.await.unwrap();
            assert!(response.success);
            assert_eq!(response.data.unwrap().ratings.imdb.unwrap().score, "8.8");
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn pending_map_drains_after_settle() {
        let provider = Arc::new(ScriptedProvider::failing());
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        let response = orch.get(request("Inception", None)).await;
        assert!(!response.success);
        assert_eq!(orch.stats().await.pending_requests, 0);
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::found("Inception", Some("2010"), Some("8.8"), None));
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        let first = orch.get(request("Inception", Some("2010"))).await;
        assert_eq!(first.source, Some(Source::Api));

        let second = orch.get(request("Inception", Some("2010"))).await;
        assert!(second.success);
        assert_eq!(second.source, Some(Source::Memory));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached_and_not_refetched() {
        let provider = Arc::new(ScriptedProvider::not_found());
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        let first = orch.get(request("Zzzznonexistent1234", None)).await;
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("NOT_FOUND"));

        let second = orch.get(request("Zzzznonexistent1234", None)).await;
        assert!(!second.success);
        assert_eq!(second.error.as_deref(), Some("NOT_FOUND"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_provider_call() {
        let provider = Arc::new(ScriptedProvider::found("Inception", None, Some("8.8"), None));
        let orch = orchestrator(Arc::clone(&provider), None).await;

        let response = orch.get(request("Inception", None)).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("NO_API_KEY"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_still_serves_cached_entry() {
        let provider = Arc::new(ScriptedProvider::found("Inception", Some("2010"), Some("8.8"), None));
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;
        orch.get(request("Inception", Some("2010"))).await;

        // Key removed at runtime, session layer cleared to force the
        // storage path
        *orch.api_key.write().await = None;
        orch.session.clear().await;

        let response = orch.get(request("Inception", Some("2010"))).await;
        assert!(response.success);
        assert_eq!(response.source, Some(Source::Storage));
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_cached_success() {
        let good = Arc::new(ScriptedProvider::found("Inception", None, Some("8.8"), None));
        let orch = orchestrator(Arc::clone(&good), Some("key")).await;

        // Seed a partial success entry
        let seeded = orch.get(request("Inception", None)).await;
        assert!(seeded.data.unwrap().is_partial());

        // Same stores, failing provider; enrichment forces a provider call
        let failing = Arc::new(ScriptedProvider::failing());
        let orch2 = Arc::new(FetchOrchestrator::new(
            Arc::clone(&orch.store),
            Arc::clone(&orch.session),
            Arc::clone(&orch.limiter),
            failing.clone(),
            Arc::clone(&orch.api_key),
            EventBus::new(16),
        ));

        let mut req = request("Inception", Some("2010"));
        req.enrich_existing = true;
        let response = orch2.get(req).await;

        // The failure is swallowed, the cached partial entry answers
        assert!(response.success);
        assert_eq!(response.source, Some(Source::Storage));
        assert_eq!(response.data.unwrap().ratings.imdb.unwrap().score, "8.8");
        assert_eq!(failing.call_count(), 1);
    }

    #[tokio::test]
    async fn enrichment_merges_partial_into_full() {
        let provider = Arc::new(ScriptedProvider::found("Inception", None, Some("8.8"), None));
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        // First fetch without year: partial entry
        let first = orch.get(request("Inception", None)).await;
        let entry = first.data.unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(entry.ratings.imdb.as_ref().unwrap().score, "8.8");

        // Second fetch with year and enrichment: merged full entry
        let enriched_provider = Arc::new(ScriptedProvider::found(
            "Inception",
            Some("2010"),
            None,
            Some("87%"),
        ));
        let orch2 = Arc::new(FetchOrchestrator::new(
            Arc::clone(&orch.store),
            Arc::clone(&orch.session),
            Arc::clone(&orch.limiter),
            enriched_provider.clone(),
            Arc::clone(&orch.api_key),
            EventBus::new(16),
        ));

        let mut req = request("Inception", Some("2010"));
        req.enrich_existing = true;
        let response = orch2.get(req).await;

        let merged = response.data.unwrap();
        assert_eq!(merged.completeness, Completeness::Full);
        assert_eq!(merged.ratings.imdb.unwrap().score, "8.8");
        assert_eq!(merged.ratings.rotten_tomatoes.unwrap().score, "87%");
        assert!(merged.enriched_at.is_some());
        assert_eq!(enriched_provider.call_count(), 1);
    }

    #[tokio::test]
    async fn check_freshness_triggers_background_refresh() {
        let provider = Arc::new(ScriptedProvider::found("Heat", Some("1995"), Some("8.3"), None));
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        orch.get(request("Heat", Some("1995"))).await;
        assert_eq!(provider.call_count(), 1);

        let mut req = request("Heat", Some("1995"));
        req.check_freshness = true;
        let response = orch.get(req).await;
        assert!(response.success);
        assert_eq!(response.source, Some(Source::Memory));

        // The detached refresh lands shortly after
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn unkeyable_title_is_rejected() {
        let provider = Arc::new(ScriptedProvider::not_found());
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;

        let response = orch.get(request("???", None)).await;
        assert!(!response.success);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn clear_empties_both_layers() {
        let provider = Arc::new(ScriptedProvider::found("Heat", Some("1995"), Some("8.3"), None));
        let orch = orchestrator(Arc::clone(&provider), Some("key")).await;
        orch.get(request("Heat", Some("1995"))).await;

        let cleared = orch.clear().await;
        assert!(cleared > 0);

        let stats = orch.stats().await;
        assert_eq!(stats.memory_size, 0);
        assert_eq!(stats.storage_size, 0);
    }
}
