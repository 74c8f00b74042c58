//! OMDb API client
//!
//! OMDb is the one third-party API carrying IMDb, Rotten Tomatoes and
//! Metacritic scores in a single response. Lookup is two-phase: an exact
//! title(+year) query first, then a fuzzy search fallback where candidates
//! are scored by title similarity and the best one above threshold is
//! resolved by IMDb ID.
//!
//! Transport, HTTP and parse failures are errors for the orchestrator to
//! handle; a non-exceptional "no match" is a structured negative result.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Ratings, SourceRating};

const OMDB_BASE_URL: &str = "https://www.omdbapi.com/";
const USER_AGENT: &str = "RSO/0.1.0 (https://github.com/rso/rso)";

/// Minimum similarity score for a fuzzy candidate to be accepted
const MIN_MATCH_SCORE: u32 = 40;

/// Flat ranking bonus for movie candidates over series when scores are close
const MOVIE_BONUS: u32 = 5;

/// OMDb client errors
#[derive(Debug, Error)]
pub enum OmdbError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid or unauthorized API key")]
    InvalidApiKey,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A resolved provider match, normalized for the orchestrator
#[derive(Debug, Clone)]
pub struct ProviderMatch {
    /// IMDb ID of the matched record
    pub imdb_id: Option<String>,
    /// Title as the provider reports it
    pub title: String,
    /// Year as the provider reports it
    pub year: Option<String>,
    /// Per-source ratings parsed from the response
    pub ratings: Ratings,
}

/// Provider lookup outcome: a match, or a definitive no-record answer
#[derive(Debug, Clone)]
pub enum ProviderResult {
    Found(ProviderMatch),
    NotFound,
}

/// Seam between the orchestrator and the concrete ratings API
#[async_trait]
pub trait RatingsProvider: Send + Sync {
    async fn lookup(
        &self,
        api_key: &str,
        title: &str,
        year: Option<&str>,
    ) -> Result<ProviderResult, OmdbError>;
}

/// OMDb detail response (`?t=` and `?i=` queries)
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbDetail {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "imdbID", default)]
    pub imdb_id: Option<String>,
    #[serde(rename = "Type", default)]
    pub media_type: Option<String>,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes", default)]
    pub imdb_votes: Option<String>,
    #[serde(rename = "Ratings", default)]
    pub ratings: Vec<OmdbRating>,
}

/// One element of the OMDb `Ratings` array
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbRating {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// One hit of an OMDb `?s=` search page
#[derive(Debug, Clone, Deserialize)]
pub struct OmdbSearchHit {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    #[serde(rename = "Type", default)]
    pub media_type: Option<String>,
}

/// Raw OMDb response envelope: every query answers 200 with a
/// `Response: "True"/"False"` marker and an `Error` message on failure.
#[derive(Debug, Deserialize)]
struct OmdbEnvelope {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Search", default)]
    search: Option<Vec<OmdbSearchHit>>,
    #[serde(flatten)]
    detail: serde_json::Value,
}

impl OmdbEnvelope {
    fn is_success(&self) -> bool {
        self.response.eq_ignore_ascii_case("true")
    }
}

/// OMDb API client
pub struct OmdbClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OmdbClient {
    pub fn new() -> Result<Self, OmdbError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OmdbError::NetworkError(e.to_string()))?;

        Ok(Self { http_client, base_url: OMDB_BASE_URL.to_string() })
    }

    /// Exact lookup by title (+year when known)
    async fn lookup_exact(
        &self,
        api_key: &str,
        title: &str,
        year: Option<&str>,
    ) -> Result<Option<OmdbDetail>, OmdbError> {
        let mut params = vec![("apikey", api_key.to_string()), ("t", title.to_string())];
        if let Some(y) = year {
            params.push(("y", y.to_string()));
        }

        tracing::debug!(title = %title, year = ?year, "OMDb exact lookup");
        let envelope = self.get(&params).await?;
        self.into_detail(envelope)
    }

    /// Search query for the fuzzy fallback
    async fn search(&self, api_key: &str, query: &str) -> Result<Vec<OmdbSearchHit>, OmdbError> {
        let params = vec![("apikey", api_key.to_string()), ("s", query.to_string())];

        tracing::debug!(query = %query, "OMDb search");
        let envelope = self.get(&params).await?;
        if !envelope.is_success() {
            // "Movie not found!" / "Too many results." are definitive no-candidate answers
            return Ok(Vec::new());
        }
        Ok(envelope.search.unwrap_or_default())
    }

    /// Detail lookup by IMDb ID
    async fn lookup_by_id(
        &self,
        api_key: &str,
        imdb_id: &str,
    ) -> Result<Option<OmdbDetail>, OmdbError> {
        let params = vec![("apikey", api_key.to_string()), ("i", imdb_id.to_string())];

        tracing::debug!(imdb_id = %imdb_id, "OMDb detail lookup");
        let envelope = self.get(&params).await?;
        self.into_detail(envelope)
    }

    async fn get(&self, params: &[(&str, String)]) -> Result<OmdbEnvelope, OmdbError> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| OmdbError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 401 {
            return Err(OmdbError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OmdbError::ApiError(status.as_u16(), error_text));
        }

        response.json::<OmdbEnvelope>().await.map_err(|e| OmdbError::ParseError(e.to_string()))
    }

    fn into_detail(&self, envelope: OmdbEnvelope) -> Result<Option<OmdbDetail>, OmdbError> {
        if !envelope.is_success() {
            tracing::debug!(error = ?envelope.error, "OMDb reported no match");
            return Ok(None);
        }
        serde_json::from_value::<OmdbDetail>(envelope.detail)
            .map(Some)
            .map_err(|e| OmdbError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RatingsProvider for OmdbClient {
    async fn lookup(
        &self,
        api_key: &str,
        title: &str,
        year: Option<&str>,
    ) -> Result<ProviderResult, OmdbError> {
        // Phase 1: exact lookup, returned verbatim when the provider is definitive
        if let Some(detail) = self.lookup_exact(api_key, title, year).await? {
            tracing::info!(title = %detail.title, "OMDb exact match");
            return Ok(ProviderResult::Found(provider_match(detail)));
        }

        // Phase 2: fuzzy fallback over a cleaned search query
        let query = clean_search_title(title);
        if query.is_empty() {
            return Ok(ProviderResult::NotFound);
        }

        let hits = self.search(api_key, &query).await?;
        let Some(best) = select_best_candidate(title, &hits) else {
            tracing::debug!(title = %title, candidates = hits.len(), "No fuzzy candidate above threshold");
            return Ok(ProviderResult::NotFound);
        };

        tracing::info!(
            title = %title,
            matched = %best.title,
            imdb_id = %best.imdb_id,
            "OMDb fuzzy match"
        );

        match self.lookup_by_id(api_key, &best.imdb_id).await? {
            Some(detail) => Ok(ProviderResult::Found(provider_match(detail))),
            None => Ok(ProviderResult::NotFound),
        }
    }
}

/// Normalize an OMDb detail response into a [`ProviderMatch`]
fn provider_match(detail: OmdbDetail) -> ProviderMatch {
    ProviderMatch {
        ratings: parse_ratings(&detail),
        imdb_id: detail.imdb_id,
        title: detail.title,
        year: detail.year.filter(|y| !is_na(y)),
    }
}

/// Parse per-source ratings from an OMDb detail response.
///
/// The `Ratings` array is authoritative; the flat `imdbRating`/`imdbVotes`
/// fields fill in the IMDb slot when the array omits it. "N/A" means the
/// field is absent, not an empty score.
fn parse_ratings(detail: &OmdbDetail) -> Ratings {
    let mut ratings = Ratings::default();

    for rating in &detail.ratings {
        if is_na(&rating.value) {
            continue;
        }
        match rating.source.as_str() {
            "Internet Movie Database" => {
                ratings.imdb = Some(SourceRating::new(rating.value.clone()))
            }
            "Rotten Tomatoes" => {
                ratings.rotten_tomatoes = Some(SourceRating::new(rating.value.clone()))
            }
            "Metacritic" => ratings.metacritic = Some(SourceRating::new(rating.value.clone())),
            other => tracing::debug!(source = %other, "Ignoring unknown rating source"),
        }
    }

    if let Some(score) = detail.imdb_rating.as_deref().filter(|s| !is_na(s)) {
        let votes = detail.imdb_votes.clone().filter(|v| !is_na(v));
        ratings.imdb = Some(SourceRating { score: score.to_string(), votes });
    }

    ratings
}

fn is_na(value: &str) -> bool {
    value.trim().is_empty() || value.trim().eq_ignore_ascii_case("n/a")
}

/// Strip parenthetical and trailing season-number suffixes for the search
/// query ("Dark (2017)" → "Dark", "Stranger Things: Season 4" →
/// "Stranger Things").
pub fn clean_search_title(title: &str) -> String {
    let mut cleaned = title;

    if let Some(idx) = cleaned.find('(') {
        cleaned = &cleaned[..idx];
    }

    let lower = cleaned.to_ascii_lowercase();
    if let Some(idx) = lower.rfind("season") {
        let rest = lower[idx + "season".len()..].trim();
        if rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit()) {
            cleaned = &cleaned[..idx];
        }
    }

    cleaned.trim().trim_end_matches([':', '-']).trim().to_string()
}

/// Title similarity on a 0–100 scale: exact case-insensitive match 100,
/// prefix containment 80/70 (direction-dependent), substring containment
/// 60/50, else word-overlap ratio scaled to a max of 40.
pub fn title_similarity(query: &str, candidate: &str) -> u32 {
    let q = query.trim().to_lowercase();
    let c = candidate.trim().to_lowercase();

    if q.is_empty() || c.is_empty() {
        return 0;
    }
    if q == c {
        return 100;
    }
    if c.starts_with(&q) {
        return 80;
    }
    if q.starts_with(&c) {
        return 70;
    }
    if c.contains(&q) {
        return 60;
    }
    if q.contains(&c) {
        return 50;
    }

    let query_words: HashSet<&str> = q.split_whitespace().collect();
    let candidate_words: HashSet<&str> = c.split_whitespace().collect();
    let common = query_words.intersection(&candidate_words).count();
    let larger = query_words.len().max(candidate_words.len());

    ((common as f64 / larger as f64) * 40.0).round() as u32
}

/// Ranking score: similarity plus a flat movie-over-series bonus. Base
/// scores land on 10-point tiers, so the bonus reorders near-ties without
/// promoting a candidate across a tier.
fn candidate_score(query: &str, hit: &OmdbSearchHit) -> u32 {
    let base = title_similarity(query, &hit.title);
    if hit.media_type.as_deref() == Some("movie") {
        base + MOVIE_BONUS
    } else {
        base
    }
}

/// Highest-scoring candidate at or above threshold; earlier hits win ties
fn select_best_candidate<'a>(query: &str, hits: &'a [OmdbSearchHit]) -> Option<&'a OmdbSearchHit> {
    let mut best: Option<(&OmdbSearchHit, u32)> = None;
    for hit in hits {
        let score = candidate_score(query, hit);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((hit, score));
        }
    }
    best.filter(|(_, score)| *score >= MIN_MATCH_SCORE).map(|(hit, _)| hit)
}
