//! Data model for the ratings cache
//!
//! The durable unit is [`RatingEntry`]: one title's third-party ratings plus
//! the metadata needed to decide how long it stays trustworthy. Entries are
//! persisted as [`StoredValue`]s so a durable key can hold either the entry
//! itself or a pointer to the master key that does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::cache_key;

/// Outcome of the fetch that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Provider returned ratings data
    Success,
    /// Provider has no matching record
    NotFound,
    /// Transport or provider failure
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::NotFound => "not_found",
            FetchStatus::Error => "error",
        }
    }
}

/// Whether the entry was resolved with a disambiguating year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Fetched without year context; eligible for later enrichment
    Partial,
    /// Fetched with a disambiguating year
    Full,
}

/// One source's rating for a title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRating {
    /// Display score as the source reports it ("8.8", "87%", "74/100")
    pub score: String,
    /// Vote count, where the source reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<String>,
}

impl SourceRating {
    pub fn new(score: impl Into<String>) -> Self {
        Self { score: score.into(), votes: None }
    }

    pub fn with_votes(score: impl Into<String>, votes: impl Into<String>) -> Self {
        Self { score: score.into(), votes: Some(votes.into()) }
    }
}

/// Ratings from each supported source, each independently absent
///
/// Absent means the source did not report a score; an entry never fabricates
/// a value for a missing source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb: Option<SourceRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotten_tomatoes: Option<SourceRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metacritic: Option<SourceRating>,
}

impl Ratings {
    pub fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.rotten_tomatoes.is_none() && self.metacritic.is_none()
    }

    /// Number of sources with a score present
    pub fn source_count(&self) -> usize {
        [self.imdb.is_some(), self.rotten_tomatoes.is_some(), self.metacritic.is_some()]
            .iter()
            .filter(|present| **present)
            .count()
    }
}

/// The durable unit of cached knowledge about one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    /// Stable platform ID from the streaming service, when the scraper had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// External database ID (IMDb) once the provider resolved the title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    /// Display title
    pub title: String,
    /// Normalized title used for key derivation
    pub normalized_title: String,
    /// Release year, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Per-source ratings; empty for negative entries
    pub ratings: Ratings,
    /// Outcome of the fetch that produced this entry
    pub status: FetchStatus,
    /// Whether a disambiguating year was available at fetch time
    pub completeness: Completeness,
    /// When the entry was fetched
    pub fetched_at: DateTime<Utc>,
    /// When a later fetch upgraded this entry from partial to full
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
}

impl RatingEntry {
    /// Successful entry carrying ratings data
    pub fn success(
        video_id: Option<String>,
        imdb_id: Option<String>,
        title: &str,
        year: Option<String>,
        ratings: Ratings,
    ) -> Self {
        let completeness = if year.is_some() { Completeness::Full } else { Completeness::Partial };
        Self {
            video_id,
            imdb_id,
            title: title.to_string(),
            normalized_title: cache_key::normalize_title(title),
            year,
            ratings,
            status: FetchStatus::Success,
            completeness,
            fetched_at: Utc::now(),
            enriched_at: None,
        }
    }

    /// Negative entry (not-found or error); carries no ratings payload
    pub fn negative(
        status: FetchStatus,
        video_id: Option<String>,
        title: &str,
        year: Option<String>,
    ) -> Self {
        debug_assert!(status != FetchStatus::Success);
        let completeness = if year.is_some() { Completeness::Full } else { Completeness::Partial };
        Self {
            video_id,
            imdb_id: None,
            title: title.to_string(),
            normalized_title: cache_key::normalize_title(title),
            year,
            ratings: Ratings::default(),
            status,
            completeness,
            fetched_at: Utc::now(),
            enriched_at: None,
        }
    }

    /// Canonical storage key: the platform-ID key when the ID is known,
    /// else the title(+year) key
    pub fn master_key(&self) -> String {
        match &self.video_id {
            Some(id) => format!("id:{}", id),
            None => cache_key::key_for(None, &self.title, self.year.as_deref()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn is_partial(&self) -> bool {
        self.completeness == Completeness::Partial
    }
}

/// What a durable cache key holds: the entry itself, or a one-hop pointer to
/// the master key that does
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredValue {
    /// Full entry stored under its master key (or duplicated in legacy mode)
    Entry(RatingEntry),
    /// Alias pointing at the master key
    Pointer {
        /// Master key the alias dereferences to
        master_key: String,
    },
}

/// Which layer satisfied a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Memory,
    Storage,
    Api,
}

/// Ratings lookup request (the FETCH_RATINGS message)
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRatingsRequest {
    /// Stable platform ID, when the scraper found one
    #[serde(default)]
    pub video_id: Option<String>,
    /// Display title as scraped
    pub title: String,
    /// Release year, when visible in the UI
    #[serde(default)]
    pub year: Option<String>,
    /// Kick off a background refresh even on a cache hit
    #[serde(default)]
    pub check_freshness: bool,
    /// Re-fetch partial entries now that a year is known
    #[serde(default)]
    pub enrich_existing: bool,
}

/// Ratings lookup response
///
/// Every fetch path resolves to one of these; errors never cross the
/// response boundary as exceptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RatingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RatingsResponse {
    pub fn hit(entry: RatingEntry, source: Source) -> Self {
        Self { success: true, data: Some(entry), source: Some(source), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, source: None, error: Some(error.into()) }
    }

    /// Failure that still carries the cached negative entry behind it
    pub fn failure_with_entry(error: impl Into<String>, entry: RatingEntry, source: Source) -> Self {
        Self { success: false, data: Some(entry), source: Some(source), error: Some(error.into()) }
    }
}

/// Cache layer statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries promoted into the in-process memory map
    pub memory_size: u64,
    /// Durable keys under the rating namespace (entries and pointers)
    pub storage_size: u64,
    /// In-flight coalesced requests
    pub pending_requests: u64,
}
