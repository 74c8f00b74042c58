//! Rating entry merging
//!
//! Reconciles a freshly fetched entry with previously cached data for the
//! same title. Merge strategy: fresh values overwrite old, old values are
//! preserved where fresh is absent. The merge is monotonic — the result
//! never carries fewer rating sources, and never lower completeness, than
//! the better of the two inputs.

use chrono::Utc;

use crate::models::{Completeness, RatingEntry};

/// Merge `fresh` over `existing`.
///
/// Per rating source: fresh score if present, else the existing one.
/// Identity fields: fresh if present, else existing. Completeness becomes
/// `Full` if either side already was; an upgrade from `Partial` stamps
/// `enriched_at`.
pub fn merge(existing: &RatingEntry, fresh: RatingEntry) -> RatingEntry {
    let upgraded =
        existing.completeness == Completeness::Partial && fresh.completeness == Completeness::Full;

    let completeness = if fresh.completeness == Completeness::Full
        || existing.completeness == Completeness::Full
    {
        Completeness::Full
    } else {
        Completeness::Partial
    };

    let title = if fresh.title.trim().is_empty() { existing.title.clone() } else { fresh.title };
    let normalized_title = crate::services::cache_key::normalize_title(&title);

    RatingEntry {
        video_id: fresh.video_id.or_else(|| existing.video_id.clone()),
        imdb_id: fresh.imdb_id.or_else(|| existing.imdb_id.clone()),
        title,
        normalized_title,
        year: fresh.year.or_else(|| existing.year.clone()),
        ratings: crate::models::Ratings {
            imdb: fresh.ratings.imdb.or_else(|| existing.ratings.imdb.clone()),
            rotten_tomatoes: fresh
                .ratings
                .rotten_tomatoes
                .or_else(|| existing.ratings.rotten_tomatoes.clone()),
            metacritic: fresh.ratings.metacritic.or_else(|| existing.ratings.metacritic.clone()),
        },
        status: fresh.status,
        completeness,
        fetched_at: fresh.fetched_at,
        enriched_at: if upgraded {
            Some(Utc::now())
        } else {
            fresh.enriched_at.or(existing.enriched_at)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ratings, SourceRating};

    fn entry(imdb: Option<&str>, rt: Option<&str>, year: Option<&str>) -> RatingEntry {
        RatingEntry::success(
            None,
            None,
            "Inception",
            year.map(str::to_string),
            Ratings {
                imdb: imdb.map(SourceRating::new),
                rotten_tomatoes: rt.map(SourceRating::new),
                metacritic: None,
            },
        )
    }

    #[test]
    fn merge_never_loses_a_source() {
        let existing = entry(Some("7.0"), None, None);
        let fresh = entry(None, Some("90%"), None);

        let merged = merge(&existing, fresh);
        assert_eq!(merged.ratings.imdb.unwrap().score, "7.0");
        assert_eq!(merged.ratings.rotten_tomatoes.unwrap().score, "90%");
    }

    #[test]
    fn fresh_score_wins_over_existing() {
        let existing = entry(Some("7.0"), None, None);
        let fresh = entry(Some("7.3"), None, None);

        let merged = merge(&existing, fresh);
        assert_eq!(merged.ratings.imdb.unwrap().score, "7.3");
    }

    #[test]
    fn enrichment_upgrades_completeness_and_stamps_enriched_at() {
        let existing = entry(Some("8.8"), None, None);
        assert_eq!(existing.completeness, Completeness::Partial);

        let fresh = entry(Some("8.8"), Some("87%"), Some("2010"));
        let merged = merge(&existing, fresh);

        assert_eq!(merged.completeness, Completeness::Full);
        assert!(merged.enriched_at.is_some());
        assert_eq!(merged.year.as_deref(), Some("2010"));
    }

    #[test]
    fn completeness_never_regresses() {
        let existing = entry(Some("8.8"), None, Some("2010"));
        let fresh = entry(Some("8.9"), None, None);

        let merged = merge(&existing, fresh);
        assert_eq!(merged.completeness, Completeness::Full);
        assert_eq!(merged.year.as_deref(), Some("2010"));
    }

    #[test]
    fn identity_prefers_fresh_when_present() {
        let mut existing = entry(Some("8.8"), None, None);
        existing.imdb_id = Some("tt0000001".to_string());

        let mut fresh = entry(Some("8.8"), None, None);
        fresh.imdb_id = Some("tt1375666".to_string());
        fresh.video_id = Some("81923746".to_string());

        let merged = merge(&existing, fresh);
        assert_eq!(merged.imdb_id.as_deref(), Some("tt1375666"));
        assert_eq!(merged.video_id.as_deref(), Some("81923746"));
    }
}
