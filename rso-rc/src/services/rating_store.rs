//! Persistent store adapter for rating entries
//!
//! Durable layer: the `rating_cache` SQLite table, key → [`StoredValue`]
//! JSON. Every durable key carries the `rating:` namespace prefix so bulk
//! enumeration and eviction (`LIKE 'rating:%'`) never touch other keys in
//! the database. In front of SQLite sits a process-local map of promoted
//! entries for repeat lookups.
//!
//! Deduplication: the full entry lives under one **master key** (the
//! platform-ID key when the ID is known, else the title key). Secondary
//! keys hold pointers to the master. When no stable ID exists there is
//! nothing durable to point at, so secondary keys hold duplicate copies
//! instead (legacy mode).
//!
//! Storage I/O failures are logged and degrade to a cache miss (reads) or a
//! no-op (writes); they never propagate to callers.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{Completeness, FetchStatus, RatingEntry, StoredValue};
use crate::services::cache_key;

/// Namespace prefix for every durable key this store owns
const KEY_NAMESPACE: &str = "rating:";

/// TTL for a complete successful entry
const TTL_SUCCESS_FULL_DAYS: i64 = 7;
/// TTL for a partial successful entry
const TTL_SUCCESS_PARTIAL_DAYS: i64 = 1;
/// TTL for a not-found entry
const TTL_NOT_FOUND_DAYS: i64 = 1;
/// TTL for an error entry
const TTL_ERROR_HOURS: i64 = 1;

/// TTL selected by response outcome
pub fn ttl_for(entry: &RatingEntry) -> Duration {
    match (entry.status, entry.completeness) {
        (FetchStatus::Success, Completeness::Full) => Duration::days(TTL_SUCCESS_FULL_DAYS),
        (FetchStatus::Success, Completeness::Partial) => Duration::days(TTL_SUCCESS_PARTIAL_DAYS),
        (FetchStatus::NotFound, _) => Duration::days(TTL_NOT_FOUND_DAYS),
        (FetchStatus::Error, _) => Duration::hours(TTL_ERROR_HOURS),
    }
}

/// An entry is valid while its age stays under the outcome's TTL.
/// Pointers have no expiry of their own; only the target entry's counts.
pub fn is_valid(entry: &RatingEntry) -> bool {
    Utc::now().signed_duration_since(entry.fetched_at) < ttl_for(entry)
}

fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_NAMESPACE, key)
}

/// Durable key→entry map with pointer-based deduplication
pub struct RatingStore {
    db: SqlitePool,
    memory: RwLock<HashMap<String, RatingEntry>>,
}

impl RatingStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db, memory: RwLock::new(HashMap::new()) }
    }

    /// Look up an entry by identity, most specific candidate key first.
    ///
    /// Checks the memory map, then durable storage, per candidate. A
    /// pointer is followed exactly one hop; a pointer whose target is
    /// missing or expired counts as a miss for that candidate. Durable
    /// hits are promoted into the memory map.
    pub async fn get(
        &self,
        video_id: Option<&str>,
        title: &str,
        year: Option<&str>,
    ) -> Option<RatingEntry> {
        for key in cache_key::candidate_keys(video_id, title, year) {
            if let Some(entry) = self.memory_get(&key).await {
                return Some(entry);
            }

            if let Some(entry) = self.load(&key).await {
                self.memory.write().await.insert(key, entry.clone());
                return Some(entry);
            }
        }
        None
    }

    /// Write an entry under its master key and alias every other derivable
    /// key to it (pointers when a platform ID anchors the entry, duplicate
    /// copies otherwise).
    pub async fn set(&self, entry: &RatingEntry) {
        let master = entry.master_key();

        if entry.normalized_title.is_empty() && entry.video_id.is_none() {
            tracing::warn!(title = %entry.title, "Refusing to cache unkeyable title");
            return;
        }

        self.write(&master, &StoredValue::Entry(entry.clone())).await;

        let aliases = cache_key::alias_keys(
            &master,
            entry.video_id.as_deref(),
            entry.imdb_id.as_deref(),
            &entry.title,
            entry.year.as_deref(),
        );

        for alias in aliases {
            let value = if entry.video_id.is_some() {
                StoredValue::Pointer { master_key: master.clone() }
            } else {
                // Legacy mode: no stable anchor to point at, duplicate instead
                StoredValue::Entry(entry.clone())
            };
            self.write(&alias, &value).await;
        }

        self.memory.write().await.insert(master, entry.clone());
    }

    /// Drop every durable key in the rating namespace and the memory map.
    /// Returns the number of durable keys removed.
    pub async fn clear(&self) -> u64 {
        self.memory.write().await.clear();

        let pattern = format!("{}%", KEY_NAMESPACE);
        match sqlx::query("DELETE FROM rating_cache WHERE key LIKE ?")
            .bind(&pattern)
            .execute(&self.db)
            .await
        {
            Ok(result) => result.rows_affected(),
            Err(e) => {
                tracing::warn!("Cache clear failed: {}", e);
                0
            }
        }
    }

    /// (memory entries, durable keys) for diagnostics
    pub async fn stats(&self) -> (u64, u64) {
        let memory_size = self.memory.read().await.len() as u64;

        let pattern = format!("{}%", KEY_NAMESPACE);
        let storage_size: u64 =
            match sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM rating_cache WHERE key LIKE ?")
                .bind(&pattern)
                .fetch_one(&self.db)
                .await
            {
                Ok((count,)) => count.max(0) as u64,
                Err(e) => {
                    tracing::warn!("Cache stats query failed: {}", e);
                    0
                }
            };

        (memory_size, storage_size)
    }

    /// Valid memory-map hit; expired entries are evicted on the way
    async fn memory_get(&self, key: &str) -> Option<RatingEntry> {
        {
            let memory = self.memory.read().await;
            match memory.get(key) {
                Some(entry) if is_valid(entry) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.memory.write().await.remove(key);
        None
    }

    /// Durable read with one-hop pointer resolution
    async fn load(&self, key: &str) -> Option<RatingEntry> {
        match self.read_value(key).await? {
            StoredValue::Entry(entry) => is_valid(&entry).then_some(entry),
            StoredValue::Pointer { master_key } => match self.read_value(&master_key).await? {
                StoredValue::Entry(entry) => is_valid(&entry).then_some(entry),
                // Pointer chains are never written; a pointer target that is
                // itself a pointer is treated as a miss, not followed.
                StoredValue::Pointer { .. } => {
                    tracing::warn!(key = %key, "Pointer chain in rating cache, treating as miss");
                    None
                }
            },
        }
    }

    async fn read_value(&self, key: &str) -> Option<StoredValue> {
        let row: Option<(String,)> =
            match sqlx::query_as("SELECT value FROM rating_cache WHERE key = ?")
                .bind(namespaced(key))
                .fetch_optional(&self.db)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(key = %key, "Cache read failed: {}", e);
                    return None;
                }
            };

        let (value,) = row?;
        match serde_json::from_str(&value) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(key = %key, "Corrupt cache value, treating as miss: {}", e);
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &StoredValue) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, "Cache value serialization failed: {}", e);
                return;
            }
        };

        if let Err(e) = sqlx::query(
            "INSERT INTO rating_cache (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(namespaced(key))
        .bind(json)
        .execute(&self.db)
        .await
        {
            tracing::warn!(key = %key, "Cache write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{Ratings, SourceRating};

    fn success_entry(video_id: Option<&str>, title: &str, year: Option<&str>) -> RatingEntry {
        RatingEntry::success(
            video_id.map(str::to_string),
            Some("tt1375666".to_string()),
            title,
            year.map(str::to_string),
            Ratings { imdb: Some(SourceRating::new("8.8")), ..Default::default() },
        )
    }

    #[tokio::test]
    async fn write_then_read_via_pointer_path() {
        let store = RatingStore::new(test_pool().await);
        let entry = success_entry(Some("81923746"), "Inception", Some("2010"));
        store.set(&entry).await;

        // Master key lookup
        let by_id = store.get(Some("81923746"), "Inception", Some("2010")).await.unwrap();
        assert_eq!(by_id.ratings.imdb.as_ref().unwrap().score, "8.8");

        // Alias lookups resolve through pointers
        let by_title_year = store.get(None, "Inception", Some("2010")).await.unwrap();
        assert_eq!(by_title_year.video_id.as_deref(), Some("81923746"));

        let by_title = store.get(None, "Inception", None).await.unwrap();
        assert_eq!(by_title.video_id.as_deref(), Some("81923746"));
    }

    #[tokio::test]
    async fn write_then_read_via_duplication_path() {
        let store = RatingStore::new(test_pool().await);
        let entry = success_entry(None, "Inception", Some("2010"));
        store.set(&entry).await;

        let by_title_year = store.get(None, "Inception", Some("2010")).await.unwrap();
        assert_eq!(by_title_year.ratings.imdb.as_ref().unwrap().score, "8.8");

        // Legacy mode stores a duplicate entry, not a pointer
        let row: (String,) =
            sqlx::query_as("SELECT value FROM rating_cache WHERE key = 'rating:title:inception'")
                .fetch_one(&store.db)
                .await
                .unwrap();
        assert!(row.0.contains("\"kind\":\"entry\""));
    }

    #[tokio::test]
    async fn dangling_pointer_is_a_miss_not_an_error() {
        let store = RatingStore::new(test_pool().await);

        let pointer = StoredValue::Pointer { master_key: "id:gone".to_string() };
        store.write("title:orphan", &pointer).await;

        assert!(store.get(None, "Orphan", None).await.is_none());
    }

    #[tokio::test]
    async fn pointer_to_expired_master_is_a_miss() {
        let store = RatingStore::new(test_pool().await);

        let mut entry = success_entry(Some("42"), "Old News", None);
        entry.fetched_at = Utc::now() - Duration::days(2);
        store.set(&entry).await;
        // Promotion cache would mask the expiry check
        store.memory.write().await.clear();

        assert!(store.get(None, "Old News", None).await.is_none());
    }

    #[tokio::test]
    async fn error_entries_expire_after_an_hour() {
        let store = RatingStore::new(test_pool().await);

        let mut entry = RatingEntry::negative(FetchStatus::Error, None, "Flaky", None);
        entry.fetched_at = Utc::now() - Duration::minutes(59);
        store.set(&entry).await;
        assert!(store.get(None, "Flaky", None).await.is_some());

        let mut expired = RatingEntry::negative(FetchStatus::Error, None, "Flaky", None);
        expired.fetched_at = Utc::now() - Duration::minutes(61);
        store.set(&expired).await;
        store.memory.write().await.clear();
        assert!(store.get(None, "Flaky", None).await.is_none());
    }

    #[tokio::test]
    async fn full_success_entries_live_seven_days() {
        let store = RatingStore::new(test_pool().await);

        let mut entry = success_entry(Some("7"), "Heat", Some("1995"));
        entry.fetched_at = Utc::now() - Duration::days(6);
        store.set(&entry).await;
        assert!(store.get(Some("7"), "Heat", Some("1995")).await.is_some());

        entry.fetched_at = Utc::now() - Duration::days(8);
        store.set(&entry).await;
        store.memory.write().await.clear();
        assert!(store.get(Some("7"), "Heat", Some("1995")).await.is_none());
    }

    #[tokio::test]
    async fn not_found_entries_served_within_a_day() {
        let store = RatingStore::new(test_pool().await);

        let entry = RatingEntry::negative(FetchStatus::NotFound, None, "Zzzznonexistent1234", None);
        store.set(&entry).await;

        let cached = store.get(None, "Zzzznonexistent1234", None).await.unwrap();
        assert_eq!(cached.status, FetchStatus::NotFound);
    }

    #[tokio::test]
    async fn clear_reports_removed_key_count() {
        let store = RatingStore::new(test_pool().await);

        // id master + imdb/title_year/title pointers = 4 durable keys
        store.set(&success_entry(Some("81923746"), "Inception", Some("2010"))).await;
        let (_, storage) = store.stats().await;
        assert_eq!(storage, 4);

        assert_eq!(store.clear().await, 4);
        let (memory, storage) = store.stats().await;
        assert_eq!((memory, storage), (0, 0));
        assert!(store.get(Some("81923746"), "Inception", Some("2010")).await.is_none());
    }

    #[tokio::test]
    async fn durable_hits_are_promoted_to_memory() {
        let store = RatingStore::new(test_pool().await);
        store.set(&success_entry(Some("81923746"), "Inception", Some("2010"))).await;
        store.memory.write().await.clear();

        store.get(None, "Inception", None).await.unwrap();
        let (memory, _) = store.stats().await;
        assert_eq!(memory, 1);
    }
}
