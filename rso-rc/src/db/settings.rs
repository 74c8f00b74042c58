//! Settings database operations
//!
//! Key-value accessors over the settings table. The database is the
//! authoritative configuration source; ENV and TOML are fallbacks resolved
//! in `crate::config`.

use rso_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Get OMDb API key from database
///
/// Returns Some(key) if configured, None if not set.
pub async fn get_omdb_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "omdb_api_key").await
}

/// Set OMDb API key in database
pub async fn set_omdb_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "omdb_api_key", key).await
}

/// Per-source display toggles for the overlay UI
///
/// Presentation only: toggles gate which badges the overlay paints, never
/// what gets fetched or cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DisplayToggles {
    pub show_imdb: bool,
    pub show_rotten_tomatoes: bool,
    pub show_metacritic: bool,
}

impl Default for DisplayToggles {
    fn default() -> Self {
        Self { show_imdb: true, show_rotten_tomatoes: true, show_metacritic: true }
    }
}

/// Get display toggles, defaulting each unset source to visible
pub async fn get_display_toggles(db: &Pool<Sqlite>) -> Result<DisplayToggles> {
    Ok(DisplayToggles {
        show_imdb: get_setting(db, "show_imdb").await?.unwrap_or(true),
        show_rotten_tomatoes: get_setting(db, "show_rotten_tomatoes").await?.unwrap_or(true),
        show_metacritic: get_setting(db, "show_metacritic").await?.unwrap_or(true),
    })
}

/// Persist display toggles
pub async fn set_display_toggles(db: &Pool<Sqlite>, toggles: DisplayToggles) -> Result<()> {
    set_setting(db, "show_imdb", toggles.show_imdb).await?;
    set_setting(db, "show_rotten_tomatoes", toggles.show_rotten_tomatoes).await?;
    set_setting(db, "show_metacritic", toggles.show_metacritic).await?;
    Ok(())
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting failed: {}", e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_get_omdb_api_key_not_set() {
        let pool = test_pool().await;
        assert_eq!(get_omdb_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get_omdb_api_key() {
        let pool = test_pool().await;

        set_omdb_api_key(&pool, "abcd1234".to_string()).await.unwrap();
        assert_eq!(get_omdb_api_key(&pool).await.unwrap(), Some("abcd1234".to_string()));

        // Update overwrites
        set_omdb_api_key(&pool, "efgh5678".to_string()).await.unwrap();
        assert_eq!(get_omdb_api_key(&pool).await.unwrap(), Some("efgh5678".to_string()));
    }

    #[tokio::test]
    async fn test_display_toggles_default_to_visible() {
        let pool = test_pool().await;
        assert_eq!(get_display_toggles(&pool).await.unwrap(), DisplayToggles::default());
    }

    #[tokio::test]
    async fn test_display_toggles_round_trip() {
        let pool = test_pool().await;

        let toggles = DisplayToggles {
            show_imdb: true,
            show_rotten_tomatoes: false,
            show_metacritic: false,
        };
        set_display_toggles(&pool, toggles).await.unwrap();
        assert_eq!(get_display_toggles(&pool).await.unwrap(), toggles);
    }
}
