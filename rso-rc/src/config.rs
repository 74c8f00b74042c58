//! Configuration resolution for rso-rc
//!
//! Provides multi-tier OMDb API key resolution with Database → ENV → TOML
//! priority. The database is authoritative; the environment variable and
//! the TOML file exist so a fresh install can start fetching before anyone
//! opens the settings page.

use rso_common::config::TomlConfig;
use rso_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable consulted as the second resolution tier
pub const API_KEY_ENV: &str = "RSO_OMDB_API_KEY";

/// Resolve the OMDb API key from 3-tier configuration.
///
/// **Priority:** Database → ENV → TOML. A missing key is not an error: the
/// service starts and answers from cache until one is configured.
pub async fn resolve_omdb_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_omdb_api_key(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.omdb_api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "OMDb API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("OMDb API key loaded from database");
        return Ok(Some(key));
    }
    if let Some(key) = env_key {
        info!("OMDb API key loaded from environment variable");
        return Ok(Some(key));
    }
    if let Some(key) = toml_key {
        info!("OMDb API key loaded from TOML config");
        return Ok(Some(key));
    }

    warn!("No OMDb API key configured; serving from cache only until one is set");
    Ok(None)
}

/// A usable key is non-empty after trimming
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Best-effort sync of settings into the TOML config file.
///
/// The database write has already succeeded when this runs; a TOML failure
/// is a warning for the caller to log, never a request failure.
pub async fn sync_settings_to_toml(
    settings: HashMap<String, String>,
    toml_path: &Path,
) -> Result<()> {
    if let Some(parent) = toml_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Cannot create config directory: {}", e)))?;
    }

    let mut document = match std::fs::read_to_string(toml_path) {
        Ok(contents) => toml::from_str::<toml::Table>(&contents)
            .map_err(|e| Error::Config(format!("Existing config is not valid TOML: {}", e)))?,
        Err(_) => toml::Table::new(),
    };

    for (key, value) in settings {
        document.insert(key, toml::Value::String(value));
    }

    let serialized = toml::to_string_pretty(&document)
        .map_err(|e| Error::Config(format!("Config serialization failed: {}", e)))?;
    std::fs::write(toml_path, serialized)
        .map_err(|e| Error::Config(format!("Config write failed: {}", e)))?;

    Ok(())
}
