//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional TOML configuration file contents
///
/// Lives at `~/.config/rso/config.toml` (platform equivalent elsewhere).
/// Every field is optional; the database and environment take priority over
/// anything found here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder override
    pub root_folder: Option<String>,
    /// OMDb API key (lowest-priority source)
    pub omdb_api_key: Option<String>,
    /// Listen port override
    pub port: Option<u16>,
}

impl TomlConfig {
    /// Load the config file if one exists; a missing file is not an error.
    pub fn load() -> Self {
        let Some(path) = config_file_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load a specific config file, falling back to defaults on any failure.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<TomlConfig>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring malformed config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Platform config file path (`<config dir>/rso/config.toml`)
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rso").join("config.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable (`RSO_ROOT`)
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("RSO_ROOT") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rso"))
        .unwrap_or_else(|| PathBuf::from("./rso_data"))
}

/// Ensure the root folder exists and return the database path inside it
pub fn ensure_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)
        .map_err(|e| Error::Config(format!("Cannot create root folder {}: {}", root.display(), e)))?;
    Ok(root.join("rso.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = TomlConfig::load_from(Path::new("/nonexistent/rso/config.toml"));
        assert!(config.root_folder.is_none());
        assert!(config.omdb_api_key.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn cli_argument_beats_toml() {
        let toml_config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some("/from/cli"), &toml_config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn toml_root_folder_used_when_no_cli() {
        // RSO_ROOT is deliberately not set in the test environment
        std::env::remove_var("RSO_ROOT");
        let toml_config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let resolved = resolve_root_folder(None, &toml_config);
        assert_eq!(resolved, PathBuf::from("/from/toml"));
    }

    #[test]
    fn ensure_root_folder_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("rso");
        let db_path = ensure_root_folder(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(db_path, root.join("rso.db"));
    }

    #[test]
    fn malformed_toml_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is { not toml").unwrap();
        let config = TomlConfig::load_from(&path);
        assert!(config.omdb_api_key.is_none());
    }
}
