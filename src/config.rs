// ⚙️ Merge configuration
//
// Timing knobs for the fetch-completion wait plus where the local store and
// the rendered-photo cache live. Every field has a default, so an empty JSON
// object is a valid config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `database_path`
pub const DATABASE_ENV: &str = "HOUSEHOLD_MERGE_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// How often to poll the sync layer's "fetch in progress" flag
    pub fetch_poll_interval_ms: u64,

    /// How long to wait for a fetch before proceeding anyway
    pub fetch_timeout_ms: u64,

    pub database_path: PathBuf,

    /// Directory of rendered photos cleared by Start Fresh (None = no cache)
    pub photo_cache_dir: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            fetch_poll_interval_ms: 150,
            fetch_timeout_ms: 20_000,
            database_path: PathBuf::from("household.db"),
            photo_cache_dir: None,
        }
    }
}

impl MergeConfig {
    /// Load from a JSON file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: MergeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(db) = std::env::var_os(DATABASE_ENV) {
            self.database_path = PathBuf::from(db);
        }
        self
    }

    pub fn fetch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.fetch_poll_interval(), Duration::from_millis(150));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(20));
        assert!(config.photo_cache_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fetch_timeout_ms": 500, "photo_cache_dir": "/tmp/photos" }}"#).unwrap();

        let config: MergeConfig =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();

        assert_eq!(config.fetch_timeout(), Duration::from_millis(500));
        assert_eq!(config.fetch_poll_interval_ms, 150);
        assert_eq!(config.photo_cache_dir, Some(PathBuf::from("/tmp/photos")));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = MergeConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
