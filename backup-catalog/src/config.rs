//! Configuration management for the catalog.
//!
//! Loads configuration from a TOML file; every field has a default so a
//! partial file (or none at all) is valid.

use crate::utils::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory under which per-destination manifest caches are kept
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Key prefix of manifest objects at the destination
    #[serde(default = "default_manifest_prefix")]
    pub manifest_prefix: String,

    /// Maximum manifests downloaded at once
    #[serde(default = "default_concurrency")]
    pub max_concurrent_fetches: usize,

    /// Maximum manifests decoded at once
    #[serde(default = "default_concurrency")]
    pub max_concurrent_decodes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_working_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".backup-catalog"),
        _ => PathBuf::from(".backup-catalog"),
    }
}

fn default_manifest_prefix() -> String {
    "manifests".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            manifest_prefix: default_manifest_prefix(),
            max_concurrent_fetches: default_concurrency(),
            max_concurrent_decodes: default_concurrency(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.max_concurrent_fetches == 0 {
            return Err(CatalogError::Config(
                "sync.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.sync.max_concurrent_decodes == 0 {
            return Err(CatalogError::Config(
                "sync.max_concurrent_decodes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.sync.manifest_prefix, "manifests");
        assert_eq!(config.sync.max_concurrent_fetches, 4);
        assert_eq!(config.log.level, "info");
        assert!(config.cache.working_dir.ends_with(".backup-catalog"));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [cache]
            working_dir = "/var/lib/backup-catalog"

            [sync]
            max_concurrent_fetches = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.working_dir, PathBuf::from("/var/lib/backup-catalog"));
        assert_eq!(config.sync.max_concurrent_fetches, 16);
        assert_eq!(config.sync.max_concurrent_decodes, 4);
        assert_eq!(config.sync.manifest_prefix, "manifests");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Config::from_toml("[sync]\nmax_concurrent_decodes = 0\n").unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(Config::from_toml("[sync\n").is_err());
    }
}
