//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for equipstat
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `datasets/` and `records.json`
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of most recent datasets kept
    pub keep: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: equipstat_core::DEFAULT_KEEP,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: equipstat_core::DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./equipstat.toml (current directory)
    /// 2. ~/.config/equipstat/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("equipstat.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "equipstat") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention.keep == 0 {
            anyhow::bail!("retention.keep must be at least 1");
        }
        if self.history.limit == 0 {
            anyhow::bail!("history.limit must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.retention.keep, 5);
        assert_eq!(config.history.limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[storage]
data_dir = "/tmp/equipstat"

[retention]
keep = 3
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/equipstat"));
        assert_eq!(config.retention.keep, 3);
        assert_eq!(config.history.limit, 5);
    }

    #[test]
    fn zero_keep_rejected() {
        let config: Config = toml::from_str("[retention]\nkeep = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention.keep"));
    }

    #[test]
    fn from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equipstat.toml");
        std::fs::write(&path, "[history]\nlimit = 0\n").unwrap();
        assert!(Config::from_file(&path).is_err());

        std::fs::write(&path, "[history]\nlimit = 2\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().history.limit, 2);
    }

    #[test]
    fn from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
