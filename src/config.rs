use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{ClipError, Result};

/// What `add` does with content that is empty after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyContentPolicy {
    /// Fail with a validation error
    #[default]
    Reject,
    /// Quietly add nothing
    Skip,
    /// Store the item anyway
    Allow,
}

impl std::str::FromStr for EmptyContentPolicy {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "skip" => Ok(Self::Skip),
            "allow" => Ok(Self::Allow),
            other => Err(ClipError::ConfigError {
                message: format!(
                    "Unknown empty content policy '{}', expected reject, skip or allow",
                    other
                ),
            }),
        }
    }
}

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the persisted key-value files
    pub data_dir: PathBuf,

    /// File rewritten with a full snapshot after every change
    pub backup_file: PathBuf,

    /// Directory where uploaded documents are kept
    pub attachments_dir: PathBuf,

    /// Whether to keep the backup file in sync automatically
    pub auto_backup: bool,

    /// Handling of clips whose content is blank
    pub empty_content_policy: EmptyContentPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let base = ProjectDirs::from("", "", "tagclip")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".tagclip"));

        Self::rooted_at(&base)
    }
}

impl Config {
    /// Configuration with every path placed under `base`.
    pub fn rooted_at(base: &Path) -> Self {
        Config {
            data_dir: base.join("store"),
            backup_file: base.join("backup").join("tagclip_backup.json"),
            attachments_dir: base.join("tagged_clipboard_documents"),
            auto_backup: true,
            empty_content_policy: EmptyContentPolicy::default(),
        }
    }

    /// Location of the configuration file when none is given explicitly.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "tagclip")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("tagclip.json"))
    }

    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw).map_err(|e| ClipError::ConfigError {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ClipError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Applies a single `key=value` assignment.
    pub fn set(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| ClipError::ConfigError {
                message: format!("Expected key=value, got '{}'", assignment),
            })?;
        let value = value.trim();

        match key.trim() {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "backup_file" => self.backup_file = PathBuf::from(value),
            "attachments_dir" => self.attachments_dir = PathBuf::from(value),
            "auto_backup" => {
                self.auto_backup = value.parse().map_err(|_| ClipError::ConfigError {
                    message: format!("auto_backup must be true or false, got '{}'", value),
                })?
            }
            "empty_content_policy" => self.empty_content_policy = value.parse()?,
            other => {
                warn!("Rejected unknown config key '{}'", other);
                return Err(ClipError::ConfigError {
                    message: format!("Unknown config key '{}'", other),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.empty_content_policy, EmptyContentPolicy::Reject);
    }

    #[test]
    fn set_then_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf").join("config.json");
        let mut config = Config::rooted_at(tmp.path());

        config.set("empty_content_policy=skip").unwrap();
        config.set("auto_backup = false").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.empty_content_policy, EmptyContentPolicy::Skip);
        assert!(!loaded.auto_backup);
        assert_eq!(loaded.data_dir, tmp.path().join("store"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"empty_content_policy": "allow"}"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.empty_content_policy, EmptyContentPolicy::Allow);
        assert!(loaded.auto_backup);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut config = Config::default();
        assert!(config.set("colour=blue").is_err());
        assert!(config.set("auto_backup=maybe").is_err());
        assert!(config.set("no equals sign").is_err());
    }
}
