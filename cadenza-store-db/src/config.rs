// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Tunables for the storage engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoContext, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Vacuum is skipped while live block bytes exceed this share of all
    /// stored block bytes.
    pub vacuum_threshold_percent: u8,

    /// Delay before retrying a passive checkpoint that left frames behind
    pub checkpoint_retry_ms: u64,

    /// Poll interval of the close-time checkpoint drain
    pub close_poll_ms: u64,

    /// Directory holding temporary (never saved) projects
    pub temp_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vacuum_threshold_percent: 80,
            checkpoint_retry_ms: 100,
            close_poll_ms: 50,
            temp_dir: std::env::temp_dir().join("cadenza"),
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .io_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vacuum_threshold_percent > 100 {
            return Err(Error::Config {
                reason: format!(
                    "vacuum_threshold_percent must be at most 100, got {}",
                    self.vacuum_threshold_percent
                ),
            });
        }
        if self.checkpoint_retry_ms == 0 {
            return Err(Error::Config {
                reason: "checkpoint_retry_ms must be greater than 0".to_string(),
            });
        }
        if self.close_poll_ms == 0 {
            return Err(Error::Config {
                reason: "close_poll_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn checkpoint_retry(&self) -> Duration {
        Duration::from_millis(self.checkpoint_retry_ms)
    }

    pub(crate) fn close_poll(&self) -> Duration {
        Duration::from_millis(self.close_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = StoreConfig::from_toml_str("vacuum_threshold_percent = 60\n").unwrap();
        assert_eq!(config.vacuum_threshold_percent, 60);
        assert_eq!(config.checkpoint_retry_ms, 100);
        assert_eq!(config.temp_dir, StoreConfig::default().temp_dir);
    }

    #[rstest]
    #[case::threshold_too_high("vacuum_threshold_percent = 101")]
    #[case::zero_poll("close_poll_ms = 0")]
    #[case::zero_retry("checkpoint_retry_ms = 0")]
    fn test_invalid_values(#[case] toml: &str) {
        assert!(matches!(
            StoreConfig::from_toml_str(toml),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            StoreConfig::from_toml_str("vacuum = true"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cadenza.toml");
        std::fs::write(&path, "temp_dir = \"/var/tmp/cadenza\"\n").unwrap();
        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/cadenza"));

        let missing = StoreConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Io { .. })));
    }
}
