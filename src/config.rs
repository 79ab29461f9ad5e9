//! Session configuration
//!
//! A JSON file naming the source and the initial parameters. Missing
//! fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AuditionError, Result};
use crate::params::SessionParams;

/// Default source, relative to the working directory
pub const DEFAULT_SOURCE: &str = "demo.mp3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub source: String,
    pub params: SessionParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            params: SessionParams::default(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate().map_err(|err| AuditionError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(AuditionError::out_of_range(
                "source",
                "\"\"",
                "a path or URL",
            ));
        }
        self.params.validate()
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"source": "song.wav", "params": {"reverb_decay_secs": 3.0}}"#,
        )
        .unwrap();

        let config = SessionConfig::from_file(&path).unwrap();

        assert_eq!(config.source, "song.wav");
        assert_eq!(
            config.params,
            SessionParams {
                reverb_decay_secs: 3.0,
                ..SessionParams::default()
            }
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut config = SessionConfig::default();
        config.params.pitch_semitones = -4;

        config.save(&path).unwrap();

        assert_eq!(SessionConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"params": {"playback_rate": 4.0}}"#).unwrap();

        let err = SessionConfig::from_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = SessionConfig::from_file(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SessionConfig::from_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }
}
