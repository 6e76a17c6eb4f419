//! Sync settings
//!
//! Persisted as JSON next to the saves. Missing or unreadable files fall
//! back to defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_BATCH, SIGN_THRESHOLD};
use crate::error::{ConfigError, PersistError};

/// Log verbosity hint for the binary (`RUST_LOG` still wins)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Buffered actions that raise the must-synchronize signal
    pub sign_threshold: usize,
    /// Cap on actions per batched call
    pub max_batch: usize,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sign_threshold: SIGN_THRESHOLD,
            max_batch: MAX_BATCH,
            log_level: LogLevel::Info,
        }
    }
}

impl Settings {
    /// Thresholds the reconciler can honor: the signal must fire before
    /// the buffer hits the batch cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sign_threshold == 0 {
            return Err(ConfigError::InvalidSettings(
                "sign_threshold must be at least 1".into(),
            ));
        }
        if self.sign_threshold > self.max_batch {
            return Err(ConfigError::InvalidSettings(format!(
                "sign_threshold {} exceeds max_batch {}",
                self.sign_threshold, self.max_batch
            )));
        }
        Ok(())
    }

    /// Load from `path`, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let loaded = fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str::<Settings>(&json).ok());

        match loaded {
            Some(settings) => match settings.validate() {
                Ok(()) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(err) => {
                    log::warn!("Ignoring settings in {}: {}", path.display(), err);
                    Self::default()
                }
            },
            None => {
                log::info!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::info!("Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backend_limits() {
        let settings = Settings::default();
        assert_eq!(settings.sign_threshold, 95);
        assert_eq!(settings.max_batch, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_unreachable_threshold() {
        let zero = Settings {
            sign_threshold: 0,
            ..Settings::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::InvalidSettings(_))
        ));

        let over = Settings {
            sign_threshold: 101,
            ..Settings::default()
        };
        assert_eq!(
            over.validate(),
            Err(ConfigError::InvalidSettings(
                "sign_threshold 101 exceeds max_batch 100".into()
            ))
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"sign_threshold": 10}"#).unwrap();
        assert_eq!(settings.sign_threshold, 10);
        assert_eq!(settings.max_batch, 100);
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn test_save_and_load_through_disk() {
        let path = std::env::temp_dir().join(format!("batchplay-settings-{}.json", std::process::id()));
        let settings = Settings {
            sign_threshold: 20,
            max_batch: 40,
            log_level: LogLevel::Debug,
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
        let _ = fs::remove_file(&path);

        assert_eq!(Settings::load(&path), Settings::default());
    }
}
