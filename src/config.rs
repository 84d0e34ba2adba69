//! # Engine Configuration
//!
//! Tunables for parsing and playback, read from YAML.
//!
//! ## Keys
//! All keys are optional; missing keys take their defaults.
//!
//! ```yaml
//! epsilon-ms: 30          # chord coincidence window
//! playback-rate: 1.0      # transport speed multiplier
//! allowed-extensions: [mid, midi]
//! preferences-path: tonnetz-prefs.yaml
//! ```
//!
//! ## Example
//! ```rust
//! use tonnetz::EngineConfig;
//!
//! let config = EngineConfig::from_yaml_str("epsilon-ms: 45\n").unwrap();
//! assert_eq!(config.epsilon_ms, 45.0);
//! assert_eq!(config.playback_rate, 1.0);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::timeline::DEFAULT_EPSILON_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Notes starting within this many milliseconds of a chord's first note join the chord
    pub epsilon_ms: f64,
    /// Seconds of timeline advanced per second of wall clock
    pub playback_rate: f64,
    /// File extensions accepted for upload, lowercase and without the dot
    pub allowed_extensions: Vec<String>,
    /// Where the CLI keeps persisted preferences
    pub preferences_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon_ms: DEFAULT_EPSILON_MS,
            playback_rate: 1.0,
            allowed_extensions: vec!["mid".to_string(), "midi".to_string()],
            preferences_path: PathBuf::from("tonnetz-prefs.yaml"),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.epsilon_ms.is_finite() || self.epsilon_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "epsilon-ms must be a non-negative number, got {}",
                self.epsilon_ms
            )));
        }
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "playback-rate must be positive, got {}",
                self.playback_rate
            )));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "allowed-extensions must list at least one extension".to_string(),
            ));
        }
        Ok(())
    }

    pub fn epsilon_seconds(&self) -> f64 {
        self.epsilon_ms / 1000.0
    }
}
