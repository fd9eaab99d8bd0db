//! Configuration file format.
//!
//! Each section maps to one component. Missing sections and fields fall back
//! to defaults, so an empty file is a valid configuration.

use crate::capture::CameraConfig;
use crate::detection::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid exposure time")]
    InvalidExposure,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid analogue gain (must be positive)")]
    InvalidGain,
    #[error("invalid buffer length {0} (must be between 0 and 600 seconds)")]
    InvalidBufferLength(f64),
    #[error("invalid blob bounds: min {min} must be below max {max}")]
    InvalidBlobBounds { min: usize, max: usize },
    #[error("invalid flash threshold {0}")]
    InvalidFlashThreshold(f64),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Longest accepted pre-roll buffer.
pub const MAX_BUFFER_SECONDS: f64 = 600.0;

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Pre-roll ring buffer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Seconds of history kept for pre-roll.
    pub length_secs: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { length_secs: 5.0 }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_buffer_length(self.length_secs)
    }
}

pub(crate) fn validate_buffer_length(seconds: f64) -> Result<(), ConfigError> {
    if !seconds.is_finite() || !(0.0..=MAX_BUFFER_SECONDS).contains(&seconds) {
        return Err(ConfigError::InvalidBufferLength(seconds));
    }
    Ok(())
}

/// Output locations and limits for recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for recording sessions.
    pub directory: PathBuf,
    /// Directory for buffer clips and snapshots.
    pub captures_directory: PathBuf,
    /// Recording sessions stop themselves after this many seconds (0 = unbounded).
    pub max_seconds: u64,
    /// Directory holding `flash.wav` and `laser.wav`.
    pub sounds_directory: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("recordings"),
            captures_directory: PathBuf::from("captures"),
            max_seconds: 300,
            sounds_directory: PathBuf::from("sounds"),
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Event history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events kept in memory for status queries.
    pub history: usize,
    /// Append-only log receiving one line per event. Disabled when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history: crate::control::DEFAULT_EVENT_LOG_LEN,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        self.detection.validate()?;
        self.buffer.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.camera, CameraConfig::default());
        assert_eq!(config.buffer.length_secs, 5.0);
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.events, EventsConfig::default());
    }

    #[test]
    fn test_events_section() {
        let config = AppConfig::from_toml(
            r#"
            [events]
            history = 25
            log_file = "media/events.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.events.history, 25);
        assert_eq!(config.events.log_file, Some(PathBuf::from("media/events.log")));
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [camera]
            fps = 30
            grayscale = true

            [detection]
            flash_threshold = 12.5
            autosave_laser = false

            [buffer]
            length_secs = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.fps, 30);
        assert!(config.camera.grayscale);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.detection.flash_threshold, 12.5);
        assert!(!config.detection.autosave_laser);
        assert!(config.detection.autosave_flash);
        assert_eq!(config.buffer.length_secs, 2.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[camera]\nfps = 0\n"),
            Err(ConfigError::InvalidFrameRate)
        ));
        assert!(matches!(
            AppConfig::from_toml("[buffer]\nlength_secs = -1.0\n"),
            Err(ConfigError::InvalidBufferLength(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[detection]\nmin_blob = 60\nmax_blob = 50\n"),
            Err(ConfigError::InvalidBlobBounds { .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            AppConfig::from_toml("[camera\n"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
