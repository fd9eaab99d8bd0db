//! Per-frame anomaly detectors.
//!
//! Both detectors run inline on the capture thread, so their cost comes
//! straight out of the frame budget. They keep history between calls but
//! hold no locks and do no I/O.

mod blob;
mod bright_spot;
mod flash;
mod luminance;

pub use blob::{find_blobs, Blob};
pub use bright_spot::{BrightSpotDetector, DEFAULT_ALPHA};
pub use flash::{FlashDetector, DEFAULT_WINDOW};
pub use luminance::{luminance, mean_luminance, rgb_to_luminance};

use crate::capture::Frame;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Which detector fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Flash,
    Laser,
}

impl TriggerKind {
    /// Short lowercase name, also used for alert sound files.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Flash => "flash",
            TriggerKind::Laser => "laser",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stateful per-frame classifier.
pub trait Detector: Send {
    /// The trigger this detector reports.
    fn kind(&self) -> TriggerKind;

    /// Feeds one frame and returns true if it is anomalous.
    fn check(&mut self, frame: &Frame) -> bool;

    /// Discards accumulated history.
    fn reset(&mut self);
}

/// Detector thresholds and per-trigger side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Mean-luminance jump that counts as a flash.
    pub flash_threshold: f64,
    /// Per-pixel rise over background that counts as bright.
    pub laser_threshold: u8,
    /// Bright regions must be larger than this many pixels.
    pub min_blob: usize,
    /// Bright regions must be smaller than this many pixels.
    pub max_blob: usize,
    pub autosave_flash: bool,
    pub autosave_laser: bool,
    pub sound_flash: bool,
    pub sound_laser: bool,
    /// Start a pre-rolled recording when any detector fires.
    pub record_on_trigger: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            flash_threshold: 5.0,
            laser_threshold: 20,
            min_blob: 5,
            max_blob: 50,
            autosave_flash: true,
            autosave_laser: true,
            sound_flash: true,
            sound_laser: true,
            record_on_trigger: false,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.flash_threshold.is_finite() || self.flash_threshold < 0.0 {
            return Err(ConfigError::InvalidFlashThreshold(self.flash_threshold));
        }
        if self.min_blob >= self.max_blob {
            return Err(ConfigError::InvalidBlobBounds {
                min: self.min_blob,
                max: self.max_blob,
            });
        }
        Ok(())
    }

    /// Whether a trigger of `kind` should flush the ring buffer to disk.
    pub fn autosave(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Flash => self.autosave_flash,
            TriggerKind::Laser => self.autosave_laser,
        }
    }

    /// Whether a trigger of `kind` should play an alert.
    pub fn sound(&self, kind: TriggerKind) -> bool {
        match kind {
            TriggerKind::Flash => self.sound_flash,
            TriggerKind::Laser => self.sound_laser,
        }
    }

    /// Returns a copy with every field present in `patch` overlaid.
    pub fn merged(&self, patch: &DetectionConfigPatch) -> Self {
        Self {
            flash_threshold: patch.flash_threshold.unwrap_or(self.flash_threshold),
            laser_threshold: patch.laser_threshold.unwrap_or(self.laser_threshold),
            min_blob: patch.min_blob.unwrap_or(self.min_blob),
            max_blob: patch.max_blob.unwrap_or(self.max_blob),
            autosave_flash: patch.autosave_flash.unwrap_or(self.autosave_flash),
            autosave_laser: patch.autosave_laser.unwrap_or(self.autosave_laser),
            sound_flash: patch.sound_flash.unwrap_or(self.sound_flash),
            sound_laser: patch.sound_laser.unwrap_or(self.sound_laser),
            record_on_trigger: patch.record_on_trigger.unwrap_or(self.record_on_trigger),
        }
    }
}

/// Partial detection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfigPatch {
    pub flash_threshold: Option<f64>,
    pub laser_threshold: Option<u8>,
    pub min_blob: Option<usize>,
    pub max_blob: Option<usize>,
    pub autosave_flash: Option<bool>,
    pub autosave_laser: Option<bool>,
    pub sound_flash: Option<bool>,
    pub sound_laser: Option<bool>,
    pub record_on_trigger: Option<bool>,
}

/// The pair of detectors run on every frame.
#[derive(Debug, Clone)]
pub struct Detectors {
    pub flash: FlashDetector,
    pub bright_spot: BrightSpotDetector,
}

impl Detectors {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            flash: FlashDetector::new(config.flash_threshold),
            bright_spot: BrightSpotDetector::new(
                config.laser_threshold,
                config.min_blob,
                config.max_blob,
            ),
        }
    }

    /// Applies new thresholds without discarding detector history.
    pub fn apply(&mut self, config: &DetectionConfig) {
        self.flash.set_threshold(config.flash_threshold);
        self.bright_spot
            .set_limits(config.laser_threshold, config.min_blob, config.max_blob);
    }

    /// Runs every detector on `frame` in order and returns those that fired.
    pub fn evaluate(&mut self, frame: &Frame) -> Vec<TriggerKind> {
        let detectors: [&mut dyn Detector; 2] = [&mut self.flash, &mut self.bright_spot];
        detectors
            .into_iter()
            .filter_map(|d| d.check(frame).then(|| d.kind()))
            .collect()
    }

    pub fn reset(&mut self) {
        self.flash.reset();
        self.bright_spot.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_patch_merges_present_fields() {
        let config = DetectionConfig::default();
        let merged = config.merged(&DetectionConfigPatch {
            flash_threshold: Some(9.0),
            sound_laser: Some(false),
            ..Default::default()
        });
        assert_eq!(merged.flash_threshold, 9.0);
        assert!(!merged.sound_laser);
        assert_eq!(merged.max_blob, config.max_blob);
    }

    #[test]
    fn test_side_effect_flags_by_kind() {
        let config = DetectionConfig {
            autosave_flash: false,
            sound_laser: false,
            ..Default::default()
        };
        assert!(!config.autosave(TriggerKind::Flash));
        assert!(config.autosave(TriggerKind::Laser));
        assert!(config.sound(TriggerKind::Flash));
        assert!(!config.sound(TriggerKind::Laser));
    }

    #[test]
    fn test_evaluate_reports_flash() {
        let config = DetectionConfig::default();
        let mut detectors = Detectors::new(&config);
        let dark = Frame::new(vec![10; 64], 8, 8, 0);
        for _ in 0..DEFAULT_WINDOW {
            assert!(detectors.evaluate(&dark).is_empty());
        }
        let bright = Frame::new(vec![200; 64], 8, 8, 0);
        assert_eq!(detectors.evaluate(&bright), vec![TriggerKind::Flash]);
    }

    #[test]
    fn test_apply_keeps_history() {
        let mut detectors = Detectors::new(&DetectionConfig::default());
        let dark = Frame::new(vec![10; 64], 8, 8, 0);
        for _ in 0..DEFAULT_WINDOW {
            detectors.evaluate(&dark);
        }
        detectors.apply(&DetectionConfig {
            flash_threshold: 1.0,
            ..Default::default()
        });
        assert!(detectors.flash.is_primed());
        assert!(detectors.bright_spot.is_seeded());
        assert_eq!(detectors.flash.threshold(), 1.0);
    }
}
