//! Camera capture configuration.
//!
//! Auto-exposure and auto-white-balance are off by default: the detectors
//! compare brightness across frames, and automatic adjustments would show up
//! as false flashes.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Upper bound on the accepted frame rate.
pub const MAX_FPS: u32 = 120;

/// Configuration for camera capture.
///
/// This is an immutable snapshot handed to the device on every
/// (re)configure. The controller keeps the current instance and replaces it
/// wholesale when a patch is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index or identifier.
    pub device_id: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Fixed exposure time in microseconds.
    pub exposure_us: u32,
    /// Analogue sensor gain.
    pub analogue_gain: f32,
    /// Deliver single-channel frames instead of RGB.
    pub grayscale: bool,
    /// Automatic white balance.
    pub awb: bool,
    /// Automatic exposure.
    pub ae: bool,
    pub sharpness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub brightness: f32,
    /// Manual (red, blue) colour gains.
    pub colour_gains: Option<(f32, f32)>,
    /// Noise reduction strength, if the sensor supports it.
    pub denoise: Option<f32>,
    /// Capture without demosaicing (raw sensor stream).
    pub raw: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 10,
            exposure_us: 10_000, // 10ms
            analogue_gain: 2.0,
            grayscale: false,
            awb: false,
            ae: false,
            sharpness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            brightness: 0.0,
            colour_gains: None,
            denoise: None,
            raw: false,
        }
    }
}

impl CameraConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.exposure_us == 0 {
            return Err(ConfigError::InvalidExposure);
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.analogue_gain.is_nan() || self.analogue_gain <= 0.0 {
            return Err(ConfigError::InvalidGain);
        }
        Ok(())
    }

    /// Returns `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Samples per pixel the device is expected to deliver.
    pub fn channels(&self) -> u8 {
        if self.grayscale {
            1
        } else {
            3
        }
    }

    /// Frame period in microseconds for the configured rate.
    pub fn frame_duration_us(&self) -> u64 {
        1_000_000 / u64::from(self.fps.max(1))
    }

    /// Derives the control set sent to the sensor.
    ///
    /// The frame duration is pinned (min == max) and the exposure is capped
    /// to one frame period.
    pub fn controls(&self) -> CameraControls {
        let frame_duration = self.frame_duration_us();
        CameraControls {
            frame_duration_limits_us: (frame_duration, frame_duration),
            analogue_gain: self.analogue_gain,
            exposure_us: u64::from(self.exposure_us).min(frame_duration),
            awb_enable: self.awb,
            ae_enable: self.ae,
            sharpness: self.sharpness,
            contrast: self.contrast,
            saturation: self.saturation,
            brightness: self.brightness,
            colour_gains: self.colour_gains,
            noise_reduction_strength: self.denoise,
        }
    }

    /// Returns a copy with every field present in `patch` overlaid.
    pub fn merged(&self, patch: &CameraConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(v) = patch.device_id {
            next.device_id = v;
        }
        if let Some((w, h)) = patch.resolution {
            next.width = w;
            next.height = h;
        }
        if let Some(v) = patch.fps {
            next.fps = v;
        }
        if let Some(v) = patch.exposure_us {
            next.exposure_us = v;
        }
        if let Some(v) = patch.analogue_gain {
            next.analogue_gain = v;
        }
        if let Some(v) = patch.grayscale {
            next.grayscale = v;
        }
        if let Some(v) = patch.awb {
            next.awb = v;
        }
        if let Some(v) = patch.ae {
            next.ae = v;
        }
        if let Some(v) = patch.sharpness {
            next.sharpness = v;
        }
        if let Some(v) = patch.contrast {
            next.contrast = v;
        }
        if let Some(v) = patch.saturation {
            next.saturation = v;
        }
        if let Some(v) = patch.brightness {
            next.brightness = v;
        }
        if let Some(v) = patch.colour_gains {
            next.colour_gains = Some(v);
        }
        if let Some(v) = patch.denoise {
            next.denoise = Some(v);
        }
        if let Some(v) = patch.raw {
            next.raw = v;
        }
        next
    }

    /// Returns true if applying `patch` would change any value.
    pub fn differs_from_patch(&self, patch: &CameraConfigPatch) -> bool {
        self.merged(patch) != *self
    }
}

/// Partial camera settings, as received from the control surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfigPatch {
    pub device_id: Option<u32>,
    pub resolution: Option<(u32, u32)>,
    pub fps: Option<u32>,
    pub exposure_us: Option<u32>,
    pub analogue_gain: Option<f32>,
    pub grayscale: Option<bool>,
    pub awb: Option<bool>,
    pub ae: Option<bool>,
    pub sharpness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub brightness: Option<f32>,
    pub colour_gains: Option<(f32, f32)>,
    pub denoise: Option<f32>,
    pub raw: Option<bool>,
}

impl CameraConfigPatch {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Sensor controls derived from a [`CameraConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct CameraControls {
    /// (min, max) frame duration in microseconds.
    pub frame_duration_limits_us: (u64, u64),
    pub analogue_gain: f32,
    pub exposure_us: u64,
    pub awb_enable: bool,
    pub ae_enable: bool,
    pub sharpness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub colour_gains: Option<(f32, f32)>,
    pub noise_reduction_strength: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CameraConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CameraConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_frame_rate_bounds() {
        let mut config = CameraConfig::default();
        config.fps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrameRate)));
        config.fps = MAX_FPS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrameRate)));
    }

    #[test]
    fn test_controls_pin_frame_duration_and_cap_exposure() {
        let config = CameraConfig {
            fps: 100,
            exposure_us: 50_000,
            ..Default::default()
        };
        let controls = config.controls();
        assert_eq!(controls.frame_duration_limits_us, (10_000, 10_000));
        assert_eq!(controls.exposure_us, 10_000);
    }

    #[test]
    fn test_patch_with_equal_values_is_no_change() {
        let config = CameraConfig::default();
        let patch = CameraConfigPatch {
            fps: Some(config.fps),
            resolution: Some(config.resolution()),
            ..Default::default()
        };
        assert!(!config.differs_from_patch(&patch));
        assert!(!config.differs_from_patch(&CameraConfigPatch::default()));
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let config = CameraConfig::default();
        let patch = CameraConfigPatch {
            fps: Some(25),
            analogue_gain: Some(4.0),
            ..Default::default()
        };
        assert!(config.differs_from_patch(&patch));

        let merged = config.merged(&patch);
        assert_eq!(merged.fps, 25);
        assert_eq!(merged.analogue_gain, 4.0);
        assert_eq!(merged.width, config.width);
        assert_eq!(merged.exposure_us, config.exposure_us);
    }
}
