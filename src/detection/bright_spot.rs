//! Small bright-spot (laser dot) detection against a running background.

use super::{blob::find_blobs, blob::Blob, luminance::luminance, Detector, TriggerKind};
use crate::capture::Frame;

/// Default weight given to the existing background on each update.
pub const DEFAULT_ALPHA: f32 = 0.95;

#[derive(Debug, Clone)]
struct Background {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

/// Fires when a small region rises well above the background model.
///
/// The background is an exponential moving average of per-pixel luminance.
/// Each frame is compared against it after the update; pixels brighter than
/// the background by more than the threshold form a mask, and the detector
/// fires if any 8-connected region of that mask has an area strictly between
/// `min_blob` and `max_blob`. Tiny regions are sensor noise; huge ones are
/// whole-scene changes that belong to the flash detector.
#[derive(Debug, Clone)]
pub struct BrightSpotDetector {
    threshold: u8,
    min_blob: usize,
    max_blob: usize,
    alpha: f32,
    background: Option<Background>,
}

impl BrightSpotDetector {
    pub fn new(threshold: u8, min_blob: usize, max_blob: usize) -> Self {
        Self {
            threshold,
            min_blob,
            max_blob,
            alpha: DEFAULT_ALPHA,
            background: None,
        }
    }

    /// Overrides the background blend weight (clamped to `0.0..=1.0`).
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Updates thresholds in place; the background model is kept.
    pub fn set_limits(&mut self, threshold: u8, min_blob: usize, max_blob: usize) {
        self.threshold = threshold;
        self.min_blob = min_blob;
        self.max_blob = max_blob;
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn blob_limits(&self) -> (usize, usize) {
        (self.min_blob, self.max_blob)
    }

    /// Returns true once a background has been seeded.
    pub fn is_seeded(&self) -> bool {
        self.background.is_some()
    }

    fn in_range(&self, blob: &Blob) -> bool {
        self.min_blob < blob.area && blob.area < self.max_blob
    }

    /// Updates the background and returns the bright regions of `frame`.
    ///
    /// Returns `None` when the frame only seeded the background.
    pub fn bright_regions(&mut self, frame: &Frame) -> Option<Vec<Blob>> {
        let current = luminance(frame);
        let (width, height) = (frame.width(), frame.height());

        let matches_size = matches!(
            &self.background,
            Some(bg) if bg.width == width
                && bg.height == height
                && bg.values.len() == current.len()
        );
        if !matches_size {
            if self.background.is_some() {
                tracing::debug!(width, height, "frame size changed, reseeding background");
            }
            self.background = Some(Background {
                width,
                height,
                values: current.iter().map(|&v| f32::from(v)).collect(),
            });
            return None;
        }
        let background = self.background.as_mut()?;

        let alpha = self.alpha;
        let threshold = self.threshold;
        let mask: Vec<bool> = background
            .values
            .iter_mut()
            .zip(current.iter())
            .map(|(bg, &cur)| {
                *bg = alpha * *bg + (1.0 - alpha) * f32::from(cur);
                let reference = bg.round().clamp(0.0, 255.0) as u8;
                cur.saturating_sub(reference) > threshold
            })
            .collect();

        Some(find_blobs(&mask, width, height))
    }
}

impl Detector for BrightSpotDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Laser
    }

    fn check(&mut self, frame: &Frame) -> bool {
        match self.bright_regions(frame) {
            Some(blobs) => {
                let hit = blobs.iter().find(|b| self.in_range(b));
                if let Some(blob) = hit {
                    tracing::trace!(area = blob.area, x = blob.min_x, y = blob.min_y, "bright spot");
                }
                hit.is_some()
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.background = None;
    }
}
