//! Sudden whole-frame brightness detection.

use super::{luminance::mean_luminance, Detector, TriggerKind};
use crate::capture::Frame;
use std::collections::VecDeque;

/// Default number of frames in the averaging window.
pub const DEFAULT_WINDOW: usize = 10;

/// Fires when a frame's mean luminance jumps above the recent average.
///
/// Keeps the mean luminance of the last `window` frames. Until the window
/// is full the detector stays silent. After that a frame fires when its mean
/// exceeds the average of the other samples in the window by more than the
/// threshold. There is no refractory period: a sustained bright scene keeps
/// firing for as long as it stays above the trailing average.
#[derive(Debug, Clone)]
pub struct FlashDetector {
    threshold: f64,
    window: usize,
    history: VecDeque<f64>,
}

impl FlashDetector {
    /// Creates a detector with the default window.
    pub fn new(threshold: f64) -> Self {
        Self::with_window(threshold, DEFAULT_WINDOW)
    }

    /// Creates a detector with a custom window (at least 2 frames).
    pub fn with_window(threshold: f64, window: usize) -> Self {
        let window = window.max(2);
        Self {
            threshold,
            window,
            history: VecDeque::with_capacity(window + 1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Changes the threshold without discarding history.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Returns true once the window is full.
    pub fn is_primed(&self) -> bool {
        self.history.len() >= self.window
    }

    /// Evaluates a precomputed mean luminance.
    pub fn check_mean(&mut self, current: f64) -> bool {
        self.history.push_back(current);
        if self.history.len() > self.window {
            self.history.pop_front();
        }
        if self.history.len() < self.window {
            return false;
        }

        let prior_sum: f64 = self.history.iter().sum::<f64>() - current;
        let average = prior_sum / (self.history.len() - 1) as f64;
        let delta = current - average;

        tracing::trace!(current, average, delta, "flash check");
        delta > self.threshold
    }
}

impl Detector for FlashDetector {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Flash
    }

    fn check(&mut self, frame: &Frame) -> bool {
        self.check_mean(mean_luminance(frame))
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
