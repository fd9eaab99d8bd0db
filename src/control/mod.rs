//! Operator-facing control surface.
//!
//! [`ControlPlane`] wraps a [`Controller`] with the operations a remote UI
//! would call and keeps a short log of what happened. It has no transport of
//! its own; the binary drives it directly.

mod log;

pub use log::{EventLog, DEFAULT_EVENT_LOG_LEN};

use crate::buffer::BufferStats;
use crate::capture::{CameraConfig, CameraConfigPatch};
use crate::config::{validate_buffer_length, ConfigError};
use crate::controller::{CaptureStatsSnapshot, Controller, ControllerError, Event, EventKind};
use crate::detection::{DetectionConfig, DetectionConfigPatch};
use crate::notify::{DisplayPower, VcgencmdDisplay};
use crate::recording::{RecordingError, RecordingSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors returned by control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),
    #[error("display power control failed: {0}")]
    Display(#[source] std::io::Error),
}

/// Current settings and status, as returned by [`ControlPlane::get_config`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub buffer: BufferStats,
    pub running: bool,
    pub recording: Option<PathBuf>,
    pub stats: CaptureStatsSnapshot,
    pub recent_events: Vec<Event>,
}

/// Pre-roll buffer settings change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfigPatch {
    pub length_secs: Option<f64>,
}

/// A partial settings change. Absent sections are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub camera: Option<CameraConfigPatch>,
    pub detection: Option<DetectionConfigPatch>,
    pub buffer: Option<BufferConfigPatch>,
}

/// Control operations over a running [`Controller`].
pub struct ControlPlane {
    controller: Controller,
    events: Arc<EventLog>,
    display: Box<dyn DisplayPower>,
}

impl ControlPlane {
    /// Wraps `controller`, registering an [`EventLog`] as its observer.
    pub fn new(controller: Controller) -> Self {
        Self::with_parts(
            controller,
            Arc::new(EventLog::default()),
            Box::new(VcgencmdDisplay::new()),
        )
    }

    /// Wraps `controller` with an explicit event log and display control.
    pub fn with_parts(
        controller: Controller,
        events: Arc<EventLog>,
        display: Box<dyn DisplayPower>,
    ) -> Self {
        controller.set_trigger_observer(events.clone());
        Self {
            controller,
            events,
            display,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn start(&self) -> Result<(), ControlError> {
        Ok(self.controller.start()?)
    }

    pub fn stop(&self) -> Result<(), ControlError> {
        Ok(self.controller.stop()?)
    }

    /// Stops capture, finalizes any recording and releases the camera.
    pub fn shutdown(&self) -> Result<(), ControlError> {
        if let Some(summary) = self.controller.stop_recording() {
            self.log_stopped(&summary);
        }
        Ok(self.controller.shutdown()?)
    }

    pub fn get_config(&self) -> ConfigView {
        ConfigView {
            camera: self.controller.camera_config(),
            detection: self.controller.detection_config(),
            buffer: self.controller.buffer_stats(),
            running: self.controller.is_running(),
            recording: self.controller.recording_path(),
            stats: self.controller.stats(),
            recent_events: self.events.recent(),
        }
    }

    /// Applies a partial update and returns the resulting view.
    ///
    /// Every section is validated before anything is applied. The camera is
    /// only reconfigured when its patch changes a value. A device failure
    /// during reconfiguration is returned after the other sections have been
    /// left untouched.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<ConfigView, ControlError> {
        let detection = update
            .detection
            .as_ref()
            .map(|patch| self.controller.detection_config().merged(patch));
        if let Some(detection) = &detection {
            detection.validate()?;
        }
        let buffer_secs = update.buffer.as_ref().and_then(|b| b.length_secs);
        if let Some(seconds) = buffer_secs {
            validate_buffer_length(seconds)?;
        }
        if let Some(patch) = &update.camera {
            self.controller.camera_config().merged(patch).validate()?;
        }

        if let Some(patch) = &update.camera {
            if self.controller.reconfigure(patch)? {
                info!(?patch, "Camera settings updated");
            }
        }
        if let Some(patch) = &update.detection {
            self.controller.update_detection(patch)?;
        }
        if let Some(seconds) = buffer_secs {
            let capacity = self.controller.update_buffer(seconds)?;
            info!(seconds, capacity, "Buffer length updated");
        }
        Ok(self.get_config())
    }

    /// Starts a recording. Returns `Ok(None)` if one is already active.
    pub fn start_recording(&self, with_preroll: bool) -> Result<Option<PathBuf>, ControlError> {
        let path = self.controller.start_recording(with_preroll)?;
        if path.is_some() {
            self.events.record(Event::new(EventKind::RecordingStarted));
        }
        Ok(path)
    }

    pub fn stop_recording(&self) -> Option<RecordingSummary> {
        let summary = self.controller.stop_recording()?;
        self.log_stopped(&summary);
        Some(summary)
    }

    fn log_stopped(&self, summary: &RecordingSummary) {
        info!(path = %summary.path.display(), frames = summary.frames, "Recording saved");
        self.events.record(Event::new(EventKind::RecordingStopped));
    }

    /// Writes the current buffer to a clip. `Ok(None)` when it is empty.
    pub fn save_buffer_now(&self) -> Result<Option<PathBuf>, ControlError> {
        let path = self.controller.save_buffer_now()?;
        if path.is_some() {
            self.events.record(Event::new(EventKind::ManualSave));
        }
        Ok(path)
    }

    /// Saves the latest frame as an image. `Ok(None)` before the first frame.
    pub fn save_snapshot(&self) -> Result<Option<PathBuf>, ControlError> {
        let path = self.controller.save_snapshot()?;
        if path.is_some() {
            self.events.record(Event::new(EventKind::Snapshot));
        }
        Ok(path)
    }

    pub fn set_display_power(&self, on: bool) -> Result<(), ControlError> {
        self.display
            .set_display_power(on)
            .map_err(ControlError::Display)
    }

    pub fn recent_events(&self) -> Vec<Event> {
        self.events.recent()
    }
}
