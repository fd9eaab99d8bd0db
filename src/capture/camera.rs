//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::{CameraConfig, Frame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not configured")]
    NotInitialized,
    #[error("camera stream not started")]
    NotStreaming,
}

/// Trait for camera devices driven by the controller.
///
/// The controller guarantees that `start` is only called right after a
/// successful `configure`, and that no two control sequences address the
/// device at once.
pub trait CameraDevice: Send {
    /// Applies a configuration snapshot. The stream must be stopped.
    fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Starts streaming with the last applied configuration.
    fn start(&mut self) -> Result<(), CameraError>;

    /// Stops streaming. Stopping a stopped device is not an error.
    fn stop(&mut self) -> Result<(), CameraError>;

    /// Releases the device.
    fn close(&mut self);

    /// Pulls the next frame. May block up to the device's own timeout.
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the device is currently streaming.
    fn is_streaming(&self) -> bool;
}

/// A control call observed by [`MockCamera`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Configure(CameraConfig),
    Start,
    Stop,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    config: Option<CameraConfig>,
    streaming: bool,
    sequence: u64,
    calls: Vec<DeviceCall>,
    queued: VecDeque<Vec<u8>>,
    base_level: u8,
    flash_every: Option<u64>,
    failing_captures: u32,
    reject_configure: bool,
    capture_delay: Duration,
    captures: u64,
}

/// Mock camera that generates synthetic frames.
///
/// Frames are flat at a configurable base level unless luminance planes are
/// queued through the [`MockCameraHandle`]. The handle also exposes the
/// control-call log and fault injection, so tests can drive a controller
/// that owns the camera.
#[derive(Debug, Default)]
pub struct MockCamera {
    state: Arc<Mutex<MockState>>,
}

/// Shared handle to a [`MockCamera`] that outlives moving the camera into a
/// controller.
#[derive(Debug, Clone)]
pub struct MockCameraHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the brightness of generated frames.
    pub fn with_base_level(self, level: u8) -> Self {
        lock(&self.state).base_level = level;
        self
    }

    /// Makes every `n`th generated frame a full-brightness flash.
    pub fn with_flash_every(self, n: u64) -> Self {
        lock(&self.state).flash_every = Some(n.max(1));
        self
    }

    /// Returns a handle for inspecting and steering this camera.
    pub fn handle(&self) -> MockCameraHandle {
        MockCameraHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockCameraHandle {
    /// Control calls received so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.state).calls.clone()
    }

    /// Clears the control-call log.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Queues a luminance plane to be delivered as the next frame.
    ///
    /// The plane is replicated across channels when the camera is
    /// configured for RGB.
    pub fn push_luminance(&self, plane: Vec<u8>) {
        lock(&self.state).queued.push_back(plane);
    }

    /// Number of queued planes not yet delivered.
    pub fn queued(&self) -> usize {
        lock(&self.state).queued.len()
    }

    /// Makes the next `n` captures fail.
    pub fn fail_next_captures(&self, n: u32) {
        lock(&self.state).failing_captures = n;
    }

    /// Makes subsequent `configure` calls fail.
    pub fn reject_configure(&self, reject: bool) {
        lock(&self.state).reject_configure = reject;
    }

    /// Adds a blocking delay to every capture.
    pub fn set_capture_delay(&self, delay: Duration) {
        lock(&self.state).capture_delay = delay;
    }

    /// Total capture attempts (successful or not).
    pub fn captures(&self) -> u64 {
        lock(&self.state).captures
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    /// The configuration applied by the last successful `configure`.
    pub fn applied_config(&self) -> Option<CameraConfig> {
        lock(&self.state).config.clone()
    }
}

impl CameraDevice for MockCamera {
    fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Configure(config.clone()));
        if state.reject_configure {
            return Err(CameraError::ConfigFailed(
                "mock camera rejected settings".to_string(),
            ));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        if state.streaming {
            return Err(CameraError::ConfigFailed(
                "cannot configure while streaming".to_string(),
            ));
        }
        state.config = Some(config.clone());
        tracing::debug!(?config, "MockCamera configured");
        Ok(())
    }

    fn start(&mut self) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Start);
        if state.config.is_none() {
            return Err(CameraError::NotInitialized);
        }
        state.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Stop);
        state.streaming = false;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(DeviceCall::Close);
        state.streaming = false;
        state.config = None;
        tracing::info!("MockCamera closed");
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let delay = lock(&self.state).capture_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = lock(&self.state);
        state.captures += 1;
        if !state.streaming {
            return Err(CameraError::NotStreaming);
        }
        if state.failing_captures > 0 {
            state.failing_captures -= 1;
            return Err(CameraError::CaptureFailed("injected failure".to_string()));
        }
        let config = state.config.clone().ok_or(CameraError::NotInitialized)?;

        state.sequence += 1;
        let sequence = state.sequence;
        let pixel_count = (config.width * config.height) as usize;

        let plane = match state.queued.pop_front() {
            Some(plane) if plane.len() == pixel_count => plane,
            Some(plane) => {
                return Err(CameraError::CaptureFailed(format!(
                    "queued plane has {} pixels, expected {}",
                    plane.len(),
                    pixel_count
                )))
            }
            None => {
                let flash = state.flash_every.is_some_and(|n| sequence % n == 0);
                let level = if flash { 250 } else { state.base_level };
                vec![level; pixel_count]
            }
        };

        let frame = if config.grayscale {
            Frame::new(plane, config.width, config.height, sequence)
        } else {
            let rgb = plane.iter().flat_map(|&v| [v, v, v]).collect();
            Frame::rgb(rgb, config.width, config.height, sequence)
        };
        Ok(frame)
    }

    fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }
}
