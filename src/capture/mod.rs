//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing frames from a camera
//! device and managing its configuration. The device itself is an opaque
//! capability behind [`CameraDevice`].

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod native;

pub use camera::{CameraDevice, CameraError, DeviceCall, MockCamera, MockCameraHandle};
pub use config::{CameraConfig, CameraConfigPatch, CameraControls, MAX_FPS};
pub use frame::Frame;
#[cfg(feature = "camera")]
pub use native::NokhwaCamera;
