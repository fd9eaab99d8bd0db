//! Prometheus metrics for the capture pipeline.
//!
//! # Metrics Exposed
//!
//! ## Capture
//! - `camwatch_frames_captured_total` - Frames captured
//! - `camwatch_capture_failures_total` - Failed frame pulls
//! - `camwatch_triggers_total{kind}` - Detector triggers (`flash`, `laser`)
//!
//! ## Buffer and recording
//! - `camwatch_buffer_frames` - Frames held for pre-roll
//! - `camwatch_buffer_capacity_frames` - Pre-roll capacity
//! - `camwatch_buffer_memory_bytes` - Approximate pixel memory held
//! - `camwatch_recording_active` - 1 while a recording is open
//!
//! # Example
//!
//! ```no_run
//! use camwatch::capture::MockCamera;
//! use camwatch::controller::Controller;
//! use camwatch::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let controller = Controller::builder(Box::new(MockCamera::new()))
//!     .build()
//!     .expect("valid default configuration");
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! registry.update(&MetricsSnapshot::from_controller(&controller));
//! println!("{}", registry.encode().expect("encodable"));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
