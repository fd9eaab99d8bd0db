//! Camera Monitoring Library
//!
//! Turns a continuous camera feed into a monitored, recordable stream: frames
//! are kept in a pre-roll buffer, checked for sudden flashes and small bright
//! spots, and written to disk on demand or when a detector fires.
//!
//! # Architecture
//!
//! A single capture thread owned by the [`Controller`] drives the pipeline:
//!
//! ```text
//! camera → last frame → ring buffer → recording
//!                           ↓
//!                 detection (flash, bright spot)
//!                           ↓
//!           autosave · alert · triggered recording · event
//! ```
//!
//! # Design Principles
//!
//! - **Capture never stops on errors**: failed pulls, writes and alerts are
//!   logged and retried, never propagated out of the loop
//! - **One capture thread**: lifecycle changes join the old thread before the
//!   device is touched again
//! - **Copies out**: readers get frame copies; no lock is held during disk I/O
//!   except the recording lock while appending
//!
//! # Example
//!
//! ```no_run
//! use camwatch::{
//!     capture::MockCamera,
//!     controller::{Controller, Event},
//! };
//! use std::sync::Arc;
//!
//! let controller = Controller::builder(Box::new(MockCamera::new().with_flash_every(50)))
//!     .build()
//!     .unwrap();
//! controller.set_trigger_observer(Arc::new(|event: &Event| println!("{event}")));
//!
//! controller.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! controller.save_buffer_now().unwrap();
//! controller.shutdown().unwrap();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod capture;
pub mod config;
pub mod control;
pub mod controller;
pub mod detection;
pub mod metrics;
pub mod notify;
pub mod recording;

// Re-export commonly used types at crate root
pub use buffer::{BufferStats, RingBuffer};
pub use capture::{CameraConfig, CameraConfigPatch, CameraDevice, Frame, MockCamera};
pub use config::AppConfig;
pub use control::{ConfigUpdate, ConfigView, ControlPlane, EventLog};
pub use controller::{Controller, Event, EventKind, TriggerObserver};
pub use detection::{DetectionConfig, TriggerKind};
pub use recording::RecordingSession;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
