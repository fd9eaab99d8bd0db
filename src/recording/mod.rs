//! Persisting frames: recording sessions, buffer clips and snapshots.
//!
//! Video goes through a [`WriterFactory`]. The `recording` feature adds an
//! H.264/MP4 writer and makes it the default; without it recordings are
//! uncompressed `.y4m`.
//!
//! Failures here never reach the capture loop. The session logs writer
//! errors and falls back to "not recording"; callers starting a recording
//! get the error back.

mod export;
#[cfg(feature = "recording")]
mod mp4;
mod session;
mod writer;

pub use export::{export_clip, export_snapshot, timestamped_path};
#[cfg(feature = "recording")]
pub use mp4::{Mp4Writer, Mp4WriterFactory};
pub use session::{RecordingSession, RecordingSummary};
pub use writer::{VideoSpec, VideoWriter, WriterFactory, Y4mWriter, Y4mWriterFactory};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// H.264/MP4 when built with the `recording` feature, raw YUV4MPEG2
/// otherwise.
pub fn default_writer_factory() -> Arc<dyn WriterFactory> {
    #[cfg(feature = "recording")]
    {
        Arc::new(Mp4WriterFactory)
    }
    #[cfg(not(feature = "recording"))]
    {
        Arc::new(Y4mWriterFactory)
    }
}

/// Errors that can occur while writing artifacts.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write frame: {0}")]
    Write(#[from] std::io::Error),
    #[error("frame is {actual:?} but the recording is {expected:?}")]
    FrameMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("writer already finished")]
    Finished,
    #[error("failed to encode snapshot: {0}")]
    Snapshot(#[from] image::ImageError),
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u8),
    #[error("video encoding failed: {0}")]
    Encode(String),
}
