//! Recording session lifecycle: open, pre-roll flush, append, close.

use super::export::{discard, ensure_dir, timestamped_path};
use super::{RecordingError, VideoSpec, VideoWriter, WriterFactory};
use crate::buffer::BufferedFrame;
use crate::capture::Frame;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub started_at: DateTime<Local>,
    pub stopped_at: DateTime<Local>,
}

struct ActiveRecording {
    path: PathBuf,
    writer: Box<dyn VideoWriter>,
    started_at: DateTime<Local>,
    frame_limit: Option<u64>,
}

impl ActiveRecording {
    fn close(mut self) -> RecordingSummary {
        if let Err(e) = self.writer.finish() {
            warn!(path = %self.path.display(), error = %e, "Failed to finalize recording");
        }
        RecordingSummary {
            path: self.path,
            frames: self.writer.frames_written(),
            started_at: self.started_at,
            stopped_at: Local::now(),
        }
    }
}

/// At most one active recording at a time.
///
/// Starting while active is a no-op; stopping while inactive is a no-op.
/// A session only becomes active after its pre-roll has been written, so a
/// failed flush never leaves a half-open recording behind.
pub struct RecordingSession {
    directory: PathBuf,
    factory: Arc<dyn WriterFactory>,
    max_seconds: u64,
    active: Option<ActiveRecording>,
}

impl RecordingSession {
    /// Creates an inactive session writing into `directory`.
    ///
    /// `max_seconds` bounds each recording (0 = unbounded).
    pub fn new(directory: impl Into<PathBuf>, factory: Arc<dyn WriterFactory>, max_seconds: u64) -> Self {
        Self {
            directory: directory.into(),
            factory,
            max_seconds,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the active recording, if any.
    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Opens a new recording, writing `preroll` frames first.
    ///
    /// Returns `Ok(None)` if a recording is already active.
    pub fn start(
        &mut self,
        spec: VideoSpec,
        preroll: Option<Vec<BufferedFrame>>,
    ) -> Result<Option<PathBuf>, RecordingError> {
        if let Some(active) = &self.active {
            debug!(path = %active.path.display(), "Recording already active");
            return Ok(None);
        }

        ensure_dir(&self.directory)?;
        let path = timestamped_path(&self.directory, "video", self.factory.extension(), Local::now());
        let mut writer = self.factory.create(&path, &spec)?;

        let preroll = preroll.unwrap_or_default();
        for buffered in &preroll {
            if let Err(e) = writer.write_frame(&buffered.frame) {
                warn!(path = %path.display(), error = %e, "Pre-roll flush failed");
                discard(writer, &path);
                return Err(e);
            }
        }

        let frame_limit = (self.max_seconds > 0).then(|| self.max_seconds * u64::from(spec.fps.max(1)));
        info!(
            path = %path.display(),
            preroll_frames = preroll.len(),
            fps = spec.fps,
            width = spec.width,
            height = spec.height,
            "Recording started"
        );
        self.active = Some(ActiveRecording {
            path: path.clone(),
            writer,
            started_at: Local::now(),
            frame_limit,
        });
        Ok(Some(path))
    }

    /// Appends a live frame to the active recording.
    ///
    /// Returns a summary when this call ended the recording, either because
    /// the frame limit was reached or because the writer failed.
    pub fn append(&mut self, frame: &Frame) -> Option<RecordingSummary> {
        let active = self.active.as_mut()?;

        if let Err(e) = active.writer.write_frame(frame) {
            warn!(path = %active.path.display(), error = %e, "Recording write failed, stopping");
            return self.active.take().map(ActiveRecording::close);
        }

        let limit_reached = active
            .frame_limit
            .is_some_and(|limit| active.writer.frames_written() >= limit);
        if limit_reached {
            info!(path = %active.path.display(), "Recording reached its length limit");
            return self.stop();
        }
        None
    }

    /// Finalizes and closes the active recording.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        let summary = self.active.take()?.close();
        info!(
            path = %summary.path.display(),
            frames = summary.frames,
            "Recording stopped"
        );
        Some(summary)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("directory", &self.directory)
            .field("active", &self.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Y4mWriterFactory;
    use std::sync::Mutex;

    /// Records the sequence numbers written to each artifact.
    #[derive(Default)]
    struct MemoryFactory {
        written: Arc<Mutex<Vec<(PathBuf, Vec<u64>)>>>,
        fail_after: Option<u64>,
    }

    struct MemoryWriter {
        index: usize,
        written: Arc<Mutex<Vec<(PathBuf, Vec<u64>)>>>,
        fail_after: Option<u64>,
        frames: u64,
    }

    impl VideoWriter for MemoryWriter {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordingError> {
            if self.fail_after.is_some_and(|n| self.frames >= n) {
                return Err(RecordingError::Write(std::io::Error::other("disk full")));
            }
            self.written.lock().unwrap()[self.index].1.push(frame.sequence());
            self.frames += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), RecordingError> {
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.frames
        }
    }

    impl WriterFactory for MemoryFactory {
        fn extension(&self) -> &'static str {
            "mem"
        }

        fn create(&self, path: &Path, _spec: &VideoSpec) -> Result<Box<dyn VideoWriter>, RecordingError> {
            std::fs::write(path, b"")?;
            let mut written = self.written.lock().unwrap();
            written.push((path.to_path_buf(), Vec::new()));
            Ok(Box::new(MemoryWriter {
                index: written.len() - 1,
                written: Arc::clone(&self.written),
                fail_after: self.fail_after,
                frames: 0,
            }))
        }
    }

    fn spec() -> VideoSpec {
        VideoSpec {
            width: 2,
            height: 2,
            fps: 10,
            channels: 1,
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0; 4], 2, 2, seq)
    }

    fn buffered(seq: u64) -> BufferedFrame {
        BufferedFrame {
            frame: frame(seq),
            captured_at: Local::now(),
        }
    }

    #[test]
    fn test_preroll_then_live_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MemoryFactory::default());
        let written = Arc::clone(&factory.written);
        let mut session = RecordingSession::new(dir.path(), factory, 0);

        let preroll = vec![buffered(1), buffered(2), buffered(3)];
        session.start(spec(), Some(preroll)).unwrap().unwrap();
        assert!(session.is_active());

        session.append(&frame(4));
        session.append(&frame(5));
        let summary = session.stop().unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(written.lock().unwrap()[0].1, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_second_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MemoryFactory::default());
        let written = Arc::clone(&factory.written);
        let mut session = RecordingSession::new(dir.path(), factory, 0);

        let first = session.start(spec(), None).unwrap();
        let second = session.start(spec(), None).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(written.lock().unwrap().len(), 1);
        assert_eq!(session.path(), first.as_deref());
    }

    #[test]
    fn test_stop_then_start_creates_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path(), Arc::new(Y4mWriterFactory), 0);

        let first = session.start(spec(), None).unwrap().unwrap();
        session.stop();
        let second = session.start(spec(), None).unwrap().unwrap();
        session.stop();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path(), Arc::new(Y4mWriterFactory), 0);
        assert!(session.stop().is_none());
        assert!(session.append(&frame(1)).is_none());
    }

    #[test]
    fn test_failed_preroll_leaves_session_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MemoryFactory {
            fail_after: Some(1),
            ..Default::default()
        });
        let mut session = RecordingSession::new(dir.path(), factory, 0);

        let result = session.start(spec(), Some(vec![buffered(1), buffered(2)]));
        assert!(result.is_err());
        assert!(!session.is_active());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_failure_degrades_to_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MemoryFactory {
            fail_after: Some(2),
            ..Default::default()
        });
        let mut session = RecordingSession::new(dir.path(), factory, 0);
        session.start(spec(), None).unwrap();

        assert!(session.append(&frame(1)).is_none());
        assert!(session.append(&frame(2)).is_none());
        let summary = session.append(&frame(3)).unwrap();
        assert_eq!(summary.frames, 2);
        assert!(!session.is_active());
    }

    #[test]
    fn test_length_limit_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path(), Arc::new(Y4mWriterFactory), 1);
        session.start(spec(), None).unwrap();

        for seq in 1..10 {
            assert!(session.append(&frame(seq)).is_none());
        }
        let summary = session.append(&frame(10)).unwrap();
        assert_eq!(summary.frames, 10);
        assert!(!session.is_active());
    }

    #[test]
    fn test_unwritable_directory_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let mut session = RecordingSession::new(blocker.join("sub"), Arc::new(Y4mWriterFactory), 0);

        assert!(session.start(spec(), None).is_err());
        assert!(!session.is_active());
    }
}
