//! One-shot exports: buffer clips and still snapshots.

use super::{RecordingError, VideoSpec, VideoWriter, WriterFactory};
use crate::buffer::BufferedFrame;
use crate::capture::Frame;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Builds `<dir>/<prefix>_YYYYmmdd_HHMMSS.<ext>`, adding `_N` until the
/// path is unused.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str, at: DateTime<Local>) -> PathBuf {
    let stem = format!("{}_{}", prefix, at.format("%Y%m%d_%H%M%S"));
    let mut candidate = dir.join(format!("{stem}.{extension}"));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{n}.{extension}"));
        n += 1;
    }
    candidate
}

/// Closes a writer that failed mid-artifact and deletes what it wrote.
pub(crate) fn discard(mut writer: Box<dyn VideoWriter>, path: &Path) {
    let _ = writer.finish();
    drop(writer);
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove partial artifact");
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), RecordingError> {
    std::fs::create_dir_all(dir).map_err(|source| RecordingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Writes `frames` to a new artifact in `dir`.
///
/// Geometry comes from the first frame. Returns `Ok(None)` when there is
/// nothing to write.
pub fn export_clip(
    dir: &Path,
    prefix: &str,
    frames: &[BufferedFrame],
    fps: u32,
    factory: &dyn WriterFactory,
) -> Result<Option<PathBuf>, RecordingError> {
    let Some(first) = frames.first() else {
        return Ok(None);
    };

    ensure_dir(dir)?;
    let path = timestamped_path(dir, prefix, factory.extension(), Local::now());
    let spec = VideoSpec::for_frame(&first.frame, fps);
    let mut writer = factory.create(&path, &spec)?;

    for buffered in frames {
        if let Err(e) = writer.write_frame(&buffered.frame) {
            discard(writer, &path);
            return Err(e);
        }
    }
    if let Err(e) = writer.finish() {
        discard(writer, &path);
        return Err(e);
    }

    tracing::info!(
        path = %path.display(),
        frames = frames.len(),
        "Saved buffer clip"
    );
    Ok(Some(path))
}

/// Saves one frame as a PNG image in `dir`.
pub fn export_snapshot(dir: &Path, frame: &Frame) -> Result<PathBuf, RecordingError> {
    let color = match frame.channels() {
        1 => image::ColorType::L8,
        3 => image::ColorType::Rgb8,
        other => return Err(RecordingError::UnsupportedChannels(other)),
    };

    ensure_dir(dir)?;
    let path = timestamped_path(dir, "image", "png", Local::now());
    image::save_buffer(&path, frame.pixels(), frame.width(), frame.height(), color)?;

    tracing::info!(path = %path.display(), "Saved snapshot");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Y4mWriterFactory;

    fn buffered(level: u8) -> BufferedFrame {
        BufferedFrame {
            frame: Frame::new(vec![level; 4], 2, 2, u64::from(level)),
            captured_at: Local::now(),
        }
    }

    #[test]
    fn test_timestamped_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local::now();
        let first = timestamped_path(dir.path(), "video", "y4m", at);
        std::fs::write(&first, b"x").unwrap();
        let second = timestamped_path(dir.path(), "video", "y4m", at);

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("video_"));
        assert!(name.ends_with(".y4m"));
        assert!(second.to_string_lossy().ends_with("_1.y4m"));
    }

    #[test]
    fn test_export_clip_writes_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![buffered(1), buffered(2), buffered(3)];
        let path = export_clip(dir.path(), "buffer", &frames, 10, &Y4mWriterFactory)
            .unwrap()
            .unwrap();

        let bytes = std::fs::read(path).unwrap();
        let frame_markers = bytes.windows(6).filter(|w| *w == b"FRAME\n").count();
        assert_eq!(frame_markers, 3);
    }

    #[test]
    fn test_failed_clip_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        // The second frame does not match the geometry taken from the first.
        let frames = vec![
            buffered(1),
            BufferedFrame {
                frame: Frame::new(vec![0; 9], 3, 3, 2),
                captured_at: Local::now(),
            },
        ];
        let result = export_clip(dir.path(), "buffer", &frames, 10, &Y4mWriterFactory);

        assert!(matches!(result, Err(RecordingError::FrameMismatch { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_export_empty_clip_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let result = export_clip(dir.path(), "buffer", &[], 10, &Y4mWriterFactory).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_export_snapshot_png() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::rgb(vec![200; 12], 2, 2, 1);
        let path = export_snapshot(&dir.path().join("captures"), &frame).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
    }
}
