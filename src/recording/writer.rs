//! Video output: the writer capability and the built-in YUV4MPEG2 writer.

use super::RecordingError;
use crate::capture::Frame;
use crate::detection::rgb_to_luminance;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Geometry and rate of an output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// 1 for grayscale output, 3 for colour.
    pub channels: u8,
}

impl VideoSpec {
    /// Spec matching the geometry of `frame`.
    pub fn for_frame(frame: &Frame, fps: u32) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            fps,
            channels: frame.channels(),
        }
    }
}

/// An open output artifact accepting frames in order.
pub trait VideoWriter: Send {
    /// Appends one frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Flushes and finalizes the artifact. Further writes are invalid.
    fn finish(&mut self) -> Result<(), RecordingError>;

    /// Frames written so far.
    fn frames_written(&self) -> u64;
}

/// Opens [`VideoWriter`]s. Shared between the recording session and clip
/// export, so implementations must be thread-safe.
pub trait WriterFactory: Send + Sync {
    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &'static str;

    /// Creates a new artifact at `path`.
    fn create(&self, path: &Path, spec: &VideoSpec) -> Result<Box<dyn VideoWriter>, RecordingError>;
}

/// Writes uncompressed YUV4MPEG2 streams.
///
/// Grayscale specs produce `Cmono` streams; colour specs produce full-range
/// `C444` streams. Frames whose channel count differs from the spec are
/// converted on the way in.
pub struct Y4mWriter<W: Write> {
    out: W,
    spec: VideoSpec,
    frames: u64,
    finished: bool,
}

impl<W: Write> Y4mWriter<W> {
    /// Writes the stream header and returns the writer.
    pub fn new(mut out: W, spec: VideoSpec) -> Result<Self, RecordingError> {
        let colorspace = if spec.channels == 1 { "mono" } else { "444" };
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C{}",
            spec.width,
            spec.height,
            spec.fps.max(1),
            colorspace
        )?;
        Ok(Self {
            out,
            spec,
            frames: 0,
            finished: false,
        })
    }

    /// Consumes the writer and returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_planes(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if self.spec.channels == 1 {
            if frame.is_grayscale() {
                self.out.write_all(frame.pixels())?;
            } else {
                self.out.write_all(&rgb_to_luminance(frame.pixels()))?;
            }
            return Ok(());
        }

        if frame.is_grayscale() {
            let neutral = vec![128u8; frame.pixel_count()];
            self.out.write_all(frame.pixels())?;
            self.out.write_all(&neutral)?;
            self.out.write_all(&neutral)?;
            return Ok(());
        }

        let (y, cb, cr) = rgb_to_ycbcr_planes(frame.pixels());
        self.out.write_all(&y)?;
        self.out.write_all(&cb)?;
        self.out.write_all(&cr)?;
        Ok(())
    }
}

impl<W: Write + Send> VideoWriter for Y4mWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if self.finished {
            return Err(RecordingError::Finished);
        }
        if frame.width() != self.spec.width || frame.height() != self.spec.height {
            return Err(RecordingError::FrameMismatch {
                expected: (self.spec.width, self.spec.height),
                actual: (frame.width(), frame.height()),
            });
        }
        self.out.write_all(b"FRAME\n")?;
        self.write_planes(frame)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        if !self.finished {
            self.finished = true;
            self.out.flush()?;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// Splits interleaved RGB into full-range BT.601 Y, Cb and Cr planes.
fn rgb_to_ycbcr_planes(rgb: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let n = rgb.len() / 3;
    let mut y = Vec::with_capacity(n);
    let mut cb = Vec::with_capacity(n);
    let mut cr = Vec::with_capacity(n);
    for px in rgb.chunks_exact(3) {
        let (r, g, b) = (f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        y.push(to_u8(0.299 * r + 0.587 * g + 0.114 * b));
        cb.push(to_u8(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b));
        cr.push(to_u8(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b));
    }
    (y, cb, cr)
}

/// Creates buffered `.y4m` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct Y4mWriterFactory;

impl WriterFactory for Y4mWriterFactory {
    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn create(&self, path: &Path, spec: &VideoSpec) -> Result<Box<dyn VideoWriter>, RecordingError> {
        let file = File::create(path).map_err(|source| RecordingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(Y4mWriter::new(BufWriter::new(file), *spec)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_spec() -> VideoSpec {
        VideoSpec {
            width: 2,
            height: 2,
            fps: 10,
            channels: 1,
        }
    }

    #[test]
    fn test_mono_stream_layout() {
        let mut writer = Y4mWriter::new(Vec::new(), mono_spec()).unwrap();
        writer
            .write_frame(&Frame::new(vec![1, 2, 3, 4], 2, 2, 1))
            .unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.frames_written(), 1);

        let bytes = writer.into_inner();
        let header = b"YUV4MPEG2 W2 H2 F10:1 Ip A1:1 Cmono\n";
        assert!(bytes.starts_with(header));
        assert_eq!(&bytes[header.len()..], b"FRAME\n\x01\x02\x03\x04");
    }

    #[test]
    fn test_color_stream_has_three_planes() {
        let spec = VideoSpec {
            channels: 3,
            ..mono_spec()
        };
        let mut writer = Y4mWriter::new(Vec::new(), spec).unwrap();
        writer
            .write_frame(&Frame::rgb(vec![128; 12], 2, 2, 1))
            .unwrap();
        let bytes = writer.into_inner();
        let header_len = b"YUV4MPEG2 W2 H2 F10:1 Ip A1:1 C444\n".len();
        assert_eq!(bytes.len(), header_len + b"FRAME\n".len() + 12);
        assert!(bytes[header_len + 6..].iter().all(|&v| v == 128));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut writer = Y4mWriter::new(Vec::new(), mono_spec()).unwrap();
        let result = writer.write_frame(&Frame::new(vec![0; 9], 3, 3, 1));
        assert!(matches!(result, Err(RecordingError::FrameMismatch { .. })));
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn test_write_after_finish_rejected() {
        let mut writer = Y4mWriter::new(Vec::new(), mono_spec()).unwrap();
        writer.finish().unwrap();
        let result = writer.write_frame(&Frame::new(vec![0; 4], 2, 2, 1));
        assert!(matches!(result, Err(RecordingError::Finished)));
    }
}
