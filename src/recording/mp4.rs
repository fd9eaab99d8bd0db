//! H.264 in MP4, encoded with openh264 and muxed with muxide.

use super::{RecordingError, VideoSpec, VideoWriter, WriterFactory};
use crate::capture::Frame;
use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Encodes frames to H.264 and muxes them into an MP4 file.
///
/// Width and height must be even (4:2:0 chroma). Gray frames get neutral
/// chroma; colour frames are converted with BT.601 studio-range
/// coefficients.
pub struct Mp4Writer {
    encoder: Encoder,
    muxer: Option<Muxer<BufWriter<File>>>,
    spec: VideoSpec,
    frame_duration: f64,
    frames: u64,
}

impl Mp4Writer {
    /// Creates `path` and prepares the encoder for `spec`.
    pub fn create(path: &Path, spec: VideoSpec) -> Result<Self, RecordingError> {
        if spec.width == 0 || spec.height == 0 || spec.width % 2 != 0 || spec.height % 2 != 0 {
            return Err(RecordingError::Encode(format!(
                "H.264 needs even dimensions, got {}x{}",
                spec.width, spec.height
            )));
        }
        let fps = f64::from(spec.fps.max(1));

        let encoder =
            Encoder::new().map_err(|e| RecordingError::Encode(format!("encoder: {e}")))?;
        let file = File::create(path).map_err(|source| RecordingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let muxer = MuxerBuilder::new(BufWriter::new(file))
            .video(VideoCodec::H264, spec.width, spec.height, fps)
            .with_fast_start(true)
            .with_metadata(Metadata::new().with_current_time())
            .build()
            .map_err(|e| RecordingError::Encode(format!("muxer: {e}")))?;

        Ok(Self {
            encoder,
            muxer: Some(muxer),
            spec,
            frame_duration: 1.0 / fps,
            frames: 0,
        })
    }
}

impl VideoWriter for Mp4Writer {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        let Some(muxer) = self.muxer.as_mut() else {
            return Err(RecordingError::Finished);
        };
        if frame.width() != self.spec.width || frame.height() != self.spec.height {
            return Err(RecordingError::FrameMismatch {
                expected: (self.spec.width, self.spec.height),
                actual: (frame.width(), frame.height()),
            });
        }

        let yuv = to_i420(frame);
        let source = YUVBuffer::from_vec(yuv, frame.width() as usize, frame.height() as usize);
        let bitstream = self
            .encoder
            .encode(&source)
            .map_err(|e| RecordingError::Encode(e.to_string()))?;
        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();

        // Rate control may skip a frame entirely; it still occupies its slot.
        if !data.is_empty() {
            let pts = self.frames as f64 * self.frame_duration;
            muxer
                .write_video(pts, &data, keyframe)
                .map_err(|e| RecordingError::Encode(e.to_string()))?;
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        let Some(muxer) = self.muxer.take() else {
            return Ok(());
        };
        let stats = muxer
            .finish_with_stats()
            .map_err(|e| RecordingError::Encode(e.to_string()))?;
        tracing::debug!(
            frames = stats.video_frames,
            bytes = stats.bytes_written,
            "MP4 finalized"
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// Creates `.mp4` files through [`Mp4Writer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp4WriterFactory;

impl WriterFactory for Mp4WriterFactory {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn create(&self, path: &Path, spec: &VideoSpec) -> Result<Box<dyn VideoWriter>, RecordingError> {
        Ok(Box::new(Mp4Writer::create(path, *spec)?))
    }
}

fn studio_yuv(r: i32, g: i32, b: i32) -> (u8, u8, u8) {
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y.clamp(0, 255) as u8, u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
}

/// Planar 4:2:0 conversion. Chroma is averaged over each 2×2 block.
fn to_i420(frame: &Frame) -> Vec<u8> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (cw, ch) = (w / 2, h / 2);
    let mut yuv = vec![0u8; w * h + 2 * cw * ch];
    let (y_plane, chroma) = yuv.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    let pixels = frame.pixels();
    let rgb_at = |x: usize, y: usize| -> (i32, i32, i32) {
        let i = y * w + x;
        if frame.is_grayscale() {
            let v = i32::from(pixels[i]);
            (v, v, v)
        } else {
            let p = &pixels[i * 3..i * 3 + 3];
            (i32::from(p[0]), i32::from(p[1]), i32::from(p[2]))
        }
    };

    for by in 0..ch {
        for bx in 0..cw {
            let (mut u_sum, mut v_sum) = (0u32, 0u32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (bx * 2 + dx, by * 2 + dy);
                let (r, g, b) = rgb_at(x, y);
                let (luma, u, v) = studio_yuv(r, g, b);
                y_plane[y * w + x] = luma;
                u_sum += u32::from(u);
                v_sum += u32::from(v);
            }
            u_plane[by * cw + bx] = ((u_sum + 2) / 4) as u8;
            v_plane[by * cw + bx] = ((v_sum + 2) / 4) as u8;
        }
    }
    yuv
}
