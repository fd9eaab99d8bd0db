//! Captured images.

use std::time::Instant;

/// One image from the camera plus when it was taken.
///
/// Frames own their pixel data. The camera device is free to reuse its
/// internal buffers on the next read, so everything downstream (ring buffer,
/// last-frame slot, detectors) keeps its own copy.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved samples when `channels > 1`.
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// 1 (grayscale) or 3 (RGB).
    channels: u8,
    captured: Instant,
    sequence: u64,
}

impl Frame {
    /// Single-channel frame.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::with_channels(pixels, width, height, 1, sequence)
    }

    /// Interleaved RGB frame.
    pub fn rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::with_channels(pixels, width, height, 3, sequence)
    }

    pub fn with_channels(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        sequence: u64,
    ) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            captured: Instant::now(),
            sequence,
        }
    }

    /// Takes over the controller's numbering and marks the frame as
    /// acquired now.
    pub(crate) fn restamp(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self.captured = Instant::now();
        self
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    #[inline]
    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    /// Monotonic acquisition time.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.captured
    }

    /// Position in the capture stream, starting at 1.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// `width × height`, regardless of channel count.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes held by the pixel buffer.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// True when the buffer holds exactly `width × height × channels` samples
    /// and the channel count is supported.
    pub fn is_valid(&self) -> bool {
        matches!(self.channels, 1 | 3)
            && self.pixels.len() == self.pixel_count() * usize::from(self.channels)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame(#{} {}x{}x{}, {} bytes)",
            self.sequence,
            self.width,
            self.height,
            self.channels,
            self.pixels.len()
        )
    }
}
