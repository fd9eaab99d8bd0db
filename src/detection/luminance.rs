//! Luminance extraction from grayscale and RGB frames.

use crate::capture::Frame;
use std::borrow::Cow;

// BT.601 weights in 14-bit fixed point (0.299, 0.587, 0.114).
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Converts interleaved RGB samples to one luminance byte per pixel.
pub fn rgb_to_luminance(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let y = u32::from(px[0]) * R_WEIGHT
                + u32::from(px[1]) * G_WEIGHT
                + u32::from(px[2]) * B_WEIGHT;
            ((y + (1 << (SHIFT - 1))) >> SHIFT) as u8
        })
        .collect()
}

/// Returns the luminance plane of a frame, borrowing when already grayscale.
pub fn luminance(frame: &Frame) -> Cow<'_, [u8]> {
    if frame.is_grayscale() {
        Cow::Borrowed(frame.pixels())
    } else {
        Cow::Owned(rgb_to_luminance(frame.pixels()))
    }
}

/// Mean luminance of a frame; zero for an empty frame.
pub fn mean_luminance(frame: &Frame) -> f64 {
    let plane = luminance(frame);
    if plane.is_empty() {
        return 0.0;
    }
    let sum: u64 = plane.iter().map(|&v| u64::from(v)).sum();
    sum as f64 / plane.len() as f64
}
