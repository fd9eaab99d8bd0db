//! Pre-roll frame storage.
//!
//! Keeps the most recent frames in a fixed-capacity FIFO so a recording
//! can start with the context that preceded the triggering event.

mod ring;

pub use ring::{capacity_for, BufferStats, BufferedFrame, RingBuffer};
