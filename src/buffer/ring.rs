//! Fixed-capacity ring buffer of recent frames.

use crate::capture::Frame;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A frame together with its wall-clock acquisition time.
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub frame: Frame,
    pub captured_at: DateTime<Local>,
}

/// Point-in-time view of the buffer for the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferStats {
    /// Frames currently held.
    pub frames: usize,
    /// Maximum frames held.
    pub capacity: usize,
    /// Configured history length in seconds.
    pub seconds: f64,
    /// Frame rate the capacity was derived from.
    pub fps: f64,
    /// Approximate pixel memory held, in bytes.
    pub memory_bytes: usize,
}

/// Number of frames held for `seconds` of history at `fps`.
///
/// Non-finite or negative inputs yield zero, which disables pre-roll.
pub fn capacity_for(seconds: f64, fps: f64) -> usize {
    let frames = (seconds * fps).floor();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

struct RingState {
    frames: VecDeque<BufferedFrame>,
    capacity: usize,
    seconds: f64,
    fps: f64,
}

impl RingState {
    fn new(seconds: f64, fps: f64) -> Self {
        let capacity = capacity_for(seconds, fps);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            seconds,
            fps,
        }
    }

    fn memory_bytes(&self) -> usize {
        self.frames
            .front()
            .map(|f| f.frame.byte_len() * self.frames.len())
            .unwrap_or(0)
    }
}

/// Fixed-capacity FIFO of recent frames.
///
/// All mutation and snapshots go through one mutex scoped to the buffer.
/// Callers get copies out and never hold the lock while doing I/O.
pub struct RingBuffer {
    state: Mutex<RingState>,
}

impl RingBuffer {
    /// Creates a buffer holding `seconds` of history at `fps`.
    pub fn new(seconds: f64, fps: f64) -> Self {
        Self {
            state: Mutex::new(RingState::new(seconds, fps)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a frame, evicting the oldest one when full.
    pub fn append(&self, frame: Frame, captured_at: DateTime<Local>) {
        let mut state = self.lock();
        if state.capacity == 0 {
            return;
        }
        while state.frames.len() >= state.capacity {
            state.frames.pop_front();
        }
        state.frames.push_back(BufferedFrame { frame, captured_at });
    }

    /// Copies the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<BufferedFrame> {
        self.lock().frames.iter().cloned().collect()
    }

    /// Recomputes capacity from new `fps` and/or `seconds`.
    ///
    /// Storage is rebuilt rather than resized in place: shrinking keeps the
    /// most recent frames, growing keeps everything. Returns the new capacity.
    pub fn update_capacity(&self, fps: Option<f64>, seconds: Option<f64>) -> usize {
        let mut state = self.lock();
        let fps = fps.unwrap_or(state.fps);
        let seconds = seconds.unwrap_or(state.seconds);

        let mut next = RingState::new(seconds, fps);
        let keep = state.frames.len().min(next.capacity);
        let skip = state.frames.len() - keep;
        next.frames.extend(state.frames.drain(..).skip(skip));

        if next.capacity != state.capacity {
            tracing::debug!(
                old_capacity = state.capacity,
                new_capacity = next.capacity,
                retained = keep,
                "Ring buffer resized"
            );
        }
        *state = next;
        state.capacity
    }

    /// Approximate pixel memory held: bytes per frame times frame count.
    pub fn estimate_memory_usage(&self) -> usize {
        self.lock().memory_bytes()
    }

    /// Returns the number of buffered frames.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of frames held.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Drops all buffered frames, keeping the capacity.
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    /// Returns a consistent view of length, capacity and memory.
    pub fn stats(&self) -> BufferStats {
        let state = self.lock();
        BufferStats {
            frames: state.frames.len(),
            capacity: state.capacity,
            seconds: state.seconds,
            fps: state.fps,
            memory_bytes: state.memory_bytes(),
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("RingBuffer")
            .field("frames", &stats.frames)
            .field("capacity", &stats.capacity)
            .finish()
    }
}
