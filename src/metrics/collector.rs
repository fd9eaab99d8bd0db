//! Metrics collection and registry.

use crate::controller::Controller;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of pipeline state for metrics update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Frames captured since start.
    pub frames_captured: u64,
    /// Failed frame pulls since start.
    pub capture_failures: u64,
    pub flash_triggers: u64,
    pub laser_triggers: u64,
    /// Frames currently held in the pre-roll buffer.
    pub buffer_frames: usize,
    pub buffer_capacity: usize,
    /// Approximate pixel memory held by the buffer.
    pub buffer_memory_bytes: usize,
    pub recording_active: bool,
}

impl MetricsSnapshot {
    /// Reads the current state of a controller.
    pub fn from_controller(controller: &Controller) -> Self {
        let stats = controller.stats();
        let buffer = controller.buffer_stats();
        Self {
            frames_captured: stats.frames_captured,
            capture_failures: stats.capture_failures,
            flash_triggers: stats.flash_triggers,
            laser_triggers: stats.laser_triggers,
            buffer_frames: buffer.frames,
            buffer_capacity: buffer.capacity,
            buffer_memory_bytes: buffer.memory_bytes,
            recording_active: controller.is_recording(),
        }
    }
}

/// Prometheus registry for the capture pipeline.
pub struct MetricsRegistry {
    registry: Registry,

    frames_captured: IntCounter,
    capture_failures: IntCounter,
    triggers: IntCounterVec,

    buffer_frames: IntGauge,
    buffer_capacity: IntGauge,
    buffer_memory_bytes: IntGauge,
    recording_active: IntGauge,
}

/// Advances a counter to an absolute total read from elsewhere.
fn catch_up(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn gauge_value(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl MetricsRegistry {
    /// Creates a registry with every pipeline metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_captured = IntCounter::new(
            "camwatch_frames_captured_total",
            "Total frames captured",
        )?;
        let capture_failures = IntCounter::new(
            "camwatch_capture_failures_total",
            "Total failed frame captures",
        )?;
        let triggers = IntCounterVec::new(
            Opts::new("camwatch_triggers_total", "Detector triggers by kind"),
            &["kind"],
        )?;

        let buffer_frames = IntGauge::new(
            "camwatch_buffer_frames",
            "Frames currently held in the pre-roll buffer",
        )?;
        let buffer_capacity = IntGauge::new(
            "camwatch_buffer_capacity_frames",
            "Pre-roll buffer capacity in frames",
        )?;
        let buffer_memory_bytes = IntGauge::new(
            "camwatch_buffer_memory_bytes",
            "Approximate pixel memory held by the pre-roll buffer",
        )?;
        let recording_active = IntGauge::new(
            "camwatch_recording_active",
            "Whether a recording is in progress (1=recording, 0=idle)",
        )?;

        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(capture_failures.clone()))?;
        registry.register(Box::new(triggers.clone()))?;
        registry.register(Box::new(buffer_frames.clone()))?;
        registry.register(Box::new(buffer_capacity.clone()))?;
        registry.register(Box::new(buffer_memory_bytes.clone()))?;
        registry.register(Box::new(recording_active.clone()))?;

        Ok(Self {
            registry,
            frames_captured,
            capture_failures,
            triggers,
            buffer_frames,
            buffer_capacity,
            buffer_memory_bytes,
            recording_active,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        catch_up(&self.frames_captured, snapshot.frames_captured);
        catch_up(&self.capture_failures, snapshot.capture_failures);
        catch_up(
            &self.triggers.with_label_values(&["flash"]),
            snapshot.flash_triggers,
        );
        catch_up(
            &self.triggers.with_label_values(&["laser"]),
            snapshot.laser_triggers,
        );

        self.buffer_frames.set(gauge_value(snapshot.buffer_frames));
        self.buffer_capacity.set(gauge_value(snapshot.buffer_capacity));
        self.buffer_memory_bytes
            .set(gauge_value(snapshot.buffer_memory_bytes));
        self.recording_active
            .set(i64::from(snapshot.recording_active));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
