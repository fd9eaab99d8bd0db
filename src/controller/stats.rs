//! Capture counters shared between the worker and readers.

use crate::detection::TriggerKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the capture thread.
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_captured: AtomicU64,
    capture_failures: AtomicU64,
    flash_triggers: AtomicU64,
    laser_triggers: AtomicU64,
    active_workers: AtomicU64,
}

/// Plain copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStatsSnapshot {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub flash_triggers: u64,
    pub laser_triggers: u64,
    /// Capture threads currently inside their loop (0 or 1).
    pub active_workers: u64,
}

impl CaptureStats {
    /// Counts a captured frame and returns its sequence number.
    pub(crate) fn record_frame(&self) -> u64 {
        self.frames_captured.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trigger(&self, kind: TriggerKind) {
        let counter = match kind {
            TriggerKind::Flash => &self.flash_triggers,
            TriggerKind::Laser => &self.laser_triggers,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a capture thread as active until the returned guard drops,
    /// including when the thread unwinds.
    pub(crate) fn enter_worker(&self) -> ActiveWorker<'_> {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        ActiveWorker { stats: self }
    }

    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            flash_triggers: self.flash_triggers.load(Ordering::Relaxed),
            laser_triggers: self.laser_triggers.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::SeqCst),
        }
    }
}

pub(crate) struct ActiveWorker<'a> {
    stats: &'a CaptureStats,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.stats.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = CaptureStats::default();
        assert_eq!(stats.record_frame(), 1);
        assert_eq!(stats.record_frame(), 2);
        stats.record_failure();
        stats.record_trigger(TriggerKind::Laser);
        let active = stats.enter_worker();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_captured, 2);
        assert_eq!(snapshot.capture_failures, 1);
        assert_eq!(snapshot.flash_triggers, 0);
        assert_eq!(snapshot.laser_triggers, 1);
        assert_eq!(snapshot.active_workers, 1);

        drop(active);
        assert_eq!(stats.snapshot().active_workers, 0);
    }

    #[test]
    fn test_active_worker_released_on_panic() {
        let stats = CaptureStats::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _active = stats.enter_worker();
            panic!("capture thread died");
        }));
        assert!(result.is_err());
        assert_eq!(stats.snapshot().active_workers, 0);
    }
}
