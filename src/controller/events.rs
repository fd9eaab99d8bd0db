//! Events emitted to the registered observer.

use crate::detection::TriggerKind;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::mpsc;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FlashDetected,
    LaserDetected,
    ManualSave,
    RecordingStarted,
    RecordingStopped,
    Snapshot,
}

impl From<TriggerKind> for EventKind {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Flash => EventKind::FlashDetected,
            TriggerKind::Laser => EventKind::LaserDetected,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventKind::FlashDetected => "Flash Detected",
            EventKind::LaserDetected => "Laser Detected",
            EventKind::ManualSave => "Manual Save",
            EventKind::RecordingStarted => "Recording Started",
            EventKind::RecordingStopped => "Recording Stopped",
            EventKind::Snapshot => "Snapshot",
        };
        f.write_str(label)
    }
}

/// A timestamped event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl Event {
    /// An event stamped with the current local time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
        }
    }

    /// An event that happened at `timestamp`.
    pub fn at(kind: EventKind, timestamp: DateTime<Local>) -> Self {
        Self { timestamp, kind }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.timestamp.format("%H:%M:%S"), self.kind)
    }
}

/// Receives detector triggers.
///
/// Invoked synchronously on the capture thread, so implementations must not
/// block.
pub trait TriggerObserver: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> TriggerObserver for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Forwards events into an unbounded channel. A dropped receiver is ignored.
impl TriggerObserver for mpsc::Sender<Event> {
    fn on_event(&self, event: &Event) {
        let _ = self.send(event.clone());
    }
}
