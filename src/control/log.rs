//! Bounded rolling log of recent events, optionally mirrored to a file.

use crate::config::EventsConfig;
use crate::controller::{Event, TriggerObserver};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of events kept by [`EventLog::default`].
pub const DEFAULT_EVENT_LOG_LEN: usize = 10;

/// Keeps the most recent events, oldest evicted first.
///
/// Registered as the controller's observer, so `record` runs on the capture
/// thread and only takes a short lock. With a log file attached, every event
/// is also appended there as `<ISO timestamp> - <event>`, surviving restarts.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
    file: Option<PathBuf>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            file: None,
        }
    }

    pub fn from_config(config: &EventsConfig) -> Self {
        let log = Self::new(config.history);
        match &config.log_file {
            Some(path) => log.with_file(path),
            None => log,
        }
    }

    /// Also appends every event to `path`, creating it on first use.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// The attached log file, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event, evicting the oldest when full.
    pub fn record(&self, event: Event) {
        tracing::info!(event = %event, "Event");
        let mut events = self.lock();
        // Written under the lock so file lines keep the in-memory order.
        if let Some(path) = &self.file {
            if let Err(e) = append_line(path, &event) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write event log");
            }
        }
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Recent events, oldest first.
    pub fn recent(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn append_line(path: &Path, event: &Event) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} - {}",
        event.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
        event.kind
    )
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_LEN)
    }
}

impl TriggerObserver for EventLog {
    fn on_event(&self, event: &Event) {
        self.record(event.clone());
    }
}
