//! Cooperative cancellation for the capture thread.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A resettable stop flag that sleeping waiters observe immediately.
#[derive(Debug, Default)]
pub struct StopSignal {
    raised: Mutex<bool>,
    changed: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a stop and wakes any waiter.
    pub fn raise(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    /// Re-arms the signal before spawning a new worker.
    pub fn clear(&self) {
        *self.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for up to `timeout`, returning early (with `true`) if the
    /// signal is raised.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        if timeout.is_zero() {
            return *guard;
        }
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_when_not_raised() {
        let signal = StopSignal::new();
        assert!(!signal.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_raise_wakes_waiter() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let started = Instant::now();
                let raised = signal.wait(Duration::from_secs(10));
                (raised, started.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.raise();
        let (raised, waited) = waiter.join().unwrap();
        assert!(raised);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_clear_rearms() {
        let signal = StopSignal::new();
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.wait(Duration::ZERO));
        signal.clear();
        assert!(!signal.is_raised());
    }
}
