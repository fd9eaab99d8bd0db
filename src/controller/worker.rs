//! The capture thread body.

use super::Shared;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause after a failed frame pull before retrying.
pub const CAPTURE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Spawns the capture thread pacing itself to `fps`.
pub(super) fn spawn(shared: Arc<Shared>, fps: u32) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("camwatch-capture".to_string())
        .spawn(move || run(&shared, fps))
}

fn run(shared: &Shared, fps: u32) {
    let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let _active = shared.stats.enter_worker();
    info!(fps, "Capture loop started");

    let mut frames = 0u64;
    while !shared.stop.is_raised() {
        let started = Instant::now();

        // The device lock is released at the end of this statement.
        let captured = shared.lock_device().capture_frame();
        let failure = match captured {
            Ok(frame) if frame.is_valid() => {
                shared.process_frame(frame);
                None
            }
            Ok(frame) => Some(format!("malformed frame {frame:?}")),
            Err(e) => Some(e.to_string()),
        };
        if let Some(error) = failure {
            shared.stats.record_failure();
            warn!(%error, "Frame capture failed, retrying");
            if shared.stop.wait(CAPTURE_RETRY_BACKOFF) {
                break;
            }
            continue;
        }
        frames += 1;

        let spent = started.elapsed();
        if spent > period {
            debug!(?spent, ?period, "Frame processing exceeded frame period");
        }
        if shared.stop.wait(period.saturating_sub(spent)) {
            break;
        }
    }

    info!(frames, "Capture loop stopped");
}
