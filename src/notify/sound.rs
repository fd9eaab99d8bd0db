//! Alert playback on detector triggers.

use crate::detection::TriggerKind;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives alert requests from the capture thread.
///
/// Called inline with capture, so implementations must return quickly.
pub trait AlertSink: Send + Sync {
    fn alert(&self, kind: TriggerKind);
}

/// Plays `<dir>/<kind>.wav` with `aplay`, without waiting for it to finish.
///
/// Each player process is reaped by a short-lived waiter thread.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    directory: PathBuf,
    program: String,
    playing: Arc<AtomicUsize>,
}

impl SoundPlayer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            program: "aplay".to_string(),
            playing: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Uses a different player binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The sound file played for `kind`.
    pub fn sound_file(&self, kind: TriggerKind) -> PathBuf {
        self.directory.join(format!("{}.wav", kind.as_str()))
    }

    /// Player processes started and not yet reaped.
    pub fn playing(&self) -> usize {
        self.playing.load(Ordering::SeqCst)
    }

    fn reap(&self, mut child: Child) {
        self.playing.fetch_add(1, Ordering::SeqCst);
        let playing = Arc::clone(&self.playing);
        let waiter = std::thread::Builder::new()
            .name("camwatch-alert".to_string())
            .spawn(move || {
                if let Err(e) = child.wait() {
                    tracing::debug!(error = %e, "Failed to wait for alert player");
                }
                playing.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(e) = waiter {
            self.playing.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(error = %e, "Failed to spawn alert waiter");
        }
    }
}

impl AlertSink for SoundPlayer {
    fn alert(&self, kind: TriggerKind) {
        let file = self.sound_file(kind);
        if !file.exists() {
            tracing::debug!(path = %file.display(), "No alert sound, skipping");
            return;
        }
        let spawned = Command::new(&self.program)
            .arg(&file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => self.reap(child),
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Failed to play alert");
            }
        }
    }
}

/// Discards alerts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAlerts;

impl AlertSink for SilentAlerts {
    fn alert(&self, _kind: TriggerKind) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_file_per_kind() {
        let player = SoundPlayer::new("sounds");
        assert_eq!(player.sound_file(TriggerKind::Flash), PathBuf::from("sounds/flash.wav"));
        assert_eq!(player.sound_file(TriggerKind::Laser), PathBuf::from("sounds/laser.wav"));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let player = SoundPlayer::new(dir.path()).with_program("/nonexistent/player");
        // Must neither panic nor block.
        player.alert(TriggerKind::Flash);
        assert_eq!(player.playing(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_finished_players_are_reaped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flash.wav"), b"").unwrap();
        let player = SoundPlayer::new(dir.path()).with_program("true");

        for _ in 0..5 {
            player.alert(TriggerKind::Flash);
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while player.playing() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(player.playing(), 0);
    }
}
