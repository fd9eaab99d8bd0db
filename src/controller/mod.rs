//! Capture loop ownership, lifecycle and reconfiguration.
//!
//! The [`Controller`] owns the camera device, the ring buffer, the detectors
//! and the recording session. Exactly one capture thread at a time drives
//! them. Everything else goes through the controller's methods, which
//! synchronize on three independent locks:
//!
//! - the lifecycle lock serializes `start`, `stop` and `reconfigure`, and the
//!   previous capture thread is always joined before a new one is spawned;
//! - the data locks (last-frame slot, ring buffer) are held only for copies;
//! - the recording lock guards the session, so a slow pre-roll flush does not
//!   block reconfiguration or last-frame reads.

mod events;
mod signal;
mod stats;
mod worker;

pub use events::{Event, EventKind, TriggerObserver};
pub use signal::StopSignal;
pub use stats::{CaptureStats, CaptureStatsSnapshot};
pub use worker::CAPTURE_RETRY_BACKOFF;

use crate::buffer::{BufferStats, RingBuffer};
use crate::capture::{CameraConfig, CameraConfigPatch, CameraDevice, CameraError, Frame};
use crate::config::{validate_buffer_length, AppConfig, ConfigError, RecordingConfig};
use crate::detection::{DetectionConfig, DetectionConfigPatch, Detectors, TriggerKind};
use crate::notify::{AlertSink, SoundPlayer};
use crate::recording::{
    default_writer_factory, export_clip, export_snapshot, RecordingError, RecordingSession,
    RecordingSummary, VideoSpec, WriterFactory,
};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors returned by lifecycle and configuration operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
    #[error("capture thread panicked")]
    WorkerPanicked,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// State reachable from both the capture thread and callers.
pub(crate) struct Shared {
    device: Mutex<Box<dyn CameraDevice>>,
    camera: RwLock<CameraConfig>,
    detection: RwLock<DetectionConfig>,
    detectors: Mutex<Detectors>,
    last_frame: Mutex<Option<Frame>>,
    ring: RingBuffer,
    recording: Mutex<RecordingSession>,
    writer_factory: Arc<dyn WriterFactory>,
    captures_dir: PathBuf,
    observer: RwLock<Option<Arc<dyn TriggerObserver>>>,
    alerts: Arc<dyn AlertSink>,
    stop: StopSignal,
    stats: CaptureStats,
}

impl Shared {
    fn lock_device(&self) -> MutexGuard<'_, Box<dyn CameraDevice>> {
        lock(&self.device)
    }

    /// Per-frame work on the capture thread: publish, buffer, record, detect.
    fn process_frame(&self, frame: Frame) {
        let sequence = self.stats.record_frame();
        let frame = frame.restamp(sequence);
        let captured_at = Local::now();

        *lock(&self.last_frame) = Some(frame.clone());
        {
            // Buffered and recorded under the recording lock, so a pre-roll
            // snapshot never also receives this frame as a live one.
            let mut recording = lock(&self.recording);
            self.ring.append(frame.clone(), captured_at);
            // The session logs its own end; the summary is not needed here.
            let _ = recording.append(&frame);
        }

        let triggers = lock(&self.detectors).evaluate(&frame);
        for kind in triggers {
            self.handle_trigger(kind, captured_at);
        }
    }

    fn handle_trigger(&self, kind: TriggerKind, at: DateTime<Local>) {
        self.stats.record_trigger(kind);
        let detection = read(&self.detection);
        info!(%kind, "Detector triggered");

        if detection.autosave(kind) {
            if let Err(e) = self.save_buffer() {
                warn!(%kind, error = %e, "Autosave failed");
            }
        }
        if detection.sound(kind) {
            self.alerts.alert(kind);
        }
        if detection.record_on_trigger {
            if let Err(e) = self.start_recording(true) {
                warn!(%kind, error = %e, "Triggered recording failed to start");
            }
        }
        self.emit(&Event::at(kind.into(), at));
    }

    fn emit(&self, event: &Event) {
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.on_event(event);
        }
    }

    fn save_buffer(&self) -> Result<Option<PathBuf>, RecordingError> {
        let frames = self.ring.snapshot();
        let fps = read(&self.camera).fps;
        export_clip(
            &self.captures_dir,
            "buffer",
            &frames,
            fps,
            self.writer_factory.as_ref(),
        )
    }

    fn start_recording(&self, with_preroll: bool) -> Result<Option<PathBuf>, RecordingError> {
        let mut session = lock(&self.recording);
        if session.is_active() {
            return Ok(None);
        }

        let camera = read(&self.camera);
        let preroll = with_preroll.then(|| self.ring.snapshot());
        // Geometry follows what the device actually delivers.
        let reference = preroll
            .as_ref()
            .and_then(|frames| frames.first().map(|b| b.frame.clone()))
            .or_else(|| lock(&self.last_frame).clone());
        let spec = match reference {
            Some(frame) => VideoSpec::for_frame(&frame, camera.fps),
            None => VideoSpec {
                width: camera.width,
                height: camera.height,
                fps: camera.fps,
                channels: camera.channels(),
            },
        };
        session.start(spec, preroll)
    }
}

#[derive(Default)]
struct Lifecycle {
    worker: Option<JoinHandle<()>>,
}

/// Owns the capture pipeline. See the module docs for the locking model.
///
/// Dropping the controller stops the capture thread and closes the device.
pub struct Controller {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

/// Assembles a [`Controller`].
///
/// ```
/// use camwatch::capture::{CameraConfig, MockCamera};
/// use camwatch::controller::Controller;
/// use camwatch::notify::SilentAlerts;
/// use camwatch::recording::Y4mWriterFactory;
/// use std::sync::Arc;
///
/// let controller = Controller::builder(Box::new(MockCamera::new()))
///     .camera(CameraConfig { fps: 15, ..Default::default() })
///     .buffer_seconds(2.0)
///     .alerts(Arc::new(SilentAlerts))
///     .writer_factory(Arc::new(Y4mWriterFactory))
///     .build()
///     .unwrap();
/// assert_eq!(controller.camera_config().fps, 15);
/// assert_eq!(controller.buffer_stats().capacity, 30);
/// ```
pub struct ControllerBuilder {
    device: Box<dyn CameraDevice>,
    camera: CameraConfig,
    detection: DetectionConfig,
    buffer_seconds: f64,
    recording: RecordingConfig,
    alerts: Option<Arc<dyn AlertSink>>,
    writer_factory: Arc<dyn WriterFactory>,
}

impl ControllerBuilder {
    /// Initial camera settings, applied to the device on `start`.
    pub fn camera(mut self, config: CameraConfig) -> Self {
        self.camera = config;
        self
    }

    /// Detector thresholds and trigger actions.
    pub fn detection(mut self, config: DetectionConfig) -> Self {
        self.detection = config;
        self
    }

    /// Pre-roll length in seconds.
    pub fn buffer_seconds(mut self, seconds: f64) -> Self {
        self.buffer_seconds = seconds;
        self
    }

    /// Output directories, recording length limit and alert sounds.
    pub fn recording(mut self, config: RecordingConfig) -> Self {
        self.recording = config;
        self
    }

    /// Replaces the default sound player.
    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Replaces the video writer used for recordings and clips.
    pub fn writer_factory(mut self, factory: Arc<dyn WriterFactory>) -> Self {
        self.writer_factory = factory;
        self
    }

    /// Validates the configuration and builds a stopped controller.
    pub fn build(self) -> Result<Controller, ControllerError> {
        self.camera.validate()?;
        self.detection.validate()?;
        validate_buffer_length(self.buffer_seconds)?;

        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(SoundPlayer::new(&self.recording.sounds_directory)));
        let session = RecordingSession::new(
            &self.recording.directory,
            Arc::clone(&self.writer_factory),
            self.recording.max_seconds,
        );

        let shared = Shared {
            device: Mutex::new(self.device),
            ring: RingBuffer::new(self.buffer_seconds, f64::from(self.camera.fps)),
            detectors: Mutex::new(Detectors::new(&self.detection)),
            camera: RwLock::new(self.camera),
            detection: RwLock::new(self.detection),
            last_frame: Mutex::new(None),
            recording: Mutex::new(session),
            writer_factory: self.writer_factory,
            captures_dir: self.recording.captures_directory,
            observer: RwLock::new(None),
            alerts,
            stop: StopSignal::new(),
            stats: CaptureStats::default(),
        };
        Ok(Controller {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }
}

impl Controller {
    /// Starts assembling a controller around `device` with default settings.
    pub fn builder(device: Box<dyn CameraDevice>) -> ControllerBuilder {
        ControllerBuilder {
            device,
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            buffer_seconds: crate::config::BufferConfig::default().length_secs,
            recording: RecordingConfig::default(),
            alerts: None,
            writer_factory: default_writer_factory(),
        }
    }

    /// Builds a controller from a loaded configuration file.
    pub fn from_config(
        device: Box<dyn CameraDevice>,
        config: &AppConfig,
    ) -> Result<Self, ControllerError> {
        Self::builder(device)
            .camera(config.camera.clone())
            .detection(config.detection.clone())
            .buffer_seconds(config.buffer.length_secs)
            .recording(config.recording.clone())
            .build()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    /// Configures and starts the device, then spawns the capture thread.
    ///
    /// No-op if already running.
    pub fn start(&self) -> Result<(), ControllerError> {
        let mut lifecycle = self.lock_lifecycle();
        self.reap_exited(&mut lifecycle);
        if lifecycle.worker.is_some() {
            return Ok(());
        }
        let config = read(&self.shared.camera);
        self.bring_up(&mut lifecycle, config)
    }

    /// Stops the capture thread and the device. Idempotent.
    pub fn stop(&self) -> Result<(), ControllerError> {
        let mut lifecycle = self.lock_lifecycle();
        self.halt(&mut lifecycle)
    }

    /// Stops everything and releases the device.
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        let mut lifecycle = self.lock_lifecycle();
        let halted = self.halt(&mut lifecycle);
        lock(&self.shared.recording).stop();
        self.shared.lock_device().close();
        halted
    }

    /// Applies a camera patch.
    ///
    /// Returns `Ok(false)` without touching the device when the patch changes
    /// nothing. While stopped, the patch is stored and applied on the next
    /// `start`. While running, the capture thread is joined, the device is
    /// stopped, reconfigured and restarted, and a new thread is spawned.
    ///
    /// If the device rejects the new settings the controller is left
    /// stopped, the previous settings stay current, and the error is
    /// returned. Nothing is re-applied automatically; `start` uses the
    /// previous settings.
    pub fn reconfigure(&self, patch: &CameraConfigPatch) -> Result<bool, ControllerError> {
        let mut lifecycle = self.lock_lifecycle();
        let current = read(&self.shared.camera);
        if !current.differs_from_patch(patch) {
            return Ok(false);
        }
        let next = current.merged(patch);
        next.validate()?;

        self.reap_exited(&mut lifecycle);
        if lifecycle.worker.is_none() {
            self.commit_camera(&current, next);
            return Ok(true);
        }

        self.halt(&mut lifecycle)?;
        if let Err(e) = self.bring_up(&mut lifecycle, next) {
            error!(error = %e, "Reconfiguration rejected, capture stopped");
            return Err(e);
        }
        info!("Camera reconfigured");
        Ok(true)
    }

    fn bring_up(
        &self,
        lifecycle: &mut Lifecycle,
        config: CameraConfig,
    ) -> Result<(), ControllerError> {
        {
            let mut device = self.shared.lock_device();
            device.configure(&config)?;
            if let Err(e) = device.start() {
                let _ = device.stop();
                return Err(e.into());
            }
        }

        let previous = read(&self.shared.camera);
        let fps = config.fps;
        self.commit_camera(&previous, config);

        self.shared.stop.clear();
        match worker::spawn(Arc::clone(&self.shared), fps) {
            Ok(handle) => {
                lifecycle.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                let _ = self.shared.lock_device().stop();
                Err(ControllerError::Spawn(e))
            }
        }
    }

    /// Stores `next` as the current camera config and adapts the buffer.
    fn commit_camera(&self, previous: &CameraConfig, next: CameraConfig) {
        if previous.resolution() != next.resolution() || previous.channels() != next.channels() {
            // Pre-roll frames of another geometry cannot share a recording.
            self.shared.ring.clear();
        }
        if previous.fps != next.fps {
            self.shared
                .ring
                .update_capacity(Some(f64::from(next.fps)), None);
        }
        write(&self.shared.camera, next);
    }

    /// Joins a capture thread that ended without being asked to.
    fn reap_exited(&self, lifecycle: &mut Lifecycle) {
        let exited = lifecycle
            .worker
            .as_ref()
            .is_some_and(|worker| worker.is_finished());
        if exited {
            if let Err(e) = self.halt(lifecycle) {
                warn!(error = %e, "Capture thread had exited");
            }
        }
    }

    fn halt(&self, lifecycle: &mut Lifecycle) -> Result<(), ControllerError> {
        let Some(handle) = lifecycle.worker.take() else {
            return Ok(());
        };
        self.shared.stop.raise();
        let joined = handle.join();
        let stopped = self.shared.lock_device().stop();

        if joined.is_err() {
            return Err(ControllerError::WorkerPanicked);
        }
        stopped?;
        Ok(())
    }

    /// Returns true while a capture thread is running.
    pub fn is_running(&self) -> bool {
        self.lock_lifecycle()
            .worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Registers the single trigger observer, replacing any previous one.
    pub fn set_trigger_observer(&self, observer: Arc<dyn TriggerObserver>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Removes the trigger observer.
    pub fn clear_trigger_observer(&self) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// A copy of the most recent frame, if any was captured.
    pub fn last_frame(&self) -> Option<Frame> {
        lock(&self.shared.last_frame).clone()
    }

    /// The camera settings currently in effect.
    pub fn camera_config(&self) -> CameraConfig {
        read(&self.shared.camera)
    }

    /// The detection settings currently in effect.
    pub fn detection_config(&self) -> DetectionConfig {
        read(&self.shared.detection)
    }

    /// Applies detection settings immediately; detector history is kept.
    pub fn update_detection(
        &self,
        patch: &DetectionConfigPatch,
    ) -> Result<DetectionConfig, ControllerError> {
        let next = read(&self.shared.detection).merged(patch);
        next.validate()?;
        lock(&self.shared.detectors).apply(&next);
        write(&self.shared.detection, next.clone());
        Ok(next)
    }

    /// Changes the pre-roll length. Returns the new capacity in frames.
    pub fn update_buffer(&self, seconds: f64) -> Result<usize, ControllerError> {
        validate_buffer_length(seconds)?;
        Ok(self.shared.ring.update_capacity(None, Some(seconds)))
    }

    /// Pre-roll fill level and memory estimate.
    pub fn buffer_stats(&self) -> BufferStats {
        self.shared.ring.stats()
    }

    /// Capture counters since the controller was built.
    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Starts a recording, optionally beginning with the buffered pre-roll.
    ///
    /// Returns `Ok(None)` if a recording is already active.
    pub fn start_recording(&self, with_preroll: bool) -> Result<Option<PathBuf>, RecordingError> {
        self.shared.start_recording(with_preroll)
    }

    /// Stops the active recording, if any.
    pub fn stop_recording(&self) -> Option<RecordingSummary> {
        lock(&self.shared.recording).stop()
    }

    /// Returns true while a recording is open.
    pub fn is_recording(&self) -> bool {
        lock(&self.shared.recording).is_active()
    }

    /// Path of the active recording.
    pub fn recording_path(&self) -> Option<PathBuf> {
        lock(&self.shared.recording).path().map(PathBuf::from)
    }

    /// Writes the ring buffer to a new clip, independent of any recording.
    ///
    /// Returns `Ok(None)` when the buffer is empty.
    pub fn save_buffer_now(&self) -> Result<Option<PathBuf>, RecordingError> {
        self.shared.save_buffer()
    }

    /// Saves the most recent frame as an image.
    ///
    /// Returns `Ok(None)` when nothing has been captured yet.
    pub fn save_snapshot(&self) -> Result<Option<PathBuf>, RecordingError> {
        match self.last_frame() {
            Some(frame) => export_snapshot(&self.shared.captures_dir, &frame).map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Controller shutdown reported an error");
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("running", &self.is_running())
            .field("camera", &self.camera_config())
            .field("buffer", &self.buffer_stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceCall, MockCamera, MockCameraHandle};
    use crate::notify::SilentAlerts;
    use crate::recording::Y4mWriterFactory;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    const W: u32 = 16;
    const H: u32 = 12;

    fn camera_config() -> CameraConfig {
        CameraConfig {
            width: W,
            height: H,
            fps: 100,
            grayscale: true,
            ..Default::default()
        }
    }

    fn quiet_detection() -> DetectionConfig {
        DetectionConfig {
            autosave_flash: false,
            autosave_laser: false,
            sound_flash: false,
            sound_laser: false,
            ..Default::default()
        }
    }

    fn controller(dir: &std::path::Path) -> (Controller, MockCameraHandle) {
        let camera = MockCamera::new().with_base_level(20);
        let handle = camera.handle();
        let controller = Controller::builder(Box::new(camera))
            .camera(camera_config())
            .detection(quiet_detection())
            .buffer_seconds(0.5)
            .recording(RecordingConfig {
                directory: dir.join("recordings"),
                captures_directory: dir.join("captures"),
                max_seconds: 0,
                sounds_directory: dir.join("sounds"),
            })
            .alerts(Arc::new(SilentAlerts))
            .writer_factory(Arc::new(Y4mWriterFactory))
            .build()
            .unwrap();
        (controller, handle)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_configures_before_starting_device() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());

        controller.start().unwrap();
        assert!(controller.is_running());
        controller.start().unwrap();

        assert_eq!(
            camera.calls(),
            vec![DeviceCall::Configure(camera_config()), DeviceCall::Start]
        );
        controller.stop().unwrap();
    }

    #[test]
    fn test_frames_reach_last_frame_and_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _camera) = controller(dir.path());
        assert!(controller.last_frame().is_none());

        controller.start().unwrap();
        assert!(wait_until(|| controller.buffer_stats().frames >= 3));
        controller.stop().unwrap();

        let frame = controller.last_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (W, H));
        assert_eq!(controller.buffer_stats().capacity, 50);
        assert!(controller.stats().frames_captured >= 3);
    }

    #[test]
    fn test_stop_is_idempotent_and_stops_device() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());

        controller.stop().unwrap();
        controller.start().unwrap();
        controller.stop().unwrap();
        controller.stop().unwrap();

        assert!(!controller.is_running());
        assert!(!camera.is_streaming());
        assert_eq!(controller.stats().active_workers, 0);
    }

    #[test]
    fn test_capture_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());
        camera.fail_next_captures(2);

        controller.start().unwrap();
        assert!(wait_until(|| controller.stats().frames_captured >= 1));
        controller.stop().unwrap();

        assert_eq!(controller.stats().capture_failures, 2);
    }

    #[test]
    fn test_reconfigure_with_equal_values_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());
        controller.start().unwrap();
        camera.clear_calls();

        let patch = CameraConfigPatch {
            fps: Some(100),
            resolution: Some((W, H)),
            ..Default::default()
        };
        assert!(!controller.reconfigure(&patch).unwrap());
        assert!(camera.calls().is_empty());
        controller.stop().unwrap();
    }

    #[test]
    fn test_reconfigure_restarts_with_new_settings() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());
        controller.start().unwrap();
        camera.clear_calls();

        let patch = CameraConfigPatch {
            fps: Some(50),
            ..Default::default()
        };
        assert!(controller.reconfigure(&patch).unwrap());
        assert!(controller.is_running());

        let expected = CameraConfig {
            fps: 50,
            ..camera_config()
        };
        assert_eq!(
            camera.calls(),
            vec![
                DeviceCall::Stop,
                DeviceCall::Configure(expected.clone()),
                DeviceCall::Start
            ]
        );
        assert_eq!(controller.camera_config(), expected);
        assert_eq!(controller.buffer_stats().capacity, 25);
        controller.stop().unwrap();
    }

    #[test]
    fn test_rejected_reconfigure_leaves_controller_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());
        controller.start().unwrap();
        camera.reject_configure(true);

        let patch = CameraConfigPatch {
            analogue_gain: Some(8.0),
            ..Default::default()
        };
        assert!(controller.reconfigure(&patch).is_err());
        assert!(!controller.is_running());
        assert!(!camera.is_streaming());
        assert_eq!(controller.camera_config(), camera_config());

        camera.reject_configure(false);
        controller.start().unwrap();
        assert!(controller.is_running());
        assert_eq!(camera.applied_config(), Some(camera_config()));
        controller.stop().unwrap();
    }

    #[test]
    fn test_reconfigure_while_stopped_defers_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());

        let patch = CameraConfigPatch {
            exposure_us: Some(2_000),
            ..Default::default()
        };
        assert!(controller.reconfigure(&patch).unwrap());
        assert!(camera.calls().is_empty());
        assert!(!controller.is_running());

        controller.start().unwrap();
        assert_eq!(camera.applied_config().unwrap().exposure_us, 2_000);
        controller.stop().unwrap();
    }

    #[test]
    fn test_flash_trigger_emits_event_and_autosaves() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, camera) = controller(dir.path());
        controller
            .update_detection(&DetectionConfigPatch {
                autosave_flash: Some(true),
                ..Default::default()
            })
            .unwrap();
        let (tx, rx) = mpsc::channel();
        controller.set_trigger_observer(Arc::new(tx));

        let pixels = (W * H) as usize;
        for _ in 0..10 {
            camera.push_luminance(vec![20; pixels]);
        }
        camera.push_luminance(vec![200; pixels]);

        controller.start().unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        controller.stop().unwrap();

        assert_eq!(event.kind, EventKind::FlashDetected);
        assert!(controller.stats().flash_triggers >= 1);
        let clips = std::fs::read_dir(dir.path().join("captures")).unwrap().count();
        assert!(clips >= 1);
    }

    #[test]
    fn test_recording_with_preroll_and_live_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _camera) = controller(dir.path());

        controller.start().unwrap();
        assert!(wait_until(|| controller.buffer_stats().frames >= 5));
        let path = controller.start_recording(true).unwrap().unwrap();
        assert!(controller.start_recording(true).unwrap().is_none());
        assert!(controller.is_recording());

        let before = controller.stats().frames_captured;
        assert!(wait_until(|| controller.stats().frames_captured >= before + 3));
        let summary = controller.stop_recording().unwrap();
        controller.stop().unwrap();

        assert_eq!(summary.path, path);
        assert!(summary.frames >= 5 + 3);
        assert!(!controller.is_recording());
        assert!(controller.stop_recording().is_none());
    }

    #[test]
    fn test_save_buffer_now_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _camera) = controller(dir.path());
        assert!(controller.save_buffer_now().unwrap().is_none());
        assert!(controller.save_snapshot().unwrap().is_none());

        controller.start().unwrap();
        assert!(wait_until(|| controller.buffer_stats().frames >= 2));
        controller.stop().unwrap();

        let clip = controller.save_buffer_now().unwrap().unwrap();
        let image = controller.save_snapshot().unwrap().unwrap();
        assert!(clip.exists());
        assert!(image.exists());
    }

    #[test]
    fn test_update_buffer_and_detection_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _camera) = controller(dir.path());

        assert_eq!(controller.update_buffer(2.0).unwrap(), 200);
        assert!(controller.update_buffer(-1.0).is_err());

        let bad = DetectionConfigPatch {
            min_blob: Some(100),
            ..Default::default()
        };
        assert!(controller.update_detection(&bad).is_err());
        assert_eq!(controller.detection_config(), quiet_detection());
    }
}
