//! camwatch CLI
//!
//! Runs the capture pipeline until Ctrl-C or for a fixed duration, with the
//! synthetic camera unless built with the `camera` feature.

use camwatch::{
    capture::CameraDevice,
    config::AppConfig,
    control::{ControlPlane, EventLog},
    controller::Controller,
    notify::VcgencmdDisplay,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Interval between status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration: Option<u64>,
    /// Start a recording as soon as capture is running.
    #[arg(long)]
    record: bool,
    /// Begin that recording with the buffered pre-roll.
    #[arg(long, requires = "record")]
    preroll: bool,
    /// Make every Nth synthetic frame a flash (mock camera only).
    #[arg(long, default_value_t = 0)]
    flash_every: u64,
}

#[cfg(feature = "camera")]
fn open_device(_args: &Args) -> Box<dyn CameraDevice> {
    info!("Using native camera");
    Box::new(camwatch::capture::NokhwaCamera::new())
}

#[cfg(not(feature = "camera"))]
fn open_device(args: &Args) -> Box<dyn CameraDevice> {
    info!("Using synthetic camera (build with --features camera for hardware)");
    let camera = camwatch::capture::MockCamera::new().with_base_level(40);
    if args.flash_every > 0 {
        Box::new(camera.with_flash_every(args.flash_every))
    } else {
        Box::new(camera)
    }
}

#[cfg(feature = "metrics")]
struct MetricsHandle {
    shutdown: tokio::sync::oneshot::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

#[cfg(feature = "metrics")]
fn spawn_metrics(plane: &Arc<ControlPlane>, port: u16) -> Option<MetricsHandle> {
    use camwatch::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig, MetricsSnapshot};

    if port == 0 {
        return None;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            return None;
        }
    };
    let source = Arc::clone(plane);
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry, move || {
        MetricsSnapshot::from_controller(source.controller())
    });
    let (shutdown, stopped) = tokio::sync::oneshot::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("camwatch-metrics".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Failed to start metrics runtime");
                    return;
                }
            };
            let result = runtime.block_on(server.run(async {
                let _ = stopped.await;
            }));
            if let Err(e) = result {
                warn!(error = %e, "Metrics server exited");
            }
        });
    match thread {
        Ok(thread) => Some(MetricsHandle { shutdown, thread }),
        Err(e) => {
            warn!(error = %e, "Failed to spawn metrics thread");
            None
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("camwatch v{}", camwatch::VERSION);

    let config = match &args.config {
        Some(path) => match AppConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    let controller = match Controller::from_config(open_device(&args), &config) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let events = EventLog::from_config(&config.events);
    if let Some(path) = events.file() {
        info!(path = %path.display(), "Appending events to log file");
    }
    let plane = Arc::new(ControlPlane::with_parts(
        controller,
        Arc::new(events),
        Box::new(VcgencmdDisplay::new()),
    ));

    // `keepalive` holds the channel open if the handler cannot be installed.
    let (keepalive, rx) = mpsc::channel();
    let tx = keepalive.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    if let Err(e) = plane.start() {
        error!(error = %e, "Failed to start capture");
        std::process::exit(1);
    }
    info!(
        width = config.camera.width,
        height = config.camera.height,
        fps = config.camera.fps,
        buffer_secs = config.buffer.length_secs,
        "Capture running"
    );

    #[cfg(feature = "metrics")]
    let metrics = spawn_metrics(&plane, config.metrics.port);

    if args.record {
        if args.preroll {
            // Give the buffer a moment to fill before flushing it.
            std::thread::sleep(Duration::from_secs(1));
        }
        match plane.start_recording(args.preroll) {
            Ok(Some(path)) => info!(path = %path.display(), "Recording"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to start recording"),
        }
    }

    let deadline = args.duration.map(|s| Instant::now() + Duration::from_secs(s));
    let mut next_status = Instant::now() + STATUS_INTERVAL;
    loop {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            info!("Run duration elapsed");
            break;
        }
        let wake = deadline.map_or(next_status, |d| d.min(next_status));
        match rx.recv_timeout(wake.saturating_duration_since(now)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("Shutdown requested");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        if Instant::now() >= next_status {
            let view = plane.get_config();
            info!(
                frames = view.stats.frames_captured,
                failures = view.stats.capture_failures,
                flashes = view.stats.flash_triggers,
                lasers = view.stats.laser_triggers,
                buffered = view.buffer.frames,
                recording = view.recording.is_some(),
                "Status"
            );
            next_status += STATUS_INTERVAL;
        }
    }

    if let Err(e) = plane.shutdown() {
        warn!(error = %e, "Shutdown reported an error");
    }

    #[cfg(feature = "metrics")]
    if let Some(metrics) = metrics {
        let _ = metrics.shutdown.send(());
        let _ = metrics.thread.join();
    }

    let stats = plane.controller().stats();
    info!(
        frames = stats.frames_captured,
        flashes = stats.flash_triggers,
        lasers = stats.laser_triggers,
        "Done"
    );
}
