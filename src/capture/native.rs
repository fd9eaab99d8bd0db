//! Native camera backend built on `nokhwa`.
//!
//! nokhwa camera handles are not `Send`, so the handle lives on a dedicated
//! device thread and every call is forwarded over a channel. The thread is
//! created on `configure` and torn down on the next `configure` or `close`.

use super::{CameraConfig, CameraDevice, CameraError, Frame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Start(Sender<Result<(), CameraError>>),
    Stop(Sender<Result<(), CameraError>>),
    Capture(Sender<Result<Frame, CameraError>>),
    Shutdown,
}

struct DeviceThread {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

/// Camera backed by the platform's native capture API.
pub struct NokhwaCamera {
    device: Option<DeviceThread>,
    streaming: bool,
}

impl NokhwaCamera {
    pub fn new() -> Self {
        Self {
            device: None,
            streaming: false,
        }
    }

    fn request<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, CameraError>>) -> Command,
    ) -> Result<T, CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::NotInitialized)?;
        let (reply, response) = mpsc::channel();
        device
            .commands
            .send(make(reply))
            .map_err(|_| CameraError::CaptureFailed("device thread exited".to_string()))?;
        response
            .recv()
            .map_err(|_| CameraError::CaptureFailed("device thread exited".to_string()))?
    }

    fn shutdown_thread(&mut self) {
        if let Some(device) = self.device.take() {
            let _ = device.commands.send(Command::Shutdown);
            if device.handle.join().is_err() {
                warn!("camera device thread panicked");
            }
        }
        self.streaming = false;
    }
}

impl Default for NokhwaCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

fn open_camera(config: &CameraConfig) -> Result<nokhwa::Camera, CameraError> {
    let format = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
    let mut camera = nokhwa::Camera::new(CameraIndex::Index(config.device_id), requested)
        .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

    let controls = config.controls();
    let settings = [
        (
            KnownCameraControl::Exposure,
            ControlValueSetter::Integer(controls.exposure_us as i64),
        ),
        (
            KnownCameraControl::Gain,
            ControlValueSetter::Integer(controls.analogue_gain.round() as i64),
        ),
        (
            KnownCameraControl::Brightness,
            ControlValueSetter::Integer(controls.brightness.round() as i64),
        ),
        (
            KnownCameraControl::Contrast,
            ControlValueSetter::Integer(controls.contrast.round() as i64),
        ),
        (
            KnownCameraControl::Saturation,
            ControlValueSetter::Integer(controls.saturation.round() as i64),
        ),
        (
            KnownCameraControl::Sharpness,
            ControlValueSetter::Integer(controls.sharpness.round() as i64),
        ),
    ];
    for (control, value) in settings {
        // Not every UVC device exposes every control.
        if let Err(e) = camera.set_camera_control(control, value) {
            debug!(?control, error = %e, "camera control not applied");
        }
    }
    Ok(camera)
}

fn to_frame(
    camera: &mut nokhwa::Camera,
    grayscale: bool,
    sequence: u64,
) -> Result<Frame, CameraError> {
    let buffer = camera
        .frame()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    let image = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    let (width, height) = image.dimensions();
    let rgb = image.into_raw();
    if grayscale {
        let luma = crate::detection::rgb_to_luminance(&rgb);
        Ok(Frame::new(luma, width, height, sequence))
    } else {
        Ok(Frame::rgb(rgb, width, height, sequence))
    }
}

fn run_device(mut camera: nokhwa::Camera, grayscale: bool, commands: Receiver<Command>) {
    let mut sequence = 0u64;
    while let Ok(command) = commands.recv() {
        match command {
            Command::Start(reply) => {
                let result = camera
                    .open_stream()
                    .map_err(|e| CameraError::OpenFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let result = camera
                    .stop_stream()
                    .map_err(|e| CameraError::CaptureFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Capture(reply) => {
                sequence += 1;
                let _ = reply.send(to_frame(&mut camera, grayscale, sequence));
            }
            Command::Shutdown => break,
        }
    }
    let _ = camera.stop_stream();
}

impl CameraDevice for NokhwaCamera {
    fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.shutdown_thread();

        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_config = config.clone();
        let handle = std::thread::Builder::new()
            .name("camwatch-device".to_string())
            .spawn(move || match open_camera(&thread_config) {
                Ok(camera) => {
                    let _ = ready_tx.send(Ok(()));
                    run_device(camera, thread_config.grayscale, inbox);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| CameraError::OpenFailed("device thread exited".to_string()))?;
        match ready {
            Ok(()) => {
                self.device = Some(DeviceThread { commands, handle });
                info!(device = config.device_id, width = config.width, height = config.height, fps = config.fps, "camera configured");
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.request(Command::Start)?;
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.request(Command::Stop)
    }

    fn close(&mut self) {
        self.shutdown_thread();
        info!("camera closed");
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.streaming {
            return Err(CameraError::NotStreaming);
        }
        self.request(Command::Capture)
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}
