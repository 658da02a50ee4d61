//! V4L2 live camera via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::stream::{StreamConstraints, StreamProvider, VideoSource};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("stream ended before a frame arrived")]
    StreamEnded,
    #[error("image load failed: {0}")]
    ImageLoad(String),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    let msg = e.to_string();
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied(format!("{device_path}: {msg}"))
    } else if msg.contains("busy") || msg.contains("EBUSY") {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{device_path}: {msg}"))
    }
}

/// Opens V4L2 devices as live video sources.
#[derive(Debug, Clone)]
pub struct V4l2Provider {
    device_path: PathBuf,
}

impl V4l2Provider {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    /// Open the device and negotiate a format at the requested size.
    fn negotiate(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<(Device, u32, u32, PixelFormat), CameraError> {
        let device_path = self.device_path.display().to_string();
        if !Path::new(&self.device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&self.device_path).map_err(|e| open_error(&device_path, e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );
        let flags = caps.capabilities;
        if !flags.contains(v4l::capability::Flags::VIDEO_CAPTURE)
            || !flags.contains(v4l::capability::Flags::STREAMING)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        // Prefer YUYV, then MJPG; accept whatever supported format the driver settles on.
        let mut last = None;
        for fourcc in [b"YUYV", b"MJPG"] {
            fmt.fourcc = FourCC::new(fourcc);
            fmt.width = constraints.width;
            fmt.height = constraints.height;
            let negotiated = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if let Some(pixel_format) = PixelFormat::from_fourcc(negotiated.fourcc) {
                tracing::info!(
                    width = negotiated.width,
                    height = negotiated.height,
                    fourcc = ?negotiated.fourcc,
                    "negotiated format"
                );
                return Ok((device, negotiated.width, negotiated.height, pixel_format));
            }
            last = Some(negotiated.fourcc);
        }

        Err(CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format: {last:?} (need YUYV, MJPG, or GREY)"
        )))
    }
}

impl StreamProvider for V4l2Provider {
    type Source = LiveCamera;

    async fn request_stream(&mut self, constraints: &StreamConstraints) -> Result<LiveCamera, CameraError> {
        let (device, width, height, pixel_format) = self.negotiate(constraints)?;
        LiveCamera::spawn(device, width, height, pixel_format)
    }
}

/// A streaming camera. A capture thread publishes the newest frame.
pub struct LiveCamera {
    frames: watch::Receiver<Option<Arc<Frame>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl LiveCamera {
    fn spawn(device: Device, width: u32, height: u32, pixel_format: PixelFormat) -> Result<Self, CameraError> {
        let (tx, rx) = watch::channel(None);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name("meshcam-capture".into())
            .spawn(move || capture_loop(device, width, height, pixel_format, tx, thread_stop))
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        Ok(Self {
            frames: rx,
            stop,
            worker: Some(worker),
            width,
            height,
            pixel_format,
        })
    }
}

/// Upper bound on one blocking dequeue, so a stalled device still sees `stop`.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// A dequeue that timed out or was interrupted leaves the stream usable.
fn dequeue_should_retry(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

fn capture_loop(
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    tx: watch::Sender<Option<Arc<Frame>>>,
    stop: Arc<AtomicBool>,
) {
    let mut stream = match MmapStream::with_buffers(&device, BufType::VideoCapture, 4) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to create mmap stream");
            return;
        }
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);
    let started = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if dequeue_should_retry(&e) => {
                tracing::trace!(error = %e, "no buffer within dequeue timeout");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to dequeue buffer");
                return;
            }
        };

        let converted = match pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height).map(|d| (d, width, height)),
            PixelFormat::Grey => frame::grey_to_rgb(buf, width, height).map(|d| (d, width, height)),
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf),
        };
        let (data, width, height) = match converted {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(seq = meta.sequence, error = %e, "dropping undecodable frame");
                continue;
            }
        };

        let frame = Frame {
            data,
            width,
            height,
            presentation_time: started.elapsed().as_secs_f64(),
            sequence: meta.sequence,
        };
        if tx.borrow().is_none() {
            tracing::debug!(
                seq = frame.sequence,
                brightness = frame.avg_brightness(),
                "first frame captured"
            );
        }
        if tx.send(Some(Arc::new(frame))).is_err() {
            return;
        }
    }
    tracing::debug!("capture thread stopped");
}

impl VideoSource for LiveCamera {
    fn current_frame(&self) -> Option<Arc<Frame>> {
        if self.worker.is_none() {
            return None;
        }
        self.frames.borrow().clone()
    }

    async fn first_frame(&mut self) -> Result<(), CameraError> {
        self.frames
            .wait_for(|f| f.is_some())
            .await
            .map(|_| ())
            .map_err(|_| CameraError::StreamEnded)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for LiveCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}
