//! meshcam-hw: Camera streams and frame conversion.
//!
//! Provides V4L2-based live capture behind a small stream-provider
//! abstraction, plus a still-image source for offline runs.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{list_devices, CameraError, DeviceInfo, LiveCamera, PixelFormat, V4l2Provider};
pub use frame::Frame;
pub use stream::{StillImageProvider, StillSource, StreamConstraints, StreamProvider, VideoSource};
