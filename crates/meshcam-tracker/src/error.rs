use crate::config::ConfigError;
use meshcam_core::LandmarkerError;
use meshcam_hw::CameraError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("face landmarker is not ready")]
    ModelNotReady,
    #[error("camera unavailable: {0}")]
    CaptureUnavailable(#[from] CameraError),
    #[error(transparent)]
    ModelLoad(#[from] LandmarkerError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
