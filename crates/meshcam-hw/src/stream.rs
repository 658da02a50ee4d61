//! Video stream capability: acquisition and the live-source contract.

use crate::camera::CameraError;
use crate::frame::Frame;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// What the caller asks of a stream. Providers treat sizes as preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// A live video source. Reading it always yields its *current* frame.
pub trait VideoSource {
    /// The most recent frame, or `None` before the first one arrives.
    fn current_frame(&self) -> Option<Arc<Frame>>;

    /// Resolves once the first frame is available.
    fn first_frame(&mut self) -> impl Future<Output = Result<(), CameraError>>;

    /// Stop all tracks. After this, `current_frame` returns `None`.
    fn stop(&mut self);
}

/// Acquires video sources (the camera permission prompt, device open, ...).
pub trait StreamProvider {
    type Source: VideoSource;

    fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> impl Future<Output = Result<Self::Source, CameraError>>;
}

/// Serves a single still image as a stream whose frame never advances.
#[derive(Debug, Clone)]
pub struct StillImageProvider {
    path: PathBuf,
}

impl StillImageProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamProvider for StillImageProvider {
    type Source = StillSource;

    async fn request_stream(&mut self, _: &StreamConstraints) -> Result<StillSource, CameraError> {
        if !self.path.exists() {
            return Err(CameraError::DeviceNotFound(self.path.display().to_string()));
        }
        let image = image::open(&self.path)
            .map_err(|e| CameraError::ImageLoad(format!("{}: {e}", self.path.display())))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        tracing::info!(path = %self.path.display(), width, height, "opened still image source");

        Ok(StillSource::new(Frame {
            data: image.into_raw(),
            width,
            height,
            presentation_time: 0.0,
            sequence: 0,
        }))
    }
}

/// A source that always presents the same frame.
#[derive(Debug, Clone)]
pub struct StillSource {
    frame: Option<Arc<Frame>>,
}

impl StillSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Some(Arc::new(frame)),
        }
    }
}

impl VideoSource for StillSource {
    fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frame.clone()
    }

    async fn first_frame(&mut self) -> Result<(), CameraError> {
        match self.frame {
            Some(_) => Ok(()),
            None => Err(CameraError::StreamEnded),
        }
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(width: u32, height: u32) -> StillSource {
        StillSource::new(Frame {
            data: vec![0; (width * height * 3) as usize],
            width,
            height,
            presentation_time: 0.0,
            sequence: 0,
        })
    }

    #[tokio::test]
    async fn test_still_source_lifecycle() {
        let mut source = still(4, 2);
        source.first_frame().await.unwrap();
        let frame = source.current_frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));

        source.stop();
        assert!(source.current_frame().is_none());
        assert!(matches!(source.first_frame().await, Err(CameraError::StreamEnded)));
    }

    #[tokio::test]
    async fn test_still_provider_missing_file() {
        let mut provider = StillImageProvider::new("/nonexistent/face.png");
        let err = provider.request_stream(&StreamConstraints::default()).await.unwrap_err();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_still_provider_loads_image() {
        let path = std::env::temp_dir().join(format!("meshcam-still-{}.png", std::process::id()));
        image::RgbImage::from_pixel(6, 3, image::Rgb([1, 2, 3])).save(&path).unwrap();

        let mut provider = StillImageProvider::new(&path);
        let source = provider.request_stream(&StreamConstraints::default()).await.unwrap();
        let frame = source.current_frame().unwrap();
        assert_eq!((frame.width, frame.height), (6, 3));
        assert_eq!(&frame.data[..3], &[1, 2, 3]);

        std::fs::remove_file(&path).ok();
    }
}
