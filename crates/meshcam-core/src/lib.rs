//! meshcam-core: Face landmark pipeline building blocks.
//!
//! Connection map, frame deduplication, the landmarker adapter with an ONNX
//! Runtime face mesh engine, and overlay rendering.

pub mod blendshapes;
pub mod connections;
pub mod dedup;
pub mod face_mesh;
pub mod landmarker;
pub mod render;
mod triangulate;
pub mod types;

pub use dedup::FrameDeduplicator;
pub use face_mesh::{OnnxFaceMesh, OnnxFaceMeshLoader};
pub use landmarker::{
    Delegate, EngineLoader, FaceLandmarker, LandmarkEngine, LandmarkerError, LandmarkerOptions, RgbFrame,
    UnknownDelegate,
};
pub use render::{Canvas, OverlayRenderer, Surface};
pub use types::{
    BlendshapeScore, Color, Connection, ConnectionGroup, DetectionResult, LandmarkGroup, LandmarkSet,
    NormalizedPoint, Style,
};
