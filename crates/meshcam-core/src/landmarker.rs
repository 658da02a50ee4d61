//! Face landmarker: lifecycle and result validation around a landmark engine.
//!
//! The engine itself is opaque. This adapter owns its lifecycle (load,
//! ready, dispose) and guarantees that everything downstream only sees a
//! well-formed [`DetectionResult`].

use crate::types::{BlendshapeScore, DetectionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LandmarkerError {
    #[error("model file not found: {0} (set MESHCAM_MODEL_PATH to a face mesh ONNX model)")]
    ModelNotFound(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("landmarker is not initialized")]
    NotReady,
    #[error("landmarker is already initialized")]
    AlreadyInitialized,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Compute backend preference. A soft hint: the engine falls back silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    Cpu,
    #[default]
    Gpu,
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown delegate {0:?} (expected cpu or gpu)")]
pub struct UnknownDelegate(pub String);

impl FromStr for Delegate {
    type Err = UnknownDelegate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            _ => Err(UnknownDelegate(s.to_string())),
        }
    }
}

/// Options handed to the engine loader.
#[derive(Debug, Clone)]
pub struct LandmarkerOptions {
    pub model_path: PathBuf,
    pub delegate: Delegate,
    /// Emit blendshape scores alongside landmarks.
    pub output_blendshapes: bool,
    /// Minimum face-presence probability for a face to be reported.
    pub presence_threshold: f32,
}

impl LandmarkerOptions {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            delegate: Delegate::default(),
            output_blendshapes: true,
            presence_threshold: 0.5,
        }
    }
}

/// Borrowed packed RGB8 frame.
#[derive(Debug, Clone, Copy)]
pub struct RgbFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> RgbFrame<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self { data, width, height }
    }
}

/// A landmark inference engine running in video mode.
pub trait LandmarkEngine: Send {
    /// Run one inference pass. `timestamp_ms` is non-decreasing per session.
    fn detect(
        &mut self,
        frame: RgbFrame<'_>,
        timestamp_ms: i64,
    ) -> Result<DetectionResult, LandmarkerError>;
}

/// Creates an engine from options. Loading may allocate compute resources.
pub trait EngineLoader {
    type Engine: LandmarkEngine;

    fn load(&self, options: &LandmarkerOptions) -> Result<Self::Engine, LandmarkerError>;
}

/// Lifecycle wrapper around a [`LandmarkEngine`].
pub struct FaceLandmarker<E> {
    engine: Option<E>,
}

impl<E: LandmarkEngine> Default for FaceLandmarker<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: LandmarkEngine> FaceLandmarker<E> {
    /// An uninitialized landmarker.
    pub fn new() -> Self {
        Self { engine: None }
    }

    /// A landmarker that is ready with an already-constructed engine.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// Load the engine. Must be called exactly once before [`detect`](Self::detect).
    pub fn initialize<L>(&mut self, loader: &L, options: &LandmarkerOptions) -> Result<(), LandmarkerError>
    where
        L: EngineLoader<Engine = E>,
    {
        if self.engine.is_some() {
            return Err(LandmarkerError::AlreadyInitialized);
        }

        let engine = loader.load(options)?;
        tracing::info!(
            path = %options.model_path.display(),
            delegate = %options.delegate,
            blendshapes = options.output_blendshapes,
            "face landmarker ready"
        );
        self.engine = Some(engine);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Run detection on one frame.
    pub fn detect(
        &mut self,
        frame: RgbFrame<'_>,
        timestamp_ms: i64,
    ) -> Result<DetectionResult, LandmarkerError> {
        let engine = self.engine.as_mut().ok_or(LandmarkerError::NotReady)?;
        let raw = engine.detect(frame, timestamp_ms)?;
        Ok(validate(raw))
    }

    /// Release the engine. Safe to call repeatedly or before initialization.
    pub fn dispose(&mut self) {
        if self.engine.take().is_some() {
            tracing::info!("face landmarker disposed");
        }
    }
}

/// Normalize raw engine output.
///
/// Faces with non-finite coordinates are dropped together with their
/// scores. The blendshape list is padded or truncated to one entry per
/// face; scores are clamped to [0, 1] and non-finite scores removed.
fn validate(raw: DetectionResult) -> DetectionResult {
    let DetectionResult { faces, blendshapes } = raw;
    let mut blendshapes = blendshapes.into_iter();

    let mut result = DetectionResult::default();
    for (i, face) in faces.into_iter().enumerate() {
        let scores = blendshapes.next().unwrap_or_default();
        if !face.iter().all(|p| p.is_finite()) {
            tracing::debug!(face = i, "dropping face with non-finite landmarks");
            continue;
        }
        let scores: Vec<BlendshapeScore> = scores
            .into_iter()
            .filter(|s| s.score.is_finite())
            .map(|s| BlendshapeScore {
                score: s.score.clamp(0.0, 1.0),
                ..s
            })
            .collect();
        result.faces.push(face);
        result.blendshapes.push(scores);
    }

    let extra = blendshapes.count();
    if extra > 0 {
        tracing::debug!(extra, "engine returned blendshapes for missing faces");
    }

    result
}
