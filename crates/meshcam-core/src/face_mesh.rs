//! Face mesh landmark engine via ONNX Runtime.
//!
//! Runs a MediaPipe-style face mesh model on the whole frame: 192×192 NHWC
//! input in [-1, 1], 468 (or 478 with irises) xyz landmarks in model pixel
//! space, and an optional face-presence logit.

use crate::blendshapes;
use crate::connections::{MESH_POINT_COUNT, MESH_WITH_IRIS_POINT_COUNT};
use crate::landmarker::{Delegate, EngineLoader, LandmarkEngine, LandmarkerError, LandmarkerOptions, RgbFrame};
use crate::types::{DetectionResult, NormalizedPoint};
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::Array4;
use ort::ep::{CPU as CPUExecutionProvider, CUDA as CUDAExecutionProvider};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const MESH_INPUT_SIZE: usize = 192;
const MESH_MEAN: f32 = 127.5;
const MESH_STD: f32 = 127.5;

/// Face mesh engine backed by an ONNX session.
pub struct OnnxFaceMesh {
    session: Session,
    /// Whether output 1 (face-presence logit) exists.
    has_presence: bool,
    presence_threshold: f32,
    output_blendshapes: bool,
}

/// Loads [`OnnxFaceMesh`] engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxFaceMeshLoader;

impl EngineLoader for OnnxFaceMeshLoader {
    type Engine = OnnxFaceMesh;

    fn load(&self, options: &LandmarkerOptions) -> Result<OnnxFaceMesh, LandmarkerError> {
        OnnxFaceMesh::load(options)
    }
}

impl OnnxFaceMesh {
    /// Load the face mesh model named by `options.model_path`.
    pub fn load(options: &LandmarkerOptions) -> Result<Self, LandmarkerError> {
        let model_path = options.model_path.to_string_lossy().into_owned();
        if !Path::new(&model_path).exists() {
            return Err(LandmarkerError::ModelNotFound(model_path));
        }

        let builder = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?;
        let mut builder = match options.delegate {
            Delegate::Gpu => builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])
            .map_err(ort::Error::from)?,
            Delegate::Cpu => builder,
        };
        let session = builder
            .commit_from_file(&model_path)
            .map_err(|e| LandmarkerError::ModelLoad(format!("{model_path}: {e}")))?;

        let num_outputs = session.outputs().len();
        tracing::info!(
            path = %model_path,
            delegate = %options.delegate,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face mesh model"
        );

        if num_outputs == 0 {
            return Err(LandmarkerError::ModelLoad(format!(
                "{model_path}: face mesh model has no outputs"
            )));
        }

        Ok(Self {
            session,
            has_presence: num_outputs > 1,
            presence_threshold: options.presence_threshold,
            output_blendshapes: options.output_blendshapes,
        })
    }

    /// Resize the frame to the model input and normalize to [-1, 1], NHWC.
    fn preprocess(frame: RgbFrame<'_>) -> Result<Array4<f32>, LandmarkerError> {
        let image = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, frame.data)
            .ok_or_else(|| {
                LandmarkerError::Inference(format!(
                    "frame buffer too short for {}x{} RGB: {} bytes",
                    frame.width,
                    frame.height,
                    frame.data.len()
                ))
            })?;
        let size = MESH_INPUT_SIZE as u32;
        let resized = image::imageops::resize(&image, size, size, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, MESH_INPUT_SIZE, MESH_INPUT_SIZE, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - MESH_MEAN) / MESH_STD;
            }
        }
        Ok(tensor)
    }
}

impl LandmarkEngine for OnnxFaceMesh {
    fn detect(
        &mut self,
        frame: RgbFrame<'_>,
        timestamp_ms: i64,
    ) -> Result<DetectionResult, LandmarkerError> {
        let input = Self::preprocess(frame)?;
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        if self.has_presence {
            let (_, logits) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| LandmarkerError::Inference(format!("presence: {e}")))?;
            let presence = logits.first().map(|&l| sigmoid(l)).unwrap_or(0.0);
            if presence < self.presence_threshold {
                tracing::trace!(timestamp_ms, presence, "no face present");
                return Ok(DetectionResult::default());
            }
        }

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkerError::Inference(format!("landmarks: {e}")))?;
        let face = decode_landmarks(raw)?;

        let blendshapes = if self.output_blendshapes {
            let aspect = frame.width as f32 / frame.height.max(1) as f32;
            vec![blendshapes::derive_eye_blinks(&face, aspect)]
        } else {
            vec![Vec::new()]
        };

        tracing::trace!(timestamp_ms, points = face.len(), "face mesh inference");
        Ok(DetectionResult {
            faces: vec![face],
            blendshapes,
        })
    }
}

/// Convert flat xyz model-space output into normalized points.
fn decode_landmarks(raw: &[f32]) -> Result<Vec<NormalizedPoint>, LandmarkerError> {
    let count = if raw.len() >= MESH_WITH_IRIS_POINT_COUNT * 3 {
        MESH_WITH_IRIS_POINT_COUNT
    } else if raw.len() >= MESH_POINT_COUNT * 3 {
        MESH_POINT_COUNT
    } else {
        return Err(LandmarkerError::Inference(format!(
            "face mesh output has {} values, need at least {}",
            raw.len(),
            MESH_POINT_COUNT * 3
        )));
    };

    let scale = MESH_INPUT_SIZE as f32;
    Ok(raw[..count * 3]
        .chunks_exact(3)
        .map(|xyz| NormalizedPoint::new(xyz[0] / scale, xyz[1] / scale, xyz[2] / scale))
        .collect())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
