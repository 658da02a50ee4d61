use crate::controller::TrackerOptions;
use meshcam_core::connections::{self, MeshParseError};
use meshcam_core::{Color, ConnectionGroup, Delegate, LandmarkGroup, LandmarkerOptions, Style};
use meshcam_hw::StreamConstraints;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Face mesh model file looked up inside the model directory.
pub const MODEL_FILE_NAME: &str = "face_landmark.onnx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid overlay file: {0}")]
    Overlay(#[from] toml::de::Error),
    #[error("invalid mesh file: {0}")]
    Mesh(#[from] MeshParseError),
}

/// Tracker configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the face mesh model.
    pub model_dir: PathBuf,
    /// Explicit model file; overrides `model_dir`.
    pub model_path: Option<PathBuf>,
    pub delegate: Delegate,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Refresh signal rate for the frame loop.
    pub refresh_hz: u32,
    /// `eyeBlinkRight` score above which a blink is reported.
    pub blink_threshold: f32,
    /// Wavefront OBJ supplying the tesselation edges.
    pub mesh_obj: Option<PathBuf>,
    /// TOML file selecting and styling overlay groups.
    pub overlay: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from `MESHCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let delegate = match var("MESHCAM_DELEGATE") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring MESHCAM_DELEGATE");
                Delegate::default()
            }),
            None => Delegate::default(),
        };

        Self {
            camera_device: var("MESHCAM_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: var("MESHCAM_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| default_model_dir(&var)),
            model_path: var("MESHCAM_MODEL_PATH").map(PathBuf::from),
            delegate,
            capture_width: parsed(&var, "MESHCAM_CAPTURE_WIDTH", 640),
            capture_height: parsed(&var, "MESHCAM_CAPTURE_HEIGHT", 480),
            refresh_hz: parsed(&var, "MESHCAM_REFRESH_HZ", 60),
            blink_threshold: blink_threshold(var("MESHCAM_BLINK_THRESHOLD")),
            mesh_obj: var("MESHCAM_MESH_OBJ").map(PathBuf::from),
            overlay: var("MESHCAM_OVERLAY").map(PathBuf::from),
        }
    }

    /// Path to the face mesh model.
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.model_dir.join(MODEL_FILE_NAME))
    }

    pub fn landmarker_options(&self) -> LandmarkerOptions {
        LandmarkerOptions {
            delegate: self.delegate,
            ..LandmarkerOptions::new(self.model_path())
        }
    }

    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            constraints: StreamConstraints {
                width: self.capture_width,
                height: self.capture_height,
            },
            blink_threshold: self.blink_threshold,
        }
    }

    /// Overlay groups in draw order.
    ///
    /// Without an overlay file every group is drawn with its default style.
    pub fn load_groups(&self) -> Result<Vec<ConnectionGroup>, ConfigError> {
        let tesselation = match &self.mesh_obj {
            Some(path) => connections::tesselation_from_obj(&read(path)?)?,
            None => Vec::new(),
        };

        match &self.overlay {
            Some(path) => Ok(OverlayConfig::parse(&read(path)?)?.into_groups(tesselation)),
            None => Ok(connections::full_mesh_groups(tesselation)),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn default_model_dir(var: &impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("meshcam/models")
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

const DEFAULT_BLINK_THRESHOLD: f32 = 0.4;

/// Blendshape scores live in [0, 1]; anything else would never or always fire.
fn blink_threshold(value: Option<String>) -> f32 {
    let Some(value) = value else {
        return DEFAULT_BLINK_THRESHOLD;
    };
    match value.trim().parse::<f32>() {
        Ok(t) if t.is_finite() && (0.0..=1.0).contains(&t) => t,
        _ => {
            tracing::warn!(%value, "ignoring MESHCAM_BLINK_THRESHOLD, expected a number in [0, 1]");
            DEFAULT_BLINK_THRESHOLD
        }
    }
}

/// One `[[group]]` entry of an overlay file.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub name: LandmarkGroup,
    pub color: Option<Color>,
    pub line_width: Option<f32>,
}

/// Overlay style file. Entry order is draw order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverlayConfig {
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupEntry>,
}

impl OverlayConfig {
    pub fn parse(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn into_groups(self, tesselation: Vec<meshcam_core::Connection>) -> Vec<ConnectionGroup> {
        let mut tesselation = Some(tesselation);
        self.groups
            .into_iter()
            .map(|entry| {
                let base = connections::default_style(entry.name);
                let style = Style::new(
                    entry.color.unwrap_or(base.stroke_color),
                    entry.line_width.unwrap_or(base.line_width),
                );
                let edges = match entry.name {
                    LandmarkGroup::Tesselation => Cow::Owned(tesselation.take().unwrap_or_default()),
                    other => Cow::Borrowed(connections::static_connections(other)),
                };
                ConnectionGroup {
                    group: entry.name,
                    connections: edges,
                    style,
                }
            })
            .collect()
    }
}

/// Keep only the named groups, preserving draw order.
pub fn select_groups(groups: Vec<ConnectionGroup>, names: &[LandmarkGroup]) -> Vec<ConnectionGroup> {
    groups.into_iter().filter(|g| names.contains(&g.group)).collect()
}
