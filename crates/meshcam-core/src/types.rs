use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A landmark in frame-relative coordinates.
///
/// `x` and `y` are fractions of the frame width and height; `z` is relative
/// depth (0.0 when the engine does not report it).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl NormalizedPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Project into pixel space of a `width` × `height` surface.
    ///
    /// No clamping and no rounding: points outside [0, 1] land outside the surface.
    pub fn project(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// All landmarks of one face, addressed by index.
pub type LandmarkSet = Vec<NormalizedPoint>;

/// A directed pair of landmark indices forming one drawable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub start: usize,
    pub end: usize,
}

impl Connection {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Resolve both endpoints, or `None` if either index is out of range.
    pub fn resolve<'a>(
        &self,
        landmarks: &'a [NormalizedPoint],
    ) -> Option<(&'a NormalizedPoint, &'a NormalizedPoint)> {
        Some((landmarks.get(self.start)?, landmarks.get(self.end)?))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("color must start with '#': {0}")]
    MissingHash(String),
    #[error("color must be #RRGGBB or #RRGGBBAA, got {0} hex digits")]
    BadLength(usize),
    #[error("invalid hex digits in color: {0}")]
    BadHex(String),
}

/// RGBA8 stroke color, written as `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(s.to_string()))?;
        if hex.len() != 6 && hex.len() != 8 {
            return Err(ColorParseError::BadLength(hex.len()));
        }
        if !hex.is_ascii() {
            return Err(ColorParseError::BadHex(s.to_string()));
        }

        let mut rgba = [255u8; 4];
        for (i, channel) in rgba.iter_mut().take(hex.len() / 2).enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *channel =
                u8::from_str_radix(pair, 16).map_err(|_| ColorParseError::BadHex(s.to_string()))?;
        }
        Ok(Self(rgba))
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02X}{g:02X}{b:02X}")
        } else {
            write!(f, "#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

/// Stroke style applied to every connection of a group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke_color: Color,
    pub line_width: f32,
}

impl Style {
    pub const fn new(stroke_color: Color, line_width: f32) -> Self {
        Self {
            stroke_color,
            line_width,
        }
    }
}

/// Named landmark groups of the 468/478-point face mesh.
///
/// "Right" and "left" are from the subject's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkGroup {
    Tesselation,
    RightEye,
    RightEyebrow,
    RightIris,
    LeftEye,
    LeftEyebrow,
    LeftIris,
    FaceOval,
    Lips,
}

impl LandmarkGroup {
    /// Every group, in default draw order (mesh first so contours stay visible).
    pub const ALL: [LandmarkGroup; 9] = [
        LandmarkGroup::Tesselation,
        LandmarkGroup::RightEye,
        LandmarkGroup::RightEyebrow,
        LandmarkGroup::RightIris,
        LandmarkGroup::LeftEye,
        LandmarkGroup::LeftEyebrow,
        LandmarkGroup::LeftIris,
        LandmarkGroup::FaceOval,
        LandmarkGroup::Lips,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tesselation => "tesselation",
            Self::RightEye => "right_eye",
            Self::RightEyebrow => "right_eyebrow",
            Self::RightIris => "right_iris",
            Self::LeftEye => "left_eye",
            Self::LeftEyebrow => "left_eyebrow",
            Self::LeftIris => "left_iris",
            Self::FaceOval => "face_oval",
            Self::Lips => "lips",
        }
    }
}

impl fmt::Display for LandmarkGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
#[error("unknown landmark group: {0}")]
pub struct UnknownGroup(pub String);

impl FromStr for LandmarkGroup {
    type Err = UnknownGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        // "tessellation" is the common spelling; accept both.
        let wanted = if wanted == "tessellation" { "tesselation".to_string() } else { wanted };
        Self::ALL
            .into_iter()
            .find(|g| g.name() == wanted)
            .ok_or_else(|| UnknownGroup(s.to_string()))
    }
}

/// A named set of connections plus the style they are stroked with.
#[derive(Debug, Clone)]
pub struct ConnectionGroup {
    pub group: LandmarkGroup,
    pub connections: Cow<'static, [Connection]>,
    pub style: Style,
}

impl ConnectionGroup {
    /// Largest landmark index referenced by this group.
    pub fn max_index(&self) -> Option<usize> {
        self.connections.iter().map(|c| c.start.max(c.end)).max()
    }
}

/// A named facial-expression score produced alongside landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendshapeScore {
    pub category_name: String,
    pub score: f32,
}

impl BlendshapeScore {
    pub fn new(category_name: impl Into<String>, score: f32) -> Self {
        Self {
            category_name: category_name.into(),
            score,
        }
    }
}

/// Output of one inference pass.
///
/// `blendshapes[i]` belongs to `faces[i]`; the adapter guarantees both have
/// the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub faces: Vec<LandmarkSet>,
    #[serde(default)]
    pub blendshapes: Vec<Vec<BlendshapeScore>>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Score of the named category for face `face`, if present.
    pub fn category_score(&self, face: usize, category_name: &str) -> Option<f32> {
        self.blendshapes
            .get(face)?
            .iter()
            .find(|b| b.category_name == category_name)
            .map(|b| b.score)
    }
}
