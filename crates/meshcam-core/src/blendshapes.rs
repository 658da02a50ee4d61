//! Eye-blink blendshapes derived from landmark geometry.
//!
//! Engines that only emit landmarks get `eyeBlinkLeft` / `eyeBlinkRight`
//! scores from the eye aspect ratio (EAR) of six contour points per eye.

use crate::types::{BlendshapeScore, NormalizedPoint};

pub const EYE_BLINK_LEFT: &str = "eyeBlinkLeft";
pub const EYE_BLINK_RIGHT: &str = "eyeBlinkRight";

/// EAR of a fully open eye.
const EAR_OPEN: f32 = 0.30;
/// EAR of a closed eye.
const EAR_CLOSED: f32 = 0.10;
/// Horizontal span floor, avoids division by zero on collapsed landmarks.
const MIN_EYE_WIDTH: f32 = 1e-3;

/// Six mesh indices describing one eye: two vertical pairs and the corners.
#[derive(Debug, Clone, Copy)]
struct EyeIndices {
    top: usize,
    bottom: usize,
    top2: usize,
    bottom2: usize,
    outer: usize,
    inner: usize,
}

const RIGHT_EYE: EyeIndices = EyeIndices {
    top: 159,
    bottom: 145,
    top2: 158,
    bottom2: 153,
    outer: 33,
    inner: 133,
};

const LEFT_EYE: EyeIndices = EyeIndices {
    top: 386,
    bottom: 374,
    top2: 385,
    bottom2: 380,
    outer: 263,
    inner: 362,
};

/// Eye aspect ratio: `(|p2-p6| + |p3-p5|) / (2 |p1-p4|)`.
///
/// `aspect` scales x to pixel-equivalent units (frame width / height), since
/// normalized coordinates are anisotropic on non-square frames.
fn eye_aspect_ratio(points: &[NormalizedPoint], eye: EyeIndices, aspect: f32) -> Option<f32> {
    let at = |i: usize| points.get(i).map(|p| (p.x * aspect, p.y));
    let dist = |a: (f32, f32), b: (f32, f32)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

    let v1 = dist(at(eye.top)?, at(eye.bottom)?);
    let v2 = dist(at(eye.top2)?, at(eye.bottom2)?);
    let h = dist(at(eye.outer)?, at(eye.inner)?).max(MIN_EYE_WIDTH);

    Some((v1 + v2) / (2.0 * h))
}

/// Map an EAR onto a blink score in [0, 1]: 0 = open, 1 = closed.
pub fn blink_score(ear: f32) -> f32 {
    ((EAR_OPEN - ear) / (EAR_OPEN - EAR_CLOSED)).clamp(0.0, 1.0)
}

/// Derive blink scores for one face.
///
/// Returns an empty list when the landmark set is too short to contain the
/// eye contours.
pub fn derive_eye_blinks(points: &[NormalizedPoint], aspect: f32) -> Vec<BlendshapeScore> {
    let mut scores = Vec::with_capacity(2);
    if let Some(ear) = eye_aspect_ratio(points, LEFT_EYE, aspect) {
        scores.push(BlendshapeScore::new(EYE_BLINK_LEFT, blink_score(ear)));
    }
    if let Some(ear) = eye_aspect_ratio(points, RIGHT_EYE, aspect) {
        scores.push(BlendshapeScore::new(EYE_BLINK_RIGHT, blink_score(ear)));
    }
    scores
}
