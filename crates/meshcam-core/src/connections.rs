//! Landmark connection map for the MediaPipe face mesh topology.
//!
//! Contour tables are embedded as static data. The full tesselation comes
//! from the canonical face model's triangle list (Wavefront OBJ) when one is
//! configured, and is otherwise triangulated from a detected face.

use crate::triangulate;
use crate::types::{Color, Connection, ConnectionGroup, LandmarkGroup, NormalizedPoint, Style};
use std::borrow::Cow;
use std::collections::BTreeSet;
use thiserror::Error;

/// Landmarks emitted by the base face mesh model.
pub const MESH_POINT_COUNT: usize = 468;
/// Landmarks emitted when iris refinement is enabled.
pub const MESH_WITH_IRIS_POINT_COUNT: usize = 478;

const fn c(start: usize, end: usize) -> Connection {
    Connection::new(start, end)
}

#[rustfmt::skip]
pub const LIPS: &[Connection] = &[
    c(61, 146), c(146, 91), c(91, 181), c(181, 84), c(84, 17),
    c(17, 314), c(314, 405), c(405, 321), c(321, 375), c(375, 291),
    c(61, 185), c(185, 40), c(40, 39), c(39, 37), c(37, 0),
    c(0, 267), c(267, 269), c(269, 270), c(270, 409), c(409, 291),
    c(78, 95), c(95, 88), c(88, 178), c(178, 87), c(87, 14),
    c(14, 317), c(317, 402), c(402, 318), c(318, 324), c(324, 308),
    c(78, 191), c(191, 80), c(80, 81), c(81, 82), c(82, 13),
    c(13, 312), c(312, 311), c(311, 310), c(310, 415), c(415, 308),
];

#[rustfmt::skip]
pub const LEFT_EYE: &[Connection] = &[
    c(263, 249), c(249, 390), c(390, 373), c(373, 374), c(374, 380),
    c(380, 381), c(381, 382), c(382, 362), c(263, 466), c(466, 388),
    c(388, 387), c(387, 386), c(386, 385), c(385, 384), c(384, 398),
    c(398, 362),
];

#[rustfmt::skip]
pub const LEFT_EYEBROW: &[Connection] = &[
    c(276, 283), c(283, 282), c(282, 295), c(295, 285),
    c(300, 293), c(293, 334), c(334, 296), c(296, 336),
];

pub const LEFT_IRIS: &[Connection] = &[c(474, 475), c(475, 476), c(476, 477), c(477, 474)];

#[rustfmt::skip]
pub const RIGHT_EYE: &[Connection] = &[
    c(33, 7), c(7, 163), c(163, 144), c(144, 145), c(145, 153),
    c(153, 154), c(154, 155), c(155, 133), c(33, 246), c(246, 161),
    c(161, 160), c(160, 159), c(159, 158), c(158, 157), c(157, 173),
    c(173, 133),
];

#[rustfmt::skip]
pub const RIGHT_EYEBROW: &[Connection] = &[
    c(46, 53), c(53, 52), c(52, 65), c(65, 55),
    c(70, 63), c(63, 105), c(105, 66), c(66, 107),
];

pub const RIGHT_IRIS: &[Connection] = &[c(469, 470), c(470, 471), c(471, 472), c(472, 469)];

#[rustfmt::skip]
pub const FACE_OVAL: &[Connection] = &[
    c(10, 338), c(338, 297), c(297, 332), c(332, 284), c(284, 251),
    c(251, 389), c(389, 356), c(356, 454), c(454, 323), c(323, 361),
    c(361, 288), c(288, 397), c(397, 365), c(365, 379), c(379, 378),
    c(378, 400), c(400, 377), c(377, 152), c(152, 148), c(148, 176),
    c(176, 149), c(149, 150), c(150, 136), c(136, 172), c(172, 58),
    c(58, 132), c(132, 93), c(93, 234), c(234, 127), c(127, 162),
    c(162, 21), c(21, 54), c(54, 103), c(103, 67), c(67, 109),
    c(109, 10),
];

const RIGHT_COLOR: Color = Color::rgb(0xFF, 0x30, 0x30);
const LEFT_COLOR: Color = Color::rgb(0x30, 0xFF, 0x30);
const CONTOUR_COLOR: Color = Color::rgb(0xE0, 0xE0, 0xE0);
const MESH_COLOR: Color = Color::rgba(0xC0, 0xC0, 0xC0, 0x70);

/// Static connections for a contour group. The tesselation has no static
/// table and returns an empty slice; see [`tesselation_from_obj`].
pub fn static_connections(group: LandmarkGroup) -> &'static [Connection] {
    match group {
        LandmarkGroup::Tesselation => &[],
        LandmarkGroup::RightEye => RIGHT_EYE,
        LandmarkGroup::RightEyebrow => RIGHT_EYEBROW,
        LandmarkGroup::RightIris => RIGHT_IRIS,
        LandmarkGroup::LeftEye => LEFT_EYE,
        LandmarkGroup::LeftEyebrow => LEFT_EYEBROW,
        LandmarkGroup::LeftIris => LEFT_IRIS,
        LandmarkGroup::FaceOval => FACE_OVAL,
        LandmarkGroup::Lips => LIPS,
    }
}

/// Default stroke style for a group.
pub fn default_style(group: LandmarkGroup) -> Style {
    match group {
        LandmarkGroup::Tesselation => Style::new(MESH_COLOR, 1.0),
        LandmarkGroup::RightEye | LandmarkGroup::RightEyebrow | LandmarkGroup::RightIris => {
            Style::new(RIGHT_COLOR, 1.0)
        }
        LandmarkGroup::LeftEye | LandmarkGroup::LeftEyebrow | LandmarkGroup::LeftIris => {
            Style::new(LEFT_COLOR, 1.0)
        }
        LandmarkGroup::FaceOval | LandmarkGroup::Lips => Style::new(CONTOUR_COLOR, 1.0),
    }
}

/// Build a group from its static table and default style.
pub fn group(group: LandmarkGroup) -> ConnectionGroup {
    ConnectionGroup {
        group,
        connections: Cow::Borrowed(static_connections(group)),
        style: default_style(group),
    }
}

/// The full overlay in draw order: mesh first, then eyes, brows, irises,
/// oval and lips. `tesselation` supplies the mesh edges (may be empty).
pub fn full_mesh_groups(tesselation: Vec<Connection>) -> Vec<ConnectionGroup> {
    let mut tesselation = Some(tesselation);
    LandmarkGroup::ALL
        .into_iter()
        .map(|g| match (g, tesselation.take()) {
            (LandmarkGroup::Tesselation, Some(edges)) => ConnectionGroup {
                group: g,
                connections: Cow::Owned(edges),
                style: default_style(g),
            },
            _ => group(g),
        })
        .collect()
}

/// Inner lip contour: the second half of [`LIPS`].
const INNER_LIPS: &[Connection] = LIPS.split_at(20).1;

/// Closed contours whose interior is an opening, not skin.
const OPENINGS: [&[Connection]; 3] = [RIGHT_EYE, LEFT_EYE, INNER_LIPS];

fn spans_opening(triangle: &[usize; 3]) -> bool {
    OPENINGS.iter().any(|contour| {
        triangle
            .iter()
            .all(|&v| contour.iter().any(|c| c.start == v || c.end == v))
    })
}

/// Tesselation edges triangulated from one face's landmarks.
///
/// The topology depends only on the point layout, so a single frontal face
/// gives a mesh that can be reused for every later frame. Triangles lying
/// inside the eye or mouth openings are left out. Returns unique edges,
/// `start < end`, sorted; empty when the face has fewer than
/// [`MESH_POINT_COUNT`] points.
pub fn tesselation_from_landmarks(face: &[NormalizedPoint]) -> Vec<Connection> {
    if face.len() < MESH_POINT_COUNT {
        return Vec::new();
    }
    let points: Vec<(f64, f64)> = face[..MESH_POINT_COUNT]
        .iter()
        .map(|p| (f64::from(p.x), f64::from(p.y)))
        .collect();

    let mut edges = BTreeSet::new();
    let mut openings = 0usize;
    for triangle in triangulate::delaunay(&points) {
        if spans_opening(&triangle) {
            openings += 1;
            continue;
        }
        for k in 0..3 {
            let (a, b) = (triangle[k], triangle[(k + 1) % 3]);
            edges.insert(Connection::new(a.min(b), a.max(b)));
        }
    }

    tracing::debug!(edges = edges.len(), openings, "triangulated tesselation from landmarks");
    edges.into_iter().collect()
}

#[derive(Error, Debug)]
pub enum MeshParseError {
    #[error("line {line}: invalid face index {token:?}")]
    BadIndex { line: usize, token: String },
    #[error("line {line}: face has {count} vertices, need at least 3")]
    DegenerateFace { line: usize, count: usize },
    #[error("no faces found in mesh")]
    Empty,
}

/// Derive mesh edges from the `f` records of a Wavefront OBJ.
///
/// Indices are 1-based in OBJ and 0-based in the result. Vertex tokens may
/// be `v`, `v/vt`, `v/vt/vn` or `v//vn`. Each polygon contributes its
/// boundary edges; shared edges are emitted once, `start < end`, sorted.
pub fn tesselation_from_obj(source: &str) -> Result<Vec<Connection>, MeshParseError> {
    let mut edges = BTreeSet::new();

    for (line_no, line) in source.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("f") {
            continue;
        }

        let indices = tokens
            .map(|token| {
                let vertex = token.split('/').next().unwrap_or_default();
                match vertex.parse::<usize>() {
                    Ok(i) if i > 0 => Ok(i - 1),
                    _ => Err(MeshParseError::BadIndex {
                        line: line_no + 1,
                        token: token.to_string(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if indices.len() < 3 {
            return Err(MeshParseError::DegenerateFace {
                line: line_no + 1,
                count: indices.len(),
            });
        }

        for (i, &a) in indices.iter().enumerate() {
            let b = indices[(i + 1) % indices.len()];
            if a != b {
                edges.insert(Connection::new(a.min(b), a.max(b)));
            }
        }
    }

    if edges.is_empty() {
        return Err(MeshParseError::Empty);
    }

    tracing::debug!(edges = edges.len(), "parsed mesh tesselation");
    Ok(edges.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contour_indices_within_mesh() {
        for g in LandmarkGroup::ALL {
            let max = group(g).max_index();
            match g {
                LandmarkGroup::Tesselation => assert_eq!(max, None),
                LandmarkGroup::LeftIris | LandmarkGroup::RightIris => {
                    assert!(max.unwrap() < MESH_WITH_IRIS_POINT_COUNT, "{g}")
                }
                _ => assert!(max.unwrap() < MESH_POINT_COUNT, "{g}"),
            }
        }
    }

    #[test]
    fn test_eye_contours_are_closed() {
        // Each eye outline is two arcs leaving the same outer corner.
        for table in [RIGHT_EYE, LEFT_EYE] {
            let starts: BTreeSet<_> = table.iter().map(|c| c.start).collect();
            let ends: BTreeSet<_> = table.iter().map(|c| c.end).collect();
            let corners: Vec<_> = starts.difference(&ends).collect();
            assert_eq!(corners.len(), 1, "one outer corner");
        }
        assert_eq!(RIGHT_EYE.len(), 16);
        assert_eq!(LEFT_EYE.len(), 16);
        assert_eq!(LIPS.len(), 40);
        assert_eq!(FACE_OVAL.len(), 36);
    }

    #[test]
    fn test_full_mesh_order() {
        let groups = full_mesh_groups(vec![Connection::new(0, 1)]);
        assert_eq!(groups.len(), 9);
        assert_eq!(groups[0].group, LandmarkGroup::Tesselation);
        assert_eq!(groups[0].connections.len(), 1);
        assert_eq!(groups[1].group, LandmarkGroup::RightEye);
        assert_eq!(groups[8].group, LandmarkGroup::Lips);
    }

    /// 468 points on a jittered 22x22 lattice covering the unit face box.
    fn lattice_face() -> Vec<NormalizedPoint> {
        (0..MESH_POINT_COUNT)
            .map(|i| {
                let jitter = ((i * 7919) % 97) as f32 / 97.0 * 0.004;
                NormalizedPoint::new(
                    0.2 + 0.6 * (i % 22) as f32 / 21.0 + jitter,
                    0.1 + 0.8 * (i / 22) as f32 / 21.0 - jitter,
                    0.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_tesselation_from_landmarks() {
        let edges = tesselation_from_landmarks(&lattice_face());
        assert!(edges.len() > MESH_POINT_COUNT, "edges={}", edges.len());
        assert!(edges.iter().all(|c| c.start < c.end && c.end < MESH_POINT_COUNT));
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tesselation_from_landmarks_ignores_iris_points() {
        let mut face = lattice_face();
        face.extend((0..10).map(|i| NormalizedPoint::new(0.5, 0.01 * i as f32, 0.0)));
        let edges = tesselation_from_landmarks(&face);
        assert!(!edges.is_empty());
        assert!(edges.iter().all(|c| c.end < MESH_POINT_COUNT));
    }

    #[test]
    fn test_tesselation_from_short_face() {
        assert!(tesselation_from_landmarks(&lattice_face()[..100]).is_empty());
    }

    #[test]
    fn test_openings_excluded() {
        assert!(spans_opening(&[33, 133, 159]));
        assert!(spans_opening(&[78, 13, 14]));
        assert!(!spans_opening(&[33, 133, 1]));
        // Outer lip points are skin, not an opening.
        assert!(!spans_opening(&[61, 0, 17]));
    }

    #[test]
    fn test_tesselation_from_obj() {
        let obj = "\
# two triangles sharing an edge
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vt 0 0
f 1/1/1 2/1/1 3/1/1
f 2//1 4//1 3//1
";
        let edges = tesselation_from_obj(obj).unwrap();
        assert_eq!(
            edges,
            vec![
                Connection::new(0, 1),
                Connection::new(0, 2),
                Connection::new(1, 2),
                Connection::new(1, 3),
                Connection::new(2, 3),
            ]
        );
    }

    #[test]
    fn test_tesselation_from_obj_errors() {
        assert!(matches!(
            tesselation_from_obj("f 1 0 2"),
            Err(MeshParseError::BadIndex { line: 1, .. })
        ));
        assert!(matches!(
            tesselation_from_obj("v 0 0 0\nf 1 2"),
            Err(MeshParseError::DegenerateFace { line: 2, count: 2 })
        ));
        assert!(matches!(
            tesselation_from_obj("v 0 0 0\n"),
            Err(MeshParseError::Empty)
        ));
    }
}
