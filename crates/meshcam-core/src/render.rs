//! Overlay rendering: landmark groups projected onto a drawing surface.

use crate::connections::{self, MESH_POINT_COUNT};
use crate::types::{Connection, ConnectionGroup, DetectionResult, LandmarkGroup, Style};
use image::{DynamicImage, ImageBuffer, Rgb, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, Blend};
use std::borrow::Cow;
use std::path::Path;

/// A 2D drawing target sized in pixels.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Change the pixel size. Like assigning a canvas width, this clears it.
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &Style);
}

/// Draw every group for every face in `result`.
///
/// The surface is cleared first. Groups are drawn in slice order, so later
/// groups end up on top. Connections referencing landmarks the face does not
/// have are skipped; the rest of the frame still draws.
pub fn render<S: Surface + ?Sized>(surface: &mut S, result: &DetectionResult, groups: &[ConnectionGroup]) {
    surface.clear();
    let (width, height) = (surface.width(), surface.height());

    for (face_idx, face) in result.faces.iter().enumerate() {
        for group in groups {
            let mut skipped = 0usize;
            for connection in group.connections.iter() {
                let Some((start, end)) = connection.resolve(face) else {
                    skipped += 1;
                    continue;
                };
                surface.stroke_line(start.project(width, height), end.project(width, height), &group.style);
            }
            if skipped > 0 {
                tracing::trace!(
                    face = face_idx,
                    group = %group.group,
                    skipped,
                    points = face.len(),
                    "connections outside landmark set"
                );
            }
        }
    }
}

/// Ordered connection groups plus the render entry point.
///
/// A tesselation group without edges is filled in from the first face that
/// carries the full mesh, then kept for the rest of the session.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    groups: Vec<ConnectionGroup>,
    needs_tesselation: bool,
}

fn is_empty_tesselation(group: &ConnectionGroup) -> bool {
    group.group == LandmarkGroup::Tesselation && group.connections.is_empty()
}

impl OverlayRenderer {
    pub fn new(groups: Vec<ConnectionGroup>) -> Self {
        let needs_tesselation = groups.iter().any(is_empty_tesselation);
        Self {
            groups,
            needs_tesselation,
        }
    }

    pub fn groups(&self) -> &[ConnectionGroup] {
        &self.groups
    }

    pub fn render<S: Surface + ?Sized>(&mut self, surface: &mut S, result: &DetectionResult) {
        if self.needs_tesselation {
            self.fill_tesselation(result);
        }
        render(surface, result, &self.groups);
    }

    fn fill_tesselation(&mut self, result: &DetectionResult) {
        let Some(face) = result.faces.iter().find(|f| f.len() >= MESH_POINT_COUNT) else {
            return;
        };
        let edges = connections::tesselation_from_landmarks(face);
        if edges.is_empty() {
            return;
        }
        let edges: Cow<'static, [Connection]> = Cow::Owned(edges);
        for group in self.groups.iter_mut().filter(|g| is_empty_tesselation(g)) {
            group.connections = edges.clone();
        }
        self.needs_tesselation = false;
        tracing::info!(edges = edges.len(), "tesselation derived from detected face");
    }
}

/// Aspect-preserving display size for a frame: full width, height scaled by
/// the frame's height/width ratio.
pub fn overlay_dimensions(frame_width: u32, frame_height: u32) -> (u32, u32) {
    if frame_width == 0 {
        return (0, 0);
    }
    let ratio = frame_height as f64 / frame_width as f64;
    (frame_width, (frame_width as f64 * ratio).round() as u32)
}

/// RGBA8 in-memory surface with alpha-blended strokes.
pub struct Canvas {
    image: Blend<RgbaImage>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: Blend(RgbaImage::new(width, height)),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image.0
    }

    /// True when no pixel has been drawn since the last clear.
    pub fn is_blank(&self) -> bool {
        self.image.0.pixels().all(|p| p.0[3] == 0)
    }

    /// Alpha-composite the overlay over an RGB frame of the same size.
    pub fn composite_over(&self, frame: &[u8], width: u32, height: u32) -> Option<RgbaImage> {
        let base = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, frame.to_vec())?;
        let mut base = DynamicImage::ImageRgb8(base).to_rgba8();
        image::imageops::overlay(&mut base, &self.image.0, 0, 0);
        Some(base)
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.image.0.save_with_format(path, image::ImageFormat::Png)
    }
}

impl Surface for Canvas {
    fn width(&self) -> u32 {
        self.image.0.width()
    }

    fn height(&self) -> u32 {
        self.image.0.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width(), self.height()) {
            self.clear();
        } else {
            self.image = Blend(RgbaImage::new(width, height));
        }
    }

    fn clear(&mut self) {
        for pixel in self.image.0.pixels_mut() {
            pixel.0 = [0, 0, 0, 0];
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &Style) {
        let color = image::Rgba(style.stroke_color.0);
        let passes = style.line_width.max(1.0).round() as u32;
        if passes == 1 {
            draw_line_segment_mut(&mut self.image, from, to, color);
            return;
        }

        // Wide strokes: parallel segments offset along the unit normal.
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let len = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if len > f32::EPSILON { (-dy / len, dx / len) } else { (0.0, 1.0) };
        let half = (passes - 1) as f32 / 2.0;
        for k in 0..passes {
            let off = k as f32 - half;
            draw_line_segment_mut(
                &mut self.image,
                (from.0 + nx * off, from.1 + ny * off),
                (to.0 + nx * off, to.1 + ny * off),
                color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, NormalizedPoint};

    #[derive(Default)]
    struct RecordingSurface {
        width: u32,
        height: u32,
        clears: usize,
        lines: Vec<((f32, f32), (f32, f32), Style)>,
    }

    impl Surface for RecordingSurface {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.width = width;
            self.height = height;
            self.clear();
        }
        fn clear(&mut self) {
            self.clears += 1;
            self.lines.clear();
        }
        fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &Style) {
            self.lines.push((from, to, *style));
        }
    }

    fn style(hex: &str) -> Style {
        Style::new(hex.parse().unwrap(), 1.0)
    }

    fn custom_group(connections: Vec<Connection>, hex: &str) -> ConnectionGroup {
        ConnectionGroup {
            group: LandmarkGroup::RightEye,
            connections: Cow::Owned(connections),
            style: style(hex),
        }
    }

    fn result_with(faces: Vec<Vec<NormalizedPoint>>) -> DetectionResult {
        let blendshapes = vec![Vec::new(); faces.len()];
        DetectionResult { faces, blendshapes }
    }

    #[test]
    fn test_projection_matches_surface_size() {
        let mut surface = RecordingSurface { width: 640, height: 480, ..Default::default() };
        let face = vec![NormalizedPoint::new(0.1, 0.2, 0.0), NormalizedPoint::new(0.7, 0.9, 0.0)];
        let groups = vec![custom_group(vec![Connection::new(0, 1)], "#FF3030")];

        render(&mut surface, &result_with(vec![face]), &groups);

        assert_eq!(surface.lines.len(), 1);
        let (from, to, s) = surface.lines[0];
        assert_eq!(from, (0.1 * 640.0, 0.2 * 480.0));
        assert_eq!(to, (0.7 * 640.0, 0.9 * 480.0));
        assert_eq!(s.stroke_color, Color::rgb(0xFF, 0x30, 0x30));
    }

    #[test]
    fn test_short_landmark_set_skips_connections() {
        let mut surface = RecordingSurface { width: 100, height: 100, ..Default::default() };
        let face = vec![NormalizedPoint::default(); 10];
        // Real contour tables reference indices far beyond 10 points.
        let mut groups = vec![connections::group(LandmarkGroup::RightEye)];
        groups.push(custom_group(vec![Connection::new(0, 9), Connection::new(9, 10)], "#FFFFFF"));

        render(&mut surface, &result_with(vec![face]), &groups);

        assert_eq!(surface.lines.len(), 1);
    }

    #[test]
    fn test_zero_faces_draws_nothing() {
        let mut surface = RecordingSurface { width: 640, height: 480, ..Default::default() };
        let groups = connections::full_mesh_groups(Vec::new());
        render(&mut surface, &DetectionResult::default(), &groups);
        assert!(surface.lines.is_empty());
        assert_eq!(surface.clears, 1);
    }

    #[test]
    fn test_render_clears_previous_frame() {
        let mut surface = RecordingSurface { width: 10, height: 10, ..Default::default() };
        let face = vec![NormalizedPoint::default(); 2];
        let groups = vec![custom_group(vec![Connection::new(0, 1)], "#FFFFFF")];
        let result = result_with(vec![face]);

        render(&mut surface, &result, &groups);
        render(&mut surface, &result, &groups);
        assert_eq!(surface.lines.len(), 1);
        assert_eq!(surface.clears, 2);
    }

    #[test]
    fn test_group_order_and_every_face() {
        let mut surface = RecordingSurface { width: 10, height: 10, ..Default::default() };
        let face = vec![NormalizedPoint::default(); 2];
        let groups = vec![
            custom_group(vec![Connection::new(0, 1)], "#111111"),
            custom_group(vec![Connection::new(1, 0)], "#222222"),
        ];
        render(&mut surface, &result_with(vec![face.clone(), face]), &groups);

        let colors: Vec<String> = surface.lines.iter().map(|l| l.2.stroke_color.to_string()).collect();
        assert_eq!(colors, ["#111111", "#222222", "#111111", "#222222"]);
    }

    fn lattice_face(offset: f32) -> Vec<NormalizedPoint> {
        (0..MESH_POINT_COUNT)
            .map(|i| {
                let jitter = ((i * 7919) % 97) as f32 / 97.0 * 0.004;
                NormalizedPoint::new(
                    offset + 0.6 * (i % 22) as f32 / 21.0 + jitter,
                    0.1 + 0.8 * (i / 22) as f32 / 21.0 - jitter,
                    0.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_default_overlay_draws_mesh() {
        let mut surface = RecordingSurface { width: 640, height: 480, ..Default::default() };
        let mut renderer = OverlayRenderer::new(connections::full_mesh_groups(Vec::new()));
        assert!(renderer.groups()[0].connections.is_empty());

        renderer.render(&mut surface, &result_with(vec![lattice_face(0.2)]));

        let mesh = &renderer.groups()[0];
        assert_eq!(mesh.group, LandmarkGroup::Tesselation);
        assert!(!mesh.connections.is_empty());
        assert!(mesh.max_index().unwrap() < MESH_POINT_COUNT);
        let mesh_color = connections::default_style(LandmarkGroup::Tesselation).stroke_color;
        let mesh_lines = surface.lines.iter().filter(|l| l.2.stroke_color == mesh_color).count();
        assert_eq!(mesh_lines, mesh.connections.len());
    }

    #[test]
    fn test_derived_mesh_is_kept_across_frames() {
        let mut surface = RecordingSurface { width: 640, height: 480, ..Default::default() };
        let mut renderer = OverlayRenderer::new(connections::full_mesh_groups(Vec::new()));

        // Frames without a full mesh leave the tesselation pending.
        renderer.render(&mut surface, &result_with(vec![vec![NormalizedPoint::default(); 10]]));
        assert!(renderer.groups()[0].connections.is_empty());

        renderer.render(&mut surface, &result_with(vec![lattice_face(0.2)]));
        let first = renderer.groups()[0].connections.to_vec();
        renderer.render(&mut surface, &result_with(vec![lattice_face(0.1)]));
        assert_eq!(renderer.groups()[0].connections.to_vec(), first);
    }

    #[test]
    fn test_loaded_mesh_is_not_replaced() {
        let mut surface = RecordingSurface { width: 640, height: 480, ..Default::default() };
        let mut renderer = OverlayRenderer::new(connections::full_mesh_groups(vec![Connection::new(0, 1)]));
        renderer.render(&mut surface, &result_with(vec![lattice_face(0.2)]));
        assert_eq!(renderer.groups()[0].connections.len(), 1);
    }

    #[test]
    fn test_overlay_dimensions() {
        assert_eq!(overlay_dimensions(640, 480), (640, 480));
        assert_eq!(overlay_dimensions(1280, 720), (1280, 720));
        assert_eq!(overlay_dimensions(0, 480), (0, 0));
    }

    #[test]
    fn test_canvas_stroke_and_clear() {
        let mut canvas = Canvas::new(20, 20);
        assert!(canvas.is_blank());

        canvas.stroke_line((0.0, 10.0), (19.0, 10.0), &style("#FF0000"));
        assert_eq!(canvas.image().get_pixel(5, 10).0, [255, 0, 0, 255]);
        assert!(!canvas.is_blank());

        canvas.clear();
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_canvas_wide_stroke() {
        let mut canvas = Canvas::new(20, 20);
        canvas.stroke_line((0.0, 10.0), (19.0, 10.0), &Style::new(Color::rgb(0, 0, 255), 3.0));
        for y in 9..=11 {
            assert_eq!(canvas.image().get_pixel(5, y).0, [0, 0, 255, 255], "row {y}");
        }
        assert_eq!(canvas.image().get_pixel(5, 13).0[3], 0);
    }

    #[test]
    fn test_canvas_resize_clears() {
        let mut canvas = Canvas::new(8, 8);
        canvas.stroke_line((0.0, 0.0), (7.0, 7.0), &style("#FFFFFF"));
        canvas.resize(8, 8);
        assert!(canvas.is_blank());

        canvas.resize(16, 4);
        assert_eq!((canvas.width(), canvas.height()), (16, 4));
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_composite_over_frame() {
        let mut canvas = Canvas::new(4, 4);
        canvas.stroke_line((0.0, 0.0), (3.0, 0.0), &style("#00FF00"));
        let frame = vec![10u8; 4 * 4 * 3];

        let out = canvas.composite_over(&frame, 4, 4).unwrap();
        assert_eq!(out.get_pixel(1, 0).0, [0, 255, 0, 255]);
        assert_eq!(out.get_pixel(1, 2).0, [10, 10, 10, 255]);

        assert!(canvas.composite_over(&frame[..5], 4, 4).is_none());
    }
}
