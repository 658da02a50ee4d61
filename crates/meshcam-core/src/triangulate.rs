//! Incremental (Bowyer-Watson) Delaunay triangulation of 2D points.

/// Super-triangle size relative to the point cloud extent.
const SUPER_SCALE: f64 = 100.0;
const DEGENERATE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Triangle {
    fn new(v: [usize; 3], pts: &[(f64, f64)]) -> Self {
        let (ax, ay) = pts[v[0]];
        let (bx, by) = pts[v[1]];
        let (cx, cy) = pts[v[2]];
        let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
        if d.abs() < DEGENERATE_EPS {
            // Collinear: any later point replaces it.
            return Self {
                v,
                cx: 0.0,
                cy: 0.0,
                r2: f64::INFINITY,
            };
        }
        let (a2, b2, c2) = (ax * ax + ay * ay, bx * bx + by * by, cx * cx + cy * cy);
        let ux = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
        let uy = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;
        let r2 = (ax - ux).powi(2) + (ay - uy).powi(2);
        Self { v, cx: ux, cy: uy, r2 }
    }

    fn circumcircle_contains(&self, (x, y): (f64, f64)) -> bool {
        (x - self.cx).powi(2) + (y - self.cy).powi(2) < self.r2
    }

    fn is_degenerate(&self) -> bool {
        self.r2.is_infinite()
    }
}

/// Triangulate `points`, returning triangles as index triples into `points`.
///
/// Non-finite points are skipped. Fewer than three usable points yield no
/// triangles. Points coinciding with an earlier point are not inserted.
pub fn delaunay(points: &[(f64, f64)]) -> Vec<[usize; 3]> {
    let usable: Vec<usize> = (0..points.len())
        .filter(|&i| points[i].0.is_finite() && points[i].1.is_finite())
        .collect();
    if usable.len() < 3 {
        return Vec::new();
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for &i in &usable {
        let (x, y) = points[i];
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let extent = (max_x - min_x).max(max_y - min_y).max(1e-6) * SUPER_SCALE;
    let (mx, my) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    let n = points.len();
    let mut pts = points.to_vec();
    pts.push((mx - extent, my - extent));
    pts.push((mx, my + extent));
    pts.push((mx + extent, my - extent));

    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &pts)];

    for &i in &usable {
        let p = pts[i];
        let (bad, keep): (Vec<Triangle>, Vec<Triangle>) =
            triangles.into_iter().partition(|t| t.circumcircle_contains(p));
        triangles = keep;

        // Boundary of the cavity: edges used by exactly one bad triangle.
        let mut edges: Vec<(usize, usize)> = Vec::with_capacity(bad.len() * 3);
        for t in &bad {
            for k in 0..3 {
                let (a, b) = (t.v[k], t.v[(k + 1) % 3]);
                let key = (a.min(b), a.max(b));
                if let Some(pos) = edges.iter().position(|&e| e == key) {
                    edges.swap_remove(pos);
                } else {
                    edges.push(key);
                }
            }
        }

        for (a, b) in edges {
            triangles.push(Triangle::new([a, b, i], &pts));
        }
    }

    triangles
        .into_iter()
        .filter(|t| !t.is_degenerate() && t.v.iter().all(|&v| v < n))
        .map(|t| t.v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_count(triangles: &[[usize; 3]]) -> usize {
        let mut edges = std::collections::BTreeSet::new();
        for t in triangles {
            for k in 0..3 {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                edges.insert((a.min(b), a.max(b)));
            }
        }
        edges.len()
    }

    #[test]
    fn test_too_few_points() {
        assert!(delaunay(&[]).is_empty());
        assert!(delaunay(&[(0.0, 0.0), (1.0, 0.0)]).is_empty());
        assert!(delaunay(&[(0.0, 0.0), (1.0, 0.0), (f64::NAN, 1.0)]).is_empty());
    }

    #[test]
    fn test_single_triangle() {
        let tris = delaunay(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        assert_eq!(tris.len(), 1);
        let mut v = tris[0];
        v.sort_unstable();
        assert_eq!(v, [0, 1, 2]);
    }

    #[test]
    fn test_square_has_one_diagonal() {
        let tris = delaunay(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(tris.len(), 2);
        assert_eq!(edge_count(&tris), 5);
    }

    #[test]
    fn test_interior_point_fans_out() {
        let tris = delaunay(&[(0.0, 0.0), (4.0, 0.0), (2.0, 3.0), (2.0, 1.0)]);
        assert_eq!(tris.len(), 3);
        assert!(tris.iter().all(|t| t.contains(&3)));
    }

    #[test]
    fn test_empty_circumcircles() {
        // Jittered grid: no point may fall strictly inside any triangle's circumcircle.
        let pts: Vec<(f64, f64)> = (0..64)
            .map(|i| {
                let jitter = ((i * 7919) % 97) as f64 / 9700.0;
                ((i % 8) as f64 + jitter, (i / 8) as f64 - jitter)
            })
            .collect();
        let tris = delaunay(&pts);
        assert!(!tris.is_empty());
        for t in &tris {
            let circle = Triangle::new(*t, &pts);
            for (i, &p) in pts.iter().enumerate() {
                if t.contains(&i) {
                    continue;
                }
                let d2 = (p.0 - circle.cx).powi(2) + (p.1 - circle.cy).powi(2);
                assert!(d2 >= circle.r2 - 1e-9, "point {i} inside circumcircle of {t:?}");
            }
        }
        assert!(edge_count(&tris) > 2 * 64, "edges={}", edge_count(&tris));
    }
}
