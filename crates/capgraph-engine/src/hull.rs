use serde::Serialize;
use std::fmt::Write as _;

pub type Point = (f64, f64);

const EPS: f64 = 1e-9;
const CURVE_SAMPLES: usize = 8;

/// Padded cluster outline ready for overlay rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterHull {
    pub outline: Vec<Point>,
    pub path_d: String,
}

/// Monotone-chain convex hull in counterclockwise order. Fewer than three
/// distinct points come back as-is (sorted, deduplicated).
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| p.0.is_finite() && p.1.is_finite())
        .collect();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Expand a cluster's point set into an outline that encloses, rather than
/// touches, its members. Zero or one points give an empty outline; two give a
/// padded capsule rectangle; otherwise the convex hull is pushed outward by
/// `padding` along each vertex's angle bisector.
pub fn cluster_outline(points: &[Point], padding: f64) -> Vec<Point> {
    let hull = convex_hull(points);
    match hull.len() {
        0 | 1 => Vec::new(),
        2 => capsule(hull[0], hull[1], padding),
        _ => expand_hull(&hull, padding),
    }
}

/// Smooth variant: the expanded outline interpolated through a closed
/// quadratic midpoint curve. Pure aesthetics on top of `cluster_outline`.
pub fn smooth_cluster_outline(points: &[Point], padding: f64) -> Vec<Point> {
    smooth_closed(&cluster_outline(points, padding))
}

pub fn cluster_hull(points: &[Point], padding: f64) -> Option<ClusterHull> {
    let outline = cluster_outline(points, padding);
    if outline.is_empty() {
        return None;
    }
    let path_d = closed_path_d(&outline);
    Some(ClusterHull { outline, path_d })
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn expand_hull(hull: &[Point], padding: f64) -> Vec<Point> {
    let n = hull.len();
    (0..n)
        .map(|i| {
            let prev = hull[(i + n - 1) % n];
            let cur = hull[i];
            let next = hull[(i + 1) % n];
            let n1 = edge_normal(prev, cur);
            let n2 = edge_normal(cur, next);

            let (mut bx, mut by) = (n1.0 + n2.0, n1.1 + n2.1);
            let blen = (bx * bx + by * by).sqrt();
            if blen < EPS {
                bx = n1.0;
                by = n1.1;
            } else {
                bx /= blen;
                by /= blen;
            }
            // miter length keeps the offset edges `padding` away even at
            // sharp corners
            let cos_half = ((1.0 + n1.0 * n2.0 + n1.1 * n2.1) / 2.0).max(0.01).sqrt();
            let scale = padding / cos_half;
            (cur.0 + bx * scale, cur.1 + by * scale)
        })
        .collect()
}

/// Outward unit normal of one counterclockwise hull edge.
fn edge_normal(from: Point, to: Point) -> Point {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let len = (dx * dx + dy * dy).sqrt().max(EPS);
    (dy / len, -dx / len)
}

fn capsule(a: Point, b: Point, padding: f64) -> Vec<Point> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len = (dx * dx + dy * dy).sqrt().max(EPS);
    let (ux, uy) = (dx / len, dy / len);
    let (nx, ny) = (-uy, ux);
    let (sx, sy) = (a.0 - ux * padding, a.1 - uy * padding);
    let (ex, ey) = (b.0 + ux * padding, b.1 + uy * padding);
    vec![
        (sx - nx * padding, sy - ny * padding),
        (ex - nx * padding, ey - ny * padding),
        (ex + nx * padding, ey + ny * padding),
        (sx + nx * padding, sy + ny * padding),
    ]
}

fn smooth_closed(outline: &[Point]) -> Vec<Point> {
    let n = outline.len();
    if n < 3 {
        return outline.to_vec();
    }
    let mut out = Vec::with_capacity(n * CURVE_SAMPLES);
    for i in 0..n {
        let prev = outline[(i + n - 1) % n];
        let ctrl = outline[i];
        let next = outline[(i + 1) % n];
        let start = midpoint(prev, ctrl);
        let end = midpoint(ctrl, next);
        for step in 0..CURVE_SAMPLES {
            let t = step as f64 / CURVE_SAMPLES as f64;
            out.push(quad_point(start, ctrl, end, t));
        }
    }
    out
}

/// Closed quadratic path through edge midpoints, each vertex acting as the
/// control point of its corner.
fn closed_path_d(outline: &[Point]) -> String {
    let n = outline.len();
    let mut d = String::new();
    if n < 3 {
        if let [a, b] = outline {
            let _ = write!(d, "M{:.2},{:.2} L{:.2},{:.2} Z", a.0, a.1, b.0, b.1);
        }
        return d;
    }
    let first_mid = midpoint(outline[n - 1], outline[0]);
    let _ = write!(d, "M{:.2},{:.2}", first_mid.0, first_mid.1);
    for i in 0..n {
        let ctrl = outline[i];
        let mid = midpoint(ctrl, outline[(i + 1) % n]);
        let _ = write!(d, " Q{:.2},{:.2} {:.2},{:.2}", ctrl.0, ctrl.1, mid.0, mid.1);
    }
    d.push_str(" Z");
    d
}

fn midpoint(a: Point, b: Point) -> Point {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

fn quad_point(start: Point, ctrl: Point, end: Point, t: f64) -> Point {
    let u = 1.0 - t;
    (
        u * u * start.0 + 2.0 * u * t * ctrl.0 + t * t * end.0,
        u * u * start.1 + 2.0 * u * t * ctrl.1 + t * t * end.1,
    )
}
