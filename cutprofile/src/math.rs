use geo::geometry::{Coord, Rect};
use nalgebra::Vector3;
use tin::Coord3;

pub(crate) fn vector(c: Coord3) -> Vector3<f64> {
    Vector3::new(c.x, c.y, c.z)
}

pub(crate) fn coord3(v: Vector3<f64>) -> Coord3 {
    Coord3::new(v.x, v.y, v.z)
}

/// Point at fraction `t` along `a b`.
pub fn lerp(a: Coord3, b: Coord3, t: f64) -> Coord3 {
    Coord3::new(
        a.x + (b.x - a.x) * t,
        a.y + (b.y - a.y) * t,
        a.z + (b.z - a.z) * t,
    )
}

/// Upper bound on the number of chunks [`split_segment`] returns.
pub const MAX_CHUNKS: usize = 1 << 16;

/// Splits `p0 p1` into consecutive chunks no longer than
/// `max_length` in plan.
///
/// Segments that would need more than [`MAX_CHUNKS`] chunks get
/// longer ones. A non-finite length gives the segment back whole.
pub fn split_segment(p0: Coord3, p1: Coord3, max_length: f64) -> Vec<(Coord3, Coord3)> {
    let length = p0.distance_2d(&p1);
    if !length.is_finite() || length <= max_length {
        return vec![(p0, p1)];
    }
    let n = ((length / max_length).ceil() as usize).clamp(1, MAX_CHUNKS);
    (0..n)
        .map(|i| {
            let start = if i == 0 { p0 } else { lerp(p0, p1, i as f64 / n as f64) };
            let end = if i + 1 == n {
                p1
            } else {
                lerp(p0, p1, (i + 1) as f64 / n as f64)
            };
            (start, end)
        })
        .collect()
}

/// 3D distance from `p` to segment `a b`.
pub fn distance_to_segment(p: Coord3, a: Coord3, b: Coord3) -> f64 {
    let (p, a, b) = (vector(p), vector(a), vector(b));
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Bounding rectangle of two points.
pub fn envelope(a: Coord<f64>, b: Coord<f64>) -> Rect<f64> {
    Rect::new(a, b)
}

/// `p` moved by `distance` along the planar direction of `from -> to`.
pub fn step_towards(p: Coord<f64>, from: Coord<f64>, to: Coord<f64>, distance: f64) -> Coord<f64> {
    let d = to - from;
    let len = d.x.hypot(d.y);
    if len == 0.0 {
        return p;
    }
    p + d * (distance / len)
}
