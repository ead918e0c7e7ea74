use geo::{geometry::LineString, Winding};
use std::f64::consts::PI;
use tin::Coord3;

/// Distance (meters) corner points are pushed away from their
/// obstacle, horizontally and upward.
pub const WIDE_ANGLE_EPSILON: f64 = 0.015;

/// Corners of a closed `ring` whose free-field opening angle lies
/// strictly inside `range`, each moved [`WIDE_ANGLE_EPSILON`] outward
/// along its bisector and up.
///
/// The ring is read counter-clockwise whatever its stored winding.
/// The result is closed (first point repeated) unless empty.
pub fn wide_angle_points(ring: &[Coord3], range: (f64, f64)) -> Vec<Coord3> {
    if ring.len() < 4 {
        return Vec::new();
    }
    let mut ring = ring.to_vec();
    let line = LineString::from(ring.iter().map(Coord3::coord).collect::<Vec<_>>());
    if line.is_cw() {
        ring.reverse();
    }

    let n = ring.len() - 1;
    let mut corners = Vec::with_capacity(ring.len());
    for i in 0..n {
        let prev = ring[if i > 0 { i - 1 } else { n - 1 }];
        let vertex = ring[i];
        let next = ring[i + 1];

        let to_prev = (prev.y - vertex.y).atan2(prev.x - vertex.x);
        let to_next = (next.y - vertex.y).atan2(next.x - vertex.x);
        let mut open = normalize_angle(to_next - to_prev);
        if open < 0.0 {
            open += 2.0 * PI;
        }

        if open > range.0 && open < range.1 {
            let bisector = to_prev + open / 2.0;
            corners.push(Coord3::new(
                vertex.x + bisector.cos() * WIDE_ANGLE_EPSILON,
                vertex.y + bisector.sin() * WIDE_ANGLE_EPSILON,
                vertex.z + WIDE_ANGLE_EPSILON,
            ));
        }
    }
    if let Some(first) = corners.first().copied() {
        corners.push(first);
    }
    corners
}

/// Wraps `angle` into `(-π, π]`.
fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}
