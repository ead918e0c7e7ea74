//! Planar predicates and elevation interpolation.

use crate::Coord3;
use geo::{
    algorithm::line_intersection::{line_intersection, LineIntersection},
    geometry::{Coord, Line},
};

/// Tolerance used by triangle containment and segment crossing tests.
pub const EPSILON: f64 = 1e-7;

/// Twice the signed area of triangle `oab`, positive when
/// counterclockwise.
pub fn cross(o: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Returns `true` if `d` lies strictly inside the circumcircle of
/// triangle `abc`, whatever its winding.
pub fn in_circle(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>, d: Coord<f64>) -> bool {
    let (adx, ady) = (a.x - d.x, a.y - d.y);
    let (bdx, bdy) = (b.x - d.x, b.y - d.y);
    let (cdx, cdy) = (c.x - d.x, c.y - d.y);
    let det = (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
        - (bdx * bdx + bdy * bdy) * (adx * cdy - cdx * ady)
        + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady);
    det * cross(a, b, c).signum() > EPSILON
}

/// Returns `true` if `p` lies inside or on the border of triangle
/// `abc`, whatever its winding.
pub fn point_in_triangle(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> bool {
    let d1 = cross(a, b, p);
    let d2 = cross(b, c, p);
    let d3 = cross(c, a, p);
    let has_neg = d1 < -EPSILON || d2 < -EPSILON || d3 < -EPSILON;
    let has_pos = d1 > EPSILON || d2 > EPSILON || d3 > EPSILON;
    !(has_neg && has_pos)
}

/// Sum of the negative barycentric weights of `p` in triangle `abc`.
///
/// Zero for points inside the triangle, growing as `p` moves away
/// from it. Degenerate triangles report `f64::INFINITY`.
pub fn barycentric_error(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
    let area = cross(a, b, c);
    if area == 0.0 {
        return f64::INFINITY;
    }
    let u = cross(b, c, p) / area;
    let v = cross(c, a, p) / area;
    let w = 1.0 - u - v;
    [u, v, w].iter().map(|l| (-l).max(0.0)).sum()
}

/// Elevation of the plane through `v0`, `v1`, `v2` above `p`.
pub fn interpolate_plane_z(p: Coord<f64>, v0: Coord3, v1: Coord3, v2: Coord3) -> f64 {
    let x0 = p.x - v0.x;
    let y0 = p.y - v0.y;
    let a = v1.x - v0.x;
    let b = v2.x - v0.x;
    let c = v1.y - v0.y;
    let d = v2.y - v0.y;
    let det = a * d - b * c;
    if det == 0.0 {
        return v0.z;
    }
    let dx = (d * x0 - b * y0) / det;
    let dy = (-c * x0 + a * y0) / det;
    v0.z + dx * (v1.z - v0.z) + dy * (v2.z - v0.z)
}

/// Elevation along segment `p0 p1` at the planar distance of `p`
/// from `p0`.
pub fn interpolate_segment_z(p: Coord<f64>, p0: Coord3, p1: Coord3) -> f64 {
    let length = p0.distance_2d(&p1);
    if length == 0.0 {
        return p0.z;
    }
    let t = (p.x - p0.x).hypot(p.y - p0.y) / length;
    p0.z + (p1.z - p0.z) * t
}

/// Closest point to `p` on segment `line`.
pub fn project_on_segment(p: Coord<f64>, line: Line<f64>) -> Coord<f64> {
    let d = line.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return line.start;
    }
    let t = (((p.x - line.start.x) * d.x + (p.y - line.start.y) * d.y) / len2).clamp(0.0, 1.0);
    Coord {
        x: line.start.x + t * d.x,
        y: line.start.y + t * d.y,
    }
}

/// Point of `edge` where `ray` crosses or passes within `EPSILON`
/// of it.
///
/// For collinear overlaps the overlap end nearest to the ray's end is
/// returned.
pub fn segment_crossing(ray: Line<f64>, edge: Line<f64>) -> Option<Coord<f64>> {
    match line_intersection(ray, edge) {
        Some(LineIntersection::SinglePoint { intersection, .. }) => Some(intersection),
        Some(LineIntersection::Collinear { intersection }) => {
            let target = ray.end;
            let d = |c: Coord<f64>| (c.x - target.x).hypot(c.y - target.y);
            if d(intersection.start) <= d(intersection.end) {
                Some(intersection.start)
            } else {
                Some(intersection.end)
            }
        }
        None => {
            // Near misses at shared vertices.
            let candidates = [
                (edge.start, project_on_segment(edge.start, ray)),
                (edge.end, project_on_segment(edge.end, ray)),
                (project_on_segment(ray.start, edge), ray.start),
                (project_on_segment(ray.end, edge), ray.end),
            ];
            candidates
                .into_iter()
                .map(|(on_edge, on_ray)| {
                    (on_edge, (on_edge.x - on_ray.x).hypot(on_edge.y - on_ray.y))
                })
                .filter(|(_, dist)| *dist < EPSILON)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(on_edge, _)| on_edge)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_point_in_triangle_either_winding() {
        let (a, b, cc) = (c(0.0, 0.0), c(10.0, 0.0), c(0.0, 10.0));
        assert!(point_in_triangle(c(1.0, 1.0), a, b, cc));
        assert!(point_in_triangle(c(1.0, 1.0), a, cc, b));
        assert!(point_in_triangle(c(5.0, 0.0), a, b, cc));
        assert!(!point_in_triangle(c(6.0, 6.0), a, b, cc));
    }

    #[test]
    fn test_barycentric_error() {
        let (a, b, cc) = (c(0.0, 0.0), c(10.0, 0.0), c(0.0, 10.0));
        assert_relative_eq!(barycentric_error(c(2.0, 2.0), a, b, cc), 0.0);
        assert!(barycentric_error(c(12.0, 2.0), a, b, cc) > 0.0);
        assert!(barycentric_error(c(1.0, 1.0), a, a, cc).is_infinite());
    }

    #[test]
    fn test_in_circle() {
        let (a, b, cc) = (c(0.0, 0.0), c(10.0, 0.0), c(0.0, 10.0));
        assert!(in_circle(a, b, cc, c(9.0, 9.0)));
        assert!(in_circle(cc, b, a, c(9.0, 9.0)));
        assert!(!in_circle(a, b, cc, c(11.0, 11.0)));
        // Cocircular points are not inside.
        assert!(!in_circle(a, b, cc, c(10.0, 10.0)));
    }

    #[test]
    fn test_interpolate_plane_z() {
        let v0 = Coord3::new(0.0, 0.0, 0.0);
        let v1 = Coord3::new(10.0, 0.0, 10.0);
        let v2 = Coord3::new(0.0, 10.0, 20.0);
        assert_relative_eq!(interpolate_plane_z(c(5.0, 0.0), v0, v1, v2), 5.0);
        assert_relative_eq!(interpolate_plane_z(c(2.0, 3.0), v0, v1, v2), 8.0);
    }

    #[test]
    fn test_interpolate_segment_z() {
        let p0 = Coord3::new(0.0, 0.0, 10.0);
        let p1 = Coord3::new(0.0, 4.0, 30.0);
        assert_relative_eq!(interpolate_segment_z(c(0.0, 1.0), p0, p1), 15.0);
        assert_relative_eq!(interpolate_segment_z(c(0.0, 0.0), p0, p0), 10.0);
    }

    #[test]
    fn test_segment_crossing() {
        let ray = Line::new(c(0.0, 0.0), c(10.0, 0.0));
        let edge = Line::new(c(5.0, -1.0), c(5.0, 1.0));
        assert_eq!(segment_crossing(ray, edge), Some(c(5.0, 0.0)));

        let miss = Line::new(c(5.0, 1.0), c(5.0, 2.0));
        assert_eq!(segment_crossing(ray, miss), None);

        let grazing = Line::new(c(5.0, 1e-9), c(6.0, 3.0));
        assert_eq!(segment_crossing(ray, grazing), Some(c(5.0, 1e-9)));
    }
}
