use crate::{
    geometry::{interpolate_segment_z, segment_crossing, EPSILON},
    Coord3, Tin,
};
use geo::geometry::{Coord, Line};
use log::trace;
use std::collections::HashSet;

/// Ground crossings along a straight line over a [`Tin`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Start point, every triangle edge crossing and end point, each
    /// at ground elevation. Empty when the line never touches the
    /// mesh.
    pub points: Vec<Coord3>,

    /// `false` if the straight 3D line dips below the ground at some
    /// crossing.
    pub free_field: bool,
}

impl Tin {
    /// Walks the triangles crossed by the segment `p1 p2`.
    ///
    /// The elevations of `p1` and `p2` define the 3D line checked
    /// against the ground at every edge crossing. With
    /// `stop_on_obstruction`, the walk ends at the first crossing
    /// where the ground is above that line.
    ///
    /// A `p1` outside the mesh starts the walk at the first boundary
    /// crossing. When the walk leaves the mesh before `p2`, the exit
    /// crossing is recorded and `p2` takes its elevation.
    pub fn trace(&self, p1: Coord3, p2: Coord3, stop_on_obstruction: bool) -> Trace {
        let ray = Line::new(p1.coord(), p2.coord());
        let mut trace = Trace {
            points: Vec::new(),
            free_field: true,
        };

        let (mut current, start) = match self.locate(ray.start, None) {
            Some(t) if self.contains(t, ray.start) => {
                (t, Coord3::new(p1.x, p1.y, self.plane_z(t, ray.start)))
            }
            _ => match self.first_crossing(ray) {
                Some(entry) => entry,
                None => {
                    trace!("trace; {:?} -> {:?} misses the mesh", p1, p2);
                    return trace;
                }
            },
        };
        trace.points.push(start);

        let mut visited = HashSet::from([current]);
        loop {
            if self.contains(current, ray.end) {
                trace.points.push(p2.with_z(self.plane_z(current, ray.end)));
                break;
            }
            let Some((crossing, next)) = self.next_triangle(current, ray, &visited) else {
                trace.points.push(p2.with_z(self.plane_z(current, ray.end)));
                break;
            };
            if trace
                .points
                .last()
                .map_or(true, |last| last.distance_2d(&crossing) >= EPSILON)
            {
                trace.points.push(crossing);
            }
            if interpolate_segment_z(crossing.coord(), p1, p2) < crossing.z {
                trace.free_field = false;
                if stop_on_obstruction {
                    return trace;
                }
            }
            match next {
                Some(t) => {
                    visited.insert(t);
                    current = t;
                }
                None => {
                    trace.points.push(p2.with_z(crossing.z));
                    break;
                }
            }
        }
        trace
    }

    /// Crossing of `ray` with an edge of triangle `t`, nearest to the
    /// ray's end, together with the triangle across that edge.
    ///
    /// Edges leading back to an already visited triangle are skipped.
    fn next_triangle(
        &self,
        t: usize,
        ray: Line<f64>,
        visited: &HashSet<usize>,
    ) -> Option<(Coord3, Option<usize>)> {
        let corners = self.triangle(t);
        let target = ray.end;
        (0..3)
            .filter(|&k| !self.neighbors[t][k].map_or(false, |n| visited.contains(&n)))
            .filter_map(|k| {
                let (a, b) = (corners[k], corners[(k + 1) % 3]);
                segment_crossing(ray, Line::new(a.coord(), b.coord())).map(|c| {
                    let crossing = Coord3::new(c.x, c.y, interpolate_segment_z(c, a, b));
                    (crossing, self.neighbors[t][k])
                })
            })
            .min_by(|a, b| distance(a.0.coord(), target).total_cmp(&distance(b.0.coord(), target)))
    }

    /// Boundary edge crossing nearest to the start of `ray`, with the
    /// triangle it enters.
    fn first_crossing(&self, ray: Line<f64>) -> Option<(usize, Coord3)> {
        let min = Coord {
            x: ray.start.x.min(ray.end.x),
            y: ray.start.y.min(ray.end.y),
        };
        let max = Coord {
            x: ray.start.x.max(ray.end.x),
            y: ray.start.y.max(ray.end.y),
        };
        let mut best: Option<(usize, Coord3, f64)> = None;
        for t in self.candidates(min, max) {
            let corners = self.triangle(t);
            for k in (0..3).filter(|&k| self.neighbors[t][k].is_none()) {
                let (a, b) = (corners[k], corners[(k + 1) % 3]);
                if let Some(c) = segment_crossing(ray, Line::new(a.coord(), b.coord())) {
                    let d = distance(c, ray.start);
                    if best.map_or(true, |(bt, _, bd)| d < bd || (d == bd && t < bt)) {
                        best = Some((t, Coord3::new(c.x, c.y, interpolate_segment_z(c, a, b)), d));
                    }
                }
            }
        }
        best.map(|(t, c, _)| (t, c))
    }
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}
