//! Triangulated irregular network (TIN) built from elevation samples.
//!
//! The mesh answers two questions for the propagation engine:
//!
//! 1. What is the ground elevation under a planar coordinate?
//! 1. Which triangle edges does a straight line cross, and at what
//!    elevation? See [`Tin::trace`].
//!
//! Breaklines added with [`TinBuilder::add_line`] are kept as mesh
//! edges, so the ground follows them exactly.
//!
//! # References
//!
//! 1. [Delaunator](https://github.com/mapbox/delaunator)
//! 1. [Halfedge data structure](https://mapbox.github.io/delaunator/)
//! 1. Sloan, S. W. (1993). A fast algorithm for generating constrained
//!    Delaunay triangulations. Computers & Structures, 47(3), 441-450.

mod constrain;
mod coord;
mod error;
pub mod geometry;
mod trace;

pub use crate::{coord::Coord3, error::TinError, trace::Trace};
use crate::{
    constrain::Constrainer,
    geometry::{barycentric_error, interpolate_plane_z, point_in_triangle},
};
use geo::geometry::Coord;
use log::debug;
use std::collections::HashMap;
use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};

/// Half-width of the envelope used to look up triangles around a
/// query point.
const LOOKUP_RADIUS: f64 = 1.0;

type TriangleEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Accumulates elevation samples before triangulation.
#[derive(Debug, Clone, Default)]
pub struct TinBuilder {
    vertices: Vec<Coord3>,

    /// Vertex index pairs of the breaklines added with
    /// [`TinBuilder::add_line`].
    breaklines: Vec<[usize; 2]>,
}

impl TinBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an elevation sample. Unknown elevations are taken as 0.
    pub fn add_point(&mut self, point: Coord3) -> &mut Self {
        let z = if point.z.is_nan() { 0.0 } else { point.z };
        self.vertices.push(point.with_z(z));
        self
    }

    /// Adds every vertex of `line` and remembers its segments.
    pub fn add_line(&mut self, line: &[Coord3]) -> &mut Self {
        let first = self.vertices.len();
        for point in line {
            self.add_point(*point);
        }
        let last = self.vertices.len();
        self.breaklines
            .extend((first..last).zip(first + 1..last).map(|(a, b)| [a, b]));
        self
    }

    /// Number of samples added so far.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn breaklines(&self) -> &[[usize; 2]] {
        &self.breaklines
    }

    /// Triangulates the samples added so far.
    pub fn build(&self) -> Result<Tin, TinError> {
        if self.vertices.len() < 3 {
            return Err(TinError::NotEnoughVertices(self.vertices.len()));
        }
        if let Some(bad) = self
            .vertices
            .iter()
            .find(|v| !v.x.is_finite() || !v.y.is_finite())
        {
            return Err(TinError::NonFinite(bad.x, bad.y));
        }

        let now = std::time::Instant::now();

        // Coincident samples keep the first elevation given.
        let mut vertices: Vec<Coord3> = Vec::with_capacity(self.vertices.len());
        let mut seen: HashMap<[u64; 2], usize> = HashMap::new();
        let remap: Vec<usize> = self
            .vertices
            .iter()
            .map(|v| {
                let bits = [(v.x + 0.0).to_bits(), (v.y + 0.0).to_bits()];
                *seen.entry(bits).or_insert_with(|| {
                    vertices.push(*v);
                    vertices.len() - 1
                })
            })
            .collect();

        let points: Vec<delaunator::Point> = vertices
            .iter()
            .map(|v| delaunator::Point { x: v.x, y: v.y })
            .collect();
        let triangulation = delaunator::triangulate(&points);
        if triangulation.triangles.is_empty() {
            return Err(TinError::Degenerate(self.vertices.len()));
        }

        let mut constrainer =
            Constrainer::new(&vertices, triangulation.triangles, triangulation.halfedges);
        for [a, b] in &self.breaklines {
            constrainer.insert(remap[*a], remap[*b]);
        }
        let (corners, halfedges) = constrainer.finish();

        let triangles: Vec<[usize; 3]> = corners
            .chunks(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        // Edge `k` of triangle `t` is halfedge `3t + k`, running from
        // vertex `k` to vertex `(k + 1) % 3`.
        let neighbors: Vec<[Option<usize>; 3]> = halfedges
            .chunks(3)
            .map(|h| {
                let mut n = [None; 3];
                for (k, &opposite) in h.iter().enumerate() {
                    if opposite != delaunator::EMPTY {
                        n[k] = Some(opposite / 3);
                    }
                }
                n
            })
            .collect();

        let entries: Vec<TriangleEntry> = triangles
            .iter()
            .enumerate()
            .map(|(t, tri)| {
                let [a, b, c] = tri.map(|i| vertices[i]);
                let lower = [a.x.min(b.x).min(c.x), a.y.min(b.y).min(c.y)];
                let upper = [a.x.max(b.x).max(c.x), a.y.max(b.y).max(c.y)];
                GeomWithData::new(Rectangle::from_corners(lower, upper), t)
            })
            .collect();
        let index = RTree::bulk_load(entries);

        debug!(
            "tin; vertices: {}, breaklines: {}, triangles: {}, exec: {:?}",
            vertices.len(),
            self.breaklines.len(),
            triangles.len(),
            now.elapsed()
        );

        Ok(Tin {
            vertices,
            triangles,
            neighbors,
            index,
        })
    }
}

/// An immutable triangulated ground surface.
#[derive(Debug, Clone)]
pub struct Tin {
    /// Mesh vertices with their elevation.
    vertices: Vec<Coord3>,

    /// Vertex indices of each triangle.
    triangles: Vec<[usize; 3]>,

    /// Triangle across each edge, `None` on the mesh boundary.
    neighbors: Vec<[Option<usize>; 3]>,

    /// Triangle bounding boxes.
    index: RTree<TriangleEntry>,
}

impl Tin {
    pub fn vertices(&self) -> &[Coord3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn neighbors(&self) -> &[[Option<usize>; 3]] {
        &self.neighbors
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Corner vertices of triangle `t`.
    pub fn triangle(&self, t: usize) -> [Coord3; 3] {
        self.triangles[t].map(|i| self.vertices[i])
    }

    /// Returns `true` if triangle `t` contains `p`.
    pub fn contains(&self, t: usize, p: Coord<f64>) -> bool {
        let [a, b, c] = self.triangle(t);
        point_in_triangle(p, a.coord(), b.coord(), c.coord())
    }

    /// Elevation of triangle `t`'s plane above `p`.
    pub fn plane_z(&self, t: usize, p: Coord<f64>) -> f64 {
        let [a, b, c] = self.triangle(t);
        interpolate_plane_z(p, a, b, c)
    }

    /// Finds the triangle closest to containing `p`.
    ///
    /// `hint` is tried first and returned as is when it contains `p`.
    /// Otherwise every triangle whose bounding box lies within one
    /// meter of `p` is scored by its barycentric error and the best
    /// one wins, which may be a triangle slightly off `p`.
    pub fn locate(&self, p: Coord<f64>, hint: Option<usize>) -> Option<usize> {
        if let Some(t) = hint.filter(|&t| t < self.triangles.len()) {
            if self.contains(t, p) {
                return Some(t);
            }
        }
        let envelope = AABB::from_corners(
            [p.x - LOOKUP_RADIUS, p.y - LOOKUP_RADIUS],
            [p.x + LOOKUP_RADIUS, p.y + LOOKUP_RADIUS],
        );
        self.index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| {
                let [a, b, c] = self.triangle(entry.data);
                (
                    entry.data,
                    barycentric_error(p, a.coord(), b.coord(), c.coord()),
                )
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(t, _)| t)
    }

    /// Ground elevation at `p`, or 0 outside the mesh.
    pub fn elevation(&self, p: Coord<f64>) -> f64 {
        let mut hint = None;
        self.elevation_with_hint(p, &mut hint)
    }

    /// Ground elevation at `p`, or 0 outside the mesh.
    ///
    /// `hint` holds the last triangle found and is updated so that
    /// successive queries along a path stay cheap.
    pub fn elevation_with_hint(&self, p: Coord<f64>, hint: &mut Option<usize>) -> f64 {
        match self.locate(p, *hint) {
            Some(t) if self.contains(t, p) => {
                *hint = Some(t);
                self.plane_z(t, p)
            }
            _ => 0.0,
        }
    }

    /// Triangles whose bounding box intersects the box spanned by
    /// `min` and `max`.
    pub(crate) fn candidates(
        &self,
        min: Coord<f64>,
        max: Coord<f64>,
    ) -> impl Iterator<Item = usize> + '_ {
        let envelope = AABB::from_corners([min.x, min.y], [max.x, max.y]);
        self.index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
    }
}

#[cfg(test)]
mod tests {
    use super::{Coord, Coord3, TinBuilder, TinError};
    use approx::assert_relative_eq;

    /// Two triangles covering the square [0, 100]² on the plane
    /// `z = x / 10`.
    pub(crate) fn ramp() -> super::Tin {
        let mut builder = TinBuilder::new();
        builder
            .add_point(Coord3::new(0.0, 0.0, 0.0))
            .add_point(Coord3::new(100.0, 0.0, 10.0))
            .add_point(Coord3::new(100.0, 100.0, 10.0))
            .add_point(Coord3::new(0.0, 100.0, 0.0));
        builder.build().unwrap()
    }

    #[test]
    fn test_build_requires_three_vertices() {
        let mut builder = TinBuilder::new();
        builder
            .add_point(Coord3::new(0.0, 0.0, 0.0))
            .add_point(Coord3::new(1.0, 0.0, 0.0));
        assert!(matches!(
            builder.build(),
            Err(TinError::NotEnoughVertices(2))
        ));
    }

    #[test]
    fn test_build_rejects_collinear() {
        let mut builder = TinBuilder::new();
        builder.add_line(&[
            Coord3::new(0.0, 0.0, 0.0),
            Coord3::new(1.0, 0.0, 0.0),
            Coord3::new(2.0, 0.0, 0.0),
        ]);
        assert_eq!(builder.breaklines(), &[[0, 1], [1, 2]]);
        assert!(matches!(builder.build(), Err(TinError::Degenerate(3))));
    }

    #[test]
    fn test_unknown_z_becomes_zero() {
        let mut builder = TinBuilder::new();
        builder.add_point(Coord3::flat(0.0, 0.0));
        assert_eq!(builder.len(), 1);
        let mut builder = builder.clone();
        builder
            .add_point(Coord3::new(10.0, 0.0, 0.0))
            .add_point(Coord3::new(0.0, 10.0, 0.0));
        let tin = builder.build().unwrap();
        assert_relative_eq!(tin.elevation(Coord { x: 1.0, y: 1.0 }), 0.0);
    }

    #[test]
    fn test_neighbors_are_symmetric() {
        let tin = ramp();
        assert_eq!(tin.len(), 2);
        for (t, neighbors) in tin.neighbors().iter().enumerate() {
            for n in neighbors.iter().flatten() {
                assert!(tin.neighbors()[*n].contains(&Some(t)));
            }
        }
    }

    #[test]
    fn test_elevation() {
        let tin = ramp();
        assert_relative_eq!(tin.elevation(Coord { x: 50.0, y: 20.0 }), 5.0);
        assert_relative_eq!(tin.elevation(Coord { x: 25.0, y: 90.0 }), 2.5);
        assert_relative_eq!(tin.elevation(Coord { x: 150.0, y: 50.0 }), 0.0);
    }

    fn has_edge(tin: &super::Tin, a: usize, b: usize) -> bool {
        tin.triangles()
            .iter()
            .any(|t| t.contains(&a) && t.contains(&b))
    }

    #[test]
    fn test_breakline_elevation() {
        let mut builder = TinBuilder::new();
        builder
            .add_line(&[Coord3::new(0.0, 5.0, 10.0), Coord3::new(10.0, 5.0, 10.0)])
            .add_point(Coord3::new(5.0, 4.5, 0.0))
            .add_point(Coord3::new(5.0, 5.5, 0.0));
        let tin = builder.build().unwrap();
        assert!(has_edge(&tin, 0, 1));
        assert!(!has_edge(&tin, 2, 3));
        assert_relative_eq!(tin.elevation(Coord { x: 5.0, y: 5.0 }), 10.0, epsilon = 1e-9);
        assert_relative_eq!(tin.elevation(Coord { x: 2.0, y: 5.0 }), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_breakline_across_grid() {
        let mut builder = TinBuilder::new();
        for i in 0..=10 {
            for j in 0..=10 {
                builder.add_point(Coord3::new(i as f64, j as f64, 0.0));
            }
        }
        // 121 lies on the breakline, which is split there.
        builder
            .add_point(Coord3::new(5.0, 3.5, 3.0))
            .add_line(&[Coord3::new(0.5, 0.5, 3.0), Coord3::new(9.5, 6.5, 3.0)]);
        let tin = builder.build().unwrap();
        assert!(has_edge(&tin, 122, 121));
        assert!(has_edge(&tin, 121, 123));

        for t in [0.05, 0.2, 0.37, 0.5, 0.64, 0.81, 0.95] {
            let p = Coord {
                x: 0.5 + 9.0 * t,
                y: 0.5 + 6.0 * t,
            };
            assert_relative_eq!(tin.elevation(p), 3.0, epsilon = 1e-9);
        }
        assert_relative_eq!(tin.elevation(Coord { x: 1.0, y: 9.5 }), 0.0);
        for (t, neighbors) in tin.neighbors().iter().enumerate() {
            for n in neighbors.iter().flatten() {
                assert!(tin.neighbors()[*n].contains(&Some(t)));
            }
        }
    }

    #[test]
    fn test_crossing_breaklines_keep_the_first() {
        let mut builder = TinBuilder::new();
        builder
            .add_line(&[Coord3::new(0.0, 0.0, 10.0), Coord3::new(10.0, 10.0, 10.0)])
            .add_line(&[Coord3::new(0.0, 10.0, 0.0), Coord3::new(10.0, 0.0, 0.0)]);
        let tin = builder.build().unwrap();
        assert_eq!(tin.len(), 2);
        assert!(has_edge(&tin, 0, 1));
        assert!(!has_edge(&tin, 2, 3));
        assert_relative_eq!(tin.elevation(Coord { x: 5.0, y: 5.0 }), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_coincident_samples_are_merged() {
        let mut builder = TinBuilder::new();
        builder
            .add_line(&[Coord3::new(0.0, 0.0, 4.0), Coord3::new(10.0, 0.0, 4.0)])
            .add_line(&[Coord3::new(10.0, 0.0, 9.0), Coord3::new(0.0, 10.0, 4.0)])
            .add_point(Coord3::new(-0.0, 0.0, 1.0));
        let tin = builder.build().unwrap();
        assert_eq!(tin.vertices().len(), 3);
        assert_eq!(tin.len(), 1);
        assert_relative_eq!(tin.elevation(Coord { x: 5.0, y: 0.0 }), 4.0);
    }

    #[test]
    fn test_elevation_hint_is_updated() {
        let tin = ramp();
        let mut hint = None;
        let z = tin.elevation_with_hint(Coord { x: 70.0, y: 10.0 }, &mut hint);
        assert_relative_eq!(z, 7.0);
        let t = hint.unwrap();
        assert!(tin.contains(t, Coord { x: 70.0, y: 10.0 }));

        // A stale hint still gives the right answer.
        let z = tin.elevation_with_hint(Coord { x: 10.0, y: 90.0 }, &mut hint);
        assert_relative_eq!(z, 1.0);
    }
}
