//! Breakline insertion into a Delaunay triangulation.
//!
//! Edges crossing a breakline are flipped until the breakline is an
//! edge of the mesh (Sloan, 1993). The edges created on the way are
//! then flipped back towards Delaunay, leaving every breakline in
//! place.
//!
//! The mesh is kept in Delaunator's halfedge form: halfedge `e` runs
//! from `triangles[e]` to `triangles[next(e)]` and `halfedges[e]` is
//! its twin in the adjacent triangle, or `EMPTY` on the hull.

use crate::{
    geometry::{cross, in_circle, EPSILON},
    Coord3,
};
use delaunator::EMPTY;
use geo::geometry::Coord;
use log::warn;
use std::collections::{HashSet, VecDeque};

fn next(e: usize) -> usize {
    if e % 3 == 2 {
        e - 2
    } else {
        e + 1
    }
}

fn prev(e: usize) -> usize {
    if e % 3 == 0 {
        e + 2
    } else {
        e - 1
    }
}

fn key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Outcome of walking from one breakline end to the other.
enum Walk {
    /// Mesh edges properly crossed by the breakline.
    Crossing(Vec<(usize, usize)>),
    /// A vertex lying on the breakline.
    Through(usize),
    /// The breakline crosses another breakline or leaves the mesh.
    Blocked,
}

pub(crate) struct Constrainer<'a> {
    vertices: &'a [Coord3],
    triangles: Vec<usize>,
    halfedges: Vec<usize>,

    /// One outgoing halfedge per vertex, `EMPTY` for vertices the
    /// triangulation left out.
    outgoing: Vec<usize>,

    /// Breakline edges inserted so far.
    fixed: HashSet<(usize, usize)>,
}

impl<'a> Constrainer<'a> {
    pub(crate) fn new(
        vertices: &'a [Coord3],
        triangles: Vec<usize>,
        halfedges: Vec<usize>,
    ) -> Self {
        let mut outgoing = vec![EMPTY; vertices.len()];
        for (e, &v) in triangles.iter().enumerate() {
            outgoing[v] = e;
        }
        Self {
            vertices,
            triangles,
            halfedges,
            outgoing,
            fixed: HashSet::new(),
        }
    }

    pub(crate) fn finish(self) -> (Vec<usize>, Vec<usize>) {
        (self.triangles, self.halfedges)
    }

    fn xy(&self, v: usize) -> Coord<f64> {
        self.vertices[v].coord()
    }

    /// Side of `c` relative to the directed line `a b`: 1 on the left,
    /// -1 on the right, 0 when collinear.
    fn side(&self, a: usize, b: usize, c: usize) -> i8 {
        let d = cross(self.xy(a), self.xy(b), self.xy(c));
        if d > EPSILON {
            1
        } else if d < -EPSILON {
            -1
        } else {
            0
        }
    }

    /// Returns `true` if segments `p q` and `a b` cross at a point
    /// interior to both.
    fn crosses(&self, p: usize, q: usize, a: usize, b: usize) -> bool {
        self.side(a, b, p) * self.side(a, b, q) < 0
            && self.side(p, q, a) * self.side(p, q, b) < 0
    }

    fn link(&mut self, a: usize, b: usize) {
        self.halfedges[a] = b;
        if b != EMPTY {
            self.halfedges[b] = a;
        }
    }

    /// Halfedges leaving `v`.
    fn around(&self, v: usize) -> Vec<usize> {
        let start = self.outgoing[v];
        if start == EMPTY {
            return Vec::new();
        }
        let mut edges = vec![start];
        let mut e = start;
        for _ in 0..self.triangles.len() {
            let twin = self.halfedges[prev(e)];
            if twin == EMPTY {
                break;
            }
            if twin == start {
                return edges;
            }
            e = twin;
            edges.push(e);
        }
        // Hull vertex, sweep the other way too.
        let mut e = start;
        for _ in 0..self.triangles.len() {
            let twin = self.halfedges[e];
            if twin == EMPTY || next(twin) == start {
                break;
            }
            e = next(twin);
            edges.push(e);
        }
        edges
    }

    fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.around(a)
            .into_iter()
            .find(|&e| self.triangles[next(e)] == b)
    }

    /// Returns `true` if the two triangles sharing `e` form a strictly
    /// convex quadrilateral.
    fn is_convex(&self, e: usize) -> bool {
        let twin = self.halfedges[e];
        if twin == EMPTY {
            return false;
        }
        let (u, v) = (self.triangles[e], self.triangles[next(e)]);
        let (w, x) = (self.triangles[prev(e)], self.triangles[prev(twin)]);
        self.side(w, x, u) * self.side(w, x, v) < 0
    }

    fn is_locally_delaunay(&self, e: usize) -> bool {
        let twin = self.halfedges[e];
        if twin == EMPTY {
            return true;
        }
        let [u, v, w] = [e, next(e), prev(e)].map(|h| self.xy(self.triangles[h]));
        !in_circle(u, v, w, self.xy(self.triangles[prev(twin)]))
    }

    /// Replaces the diagonal `e` of its quadrilateral with the other
    /// one and returns the halfedge of the new diagonal.
    fn flip(&mut self, e: usize) -> usize {
        let (a0, a1, a2) = (e, next(e), prev(e));
        let b0 = self.halfedges[e];
        let (b1, b2) = (next(b0), prev(b0));

        let (u, v) = (self.triangles[a0], self.triangles[a1]);
        let (w, x) = (self.triangles[a2], self.triangles[b2]);
        let (outer_a, outer_b) = (self.halfedges[a2], self.halfedges[b2]);

        // (u, v, w) + (v, u, x) becomes (x, v, w) + (w, u, x).
        self.triangles[a0] = x;
        self.triangles[b0] = w;
        self.link(a0, outer_b);
        self.link(b0, outer_a);
        self.link(a2, b2);

        self.outgoing[x] = a0;
        self.outgoing[v] = a1;
        self.outgoing[w] = b0;
        self.outgoing[u] = b1;
        a2
    }

    fn walk(&self, a: usize, b: usize) -> Walk {
        let (pa, pb) = (self.xy(a), self.xy(b));
        let length2 = (pb.x - pa.x).powi(2) + (pb.y - pa.y).powi(2);
        let ahead = |v: usize| {
            let p = self.xy(v);
            let dot = (p.x - pa.x) * (pb.x - pa.x) + (p.y - pa.y) * (pb.y - pa.y);
            dot > 0.0 && dot < length2
        };

        let mut exit = None;
        for e in self.around(a) {
            let (p, q) = (self.triangles[next(e)], self.triangles[prev(e)]);
            if let Some(on_line) = [p, q]
                .into_iter()
                .find(|&v| self.side(a, b, v) == 0 && ahead(v))
            {
                return Walk::Through(on_line);
            }
            if self.crosses(p, q, a, b) {
                exit = Some(next(e));
                break;
            }
        }
        let Some(mut c) = exit else {
            return Walk::Blocked;
        };

        let mut edges = Vec::new();
        for _ in 0..self.triangles.len() {
            let (p, q) = (self.triangles[c], self.triangles[next(c)]);
            if self.fixed.contains(&key(p, q)) {
                return Walk::Blocked;
            }
            edges.push((p, q));

            let twin = self.halfedges[c];
            if twin == EMPTY {
                return Walk::Blocked;
            }
            let r = self.triangles[prev(twin)];
            if r == b {
                return Walk::Crossing(edges);
            }
            let side = self.side(a, b, r);
            if side == 0 {
                return Walk::Through(r);
            }
            // `twin` runs from `q` to `p`.
            c = if side == self.side(a, b, self.triangles[next(twin)]) {
                prev(twin)
            } else {
                next(twin)
            };
        }
        Walk::Blocked
    }

    /// Makes `a b` an edge of the mesh.
    pub(crate) fn insert(&mut self, a: usize, b: usize) {
        if a == b || self.outgoing[a] == EMPTY || self.outgoing[b] == EMPTY {
            return;
        }
        if self.find_edge(a, b).is_some() {
            self.fixed.insert(key(a, b));
            return;
        }

        let crossing = match self.walk(a, b) {
            Walk::Crossing(edges) => edges,
            Walk::Through(c) => {
                self.insert(a, c);
                self.insert(c, b);
                return;
            }
            Walk::Blocked => {
                warn!("skipping breakline ({a}, {b}): crosses another breakline");
                return;
            }
        };

        let mut queue = VecDeque::from(crossing);
        let mut created = Vec::new();
        let mut budget = 64 * (queue.len() + 1).pow(2);
        while let Some((u, v)) = queue.pop_front() {
            if budget == 0 {
                warn!("skipping breakline ({a}, {b}): flips did not converge");
                return;
            }
            budget -= 1;
            let Some(e) = self.find_edge(u, v) else {
                continue;
            };
            if !self.is_convex(e) {
                queue.push_back((u, v));
                continue;
            }
            let d = self.flip(e);
            let (w, x) = (self.triangles[d], self.triangles[next(d)]);
            if self.crosses(w, x, a, b) {
                queue.push_back((w, x));
            } else {
                created.push((w, x));
            }
        }
        self.fixed.insert(key(a, b));
        self.restore_delaunay(created);
    }

    fn restore_delaunay(&mut self, mut edges: Vec<(usize, usize)>) {
        for _ in 0..4 * edges.len() + 1 {
            let mut flipped = false;
            for edge in edges.iter_mut() {
                if self.fixed.contains(&key(edge.0, edge.1)) {
                    continue;
                }
                let Some(e) = self.find_edge(edge.0, edge.1) else {
                    continue;
                };
                if !self.is_locally_delaunay(e) && self.is_convex(e) {
                    let d = self.flip(e);
                    *edge = (self.triangles[d], self.triangles[next(d)]);
                    flipped = true;
                }
            }
            if !flipped {
                return;
            }
        }
    }
}
