//! Corner candidates for lateral diffraction around obstacles.

use crate::{
    math::{coord3, envelope, lerp, split_segment, vector},
    obstacle::ObstacleKind,
    wide_angle::WIDE_ANGLE_EPSILON,
    Scene,
};
use geo::{
    geometry::{Coord, Line},
    kernels::{Kernel, Orientation, RobustKernel},
    Intersects,
};
use log::error;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, f64::consts::FRAC_PI_2, ops::ControlFlow};
use tin::Coord3;

/// Side of a directed line, looking from its start towards its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Obstacle contributing corners to a side hull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Obstacle {
    /// Index into [`Scene::buildings`].
    Building(usize),
    /// Index into [`Scene::walls`].
    Wall(usize),
}

/// Corner points of one obstacle, lying on the cut plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub obstacle: Obstacle,
    pub corners: Vec<Coord3>,
}

/// Plane holding a source to receiver line and its horizontal
/// perpendicular.
///
/// Points with a non negative offset are on or above the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    origin: Vector3<f64>,
    normal: Vector3<f64>,
}

impl CutPlane {
    /// Returns `None` when `s` and `r` share the same plan position.
    pub fn through(s: Coord3, r: Coord3) -> Option<Self> {
        if s.coord() == r.coord() {
            return None;
        }
        let angle = (r.y - s.y).atan2(r.x - s.x);
        let s = vector(s);
        let r = vector(r);
        let r_prime = s + Vector3::new((angle - FRAC_PI_2).cos(), (angle - FRAC_PI_2).sin(), 0.0);
        let mut normal = (s - r).cross(&(r_prime - r)).try_normalize(f64::EPSILON)?;
        if normal.z < 0.0 {
            normal = -normal;
        }
        Some(Self { origin: r, normal })
    }

    pub fn normal(&self) -> Coord3 {
        coord3(self.normal)
    }

    /// Signed distance from the plane to `p`.
    pub fn offset(&self, p: Coord3) -> f64 {
        self.normal.dot(&(vector(p) - self.origin))
    }

    /// Point of the plane vertically above or below `p`.
    pub fn vertical_projection(&self, p: Coord3) -> Option<Coord3> {
        if self.normal.z.abs() < f64::EPSILON {
            return None;
        }
        let n = self.normal;
        let z = self.origin.z - (n.x * (p.x - self.origin.x) + n.y * (p.y - self.origin.y)) / n.z;
        Some(Coord3::new(p.x, p.y, z))
    }

    /// Point where `a b` crosses the plane, if it does.
    pub fn segment_intersection(&self, a: Coord3, b: Coord3) -> Option<Coord3> {
        let (oa, ob) = (self.offset(a), self.offset(b));
        if (oa >= 0.0) == (ob >= 0.0) || oa == ob {
            return None;
        }
        Some(lerp(a, b, oa / (oa - ob)))
    }

    /// Cuts the vertical walls hanging below the `roof` polyline with
    /// the plane.
    ///
    /// Returns, in order, the plane projection of every roof point
    /// above the plane and the points where the roof line crosses it.
    /// A `closed` roof does not repeat its first projection.
    pub fn cut_roof(&self, roof: &[Coord3], closed: bool) -> Vec<Coord3> {
        let mut cut = Vec::with_capacity(roof.len());
        let last = roof.len().saturating_sub(1);
        let mut previous: Option<(Coord3, f64)> = None;
        for (i, &p) in roof.iter().enumerate() {
            let offset = self.offset(p);
            if let Some((prev, prev_offset)) = previous {
                if (offset >= 0.0) != (prev_offset >= 0.0) {
                    cut.extend(self.segment_intersection(prev, p));
                }
            }
            if offset >= 0.0 && !(closed && i == last && i > 0) {
                cut.extend(self.vertical_projection(p));
            }
            previous = Some((p, offset));
        }
        cut
    }
}

/// Keeps the `points` strictly on `side` of `line`.
pub fn filter_by_side(line: Line<f64>, side: Side, points: &[Coord3]) -> Vec<Coord3> {
    points
        .iter()
        .copied()
        .filter(|p| {
            matches!(
                (RobustKernel::orient2d(line.start, line.end, p.coord()), side),
                (Orientation::CounterClockwise, Side::Left) | (Orientation::Clockwise, Side::Right)
            )
        })
        .collect()
}

impl Scene {
    /// Corner candidates of the obstacles crossed by `p1 p2`, on
    /// `side` of it and above the cut plane through it.
    ///
    /// See [`Scene::walls_on_path_with`].
    pub fn walls_on_path(&self, p1: Coord3, p2: Coord3, side: Side) -> Vec<CornerSet> {
        self.walls_on_path_with(p1, p2, side, &mut HashSet::new())
    }

    /// Like [`Scene::walls_on_path`], skipping the obstacles already in
    /// `found` and adding the ones it returns.
    ///
    /// Each spatial index query ends at its first obstacle with
    /// corners, so a call returns at most one set per obstacle and
    /// usually one per query chunk. Repeated calls with the same
    /// `found` set grow a detour hull one obstacle at a time.
    pub fn walls_on_path_with(
        &self,
        p1: Coord3,
        p2: Coord3,
        side: Side,
        found: &mut HashSet<Obstacle>,
    ) -> Vec<CornerSet> {
        if ![p1, p2].iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
            error!("skipping walls on path from {:?} to {:?}: non-finite end", p1, p2);
            return Vec::new();
        }
        let Some(plane) = CutPlane::through(p1, p2) else {
            return Vec::new();
        };
        let line = Line::new(p1.coord(), p2.coord());
        let mut sets = Vec::new();
        let mut visited = HashSet::new();

        for (c0, c1) in split_segment(p1, p2, self.config.max_line_length) {
            let rect = envelope(c0.coord(), c1.coord());
            let flow = self.building_index.visit(rect, |b| {
                let obstacle = Obstacle::Building(b);
                if found.contains(&obstacle) || !visited.insert(obstacle) {
                    return ControlFlow::Continue(());
                }
                if !self.buildings[b].footprint().intersects(&line) {
                    return ControlFlow::Continue(());
                }
                let corners = plane.cut_roof(self.wide_angle_points(b), true);
                corner_set(obstacle, filter_by_side(line, side, &corners))
            });
            if let ControlFlow::Break(set) = flow {
                found.insert(set.obstacle);
                sets.push(set);
            }

            let flow = self.wall_index.visit(rect, |i| {
                let wall = &self.processed_walls[i];
                let obstacle = Obstacle::Wall(wall.origin);
                if wall.kind != ObstacleKind::Wall
                    || found.contains(&obstacle)
                    || !visited.insert(obstacle)
                    || !wall.line().intersects(&line)
                {
                    return ControlFlow::Continue(());
                }
                let corners = plane.cut_roof(&extended_ends(wall.p0, wall.p1), false);
                corner_set(obstacle, filter_by_side(line, side, &corners))
            });
            if let ControlFlow::Break(set) = flow {
                found.insert(set.obstacle);
                sets.push(set);
            }
        }
        sets
    }
}

fn corner_set(obstacle: Obstacle, corners: Vec<Coord3>) -> ControlFlow<CornerSet> {
    if corners.is_empty() {
        ControlFlow::Continue(())
    } else {
        ControlFlow::Break(CornerSet { obstacle, corners })
    }
}

/// Wall ends pushed [`WIDE_ANGLE_EPSILON`] away from the wall along its
/// direction.
fn extended_ends(p0: Coord3, p1: Coord3) -> [Coord3; 2] {
    let d: Coord<f64> = p1.coord() - p0.coord();
    let len = d.x.hypot(d.y);
    let (dx, dy) = (d.x / len * WIDE_ANGLE_EPSILON, d.y / len * WIDE_ANGLE_EPSILON);
    [
        Coord3::new(p0.x - dx, p0.y - dy, p0.z),
        Coord3::new(p1.x + dx, p1.y + dy, p1.z),
    ]
}
