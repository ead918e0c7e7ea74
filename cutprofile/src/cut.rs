//! Cut profile construction along a straight source to receiver line.

use crate::{
    math::{distance_to_segment, envelope, split_segment, step_towards},
    obstacle::{ObstacleKind, ProcessedWall},
    profile::{CutPoint, CutProfile, ObstacleCrossing, WallCrossing},
    Scene,
};
use geo::{
    algorithm::line_intersection::{line_intersection, LineIntersection},
    geometry::{Coord, Line},
    Intersects,
};
use log::{error, trace, warn};
use std::{collections::HashSet, ops::ControlFlow};
use tin::{geometry::interpolate_segment_z, Coord3, Tin};

/// Offset (meters) used to probe either side of a crossed border.
pub const MILLIMETER: f64 = 0.001;

/// Terrain breakpoints closer than this (meters) to the segment
/// joining their neighbours carry no information and are dropped.
const TOPOGRAPHY_TOLERANCE: f64 = 1e-3;

impl Scene {
    /// Builds the cut profile from `source` to `receiver`.
    ///
    /// `source` and `receiver` elevations are absolute. The ground
    /// coefficient under the source comes from the ground zone there,
    /// or `default_ground_coefficient` outside every zone.
    ///
    /// Ends with a non-finite planar coordinate give back the bare
    /// source and receiver.
    ///
    /// With `stop_at_obstacle`, collecting cut points ends as soon as
    /// the terrain or an obstacle is found above the direct line. The
    /// returned profile is then partial, but every point it holds has
    /// its ground coefficient and ground elevation resolved.
    pub fn build_profile(
        &self,
        source: Coord3,
        receiver: Coord3,
        default_ground_coefficient: f64,
        stop_at_obstacle: bool,
    ) -> CutProfile {
        let mut profile = CutProfile::new(CutPoint::source(source), CutPoint::receiver(receiver));
        if ![source, receiver]
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
        {
            error!("skipping profile from {:?} to {:?}: non-finite end", source, receiver);
            return profile;
        }
        profile.source_mut().ground_coefficient =
            Some(self.ground_coefficient_at(source.coord(), default_ground_coefficient));

        let mut stopped = false;
        match &self.tin {
            Some(tin) => {
                add_topography_points(tin, &mut profile, stop_at_obstacle);
                stopped = stop_at_obstacle && profile.has_topography_intersection;
            }
            None => {
                profile.source_mut().z_ground = Some(0.0);
                profile.receiver_mut().z_ground = Some(0.0);
            }
        }

        if !stopped && !self.processed_walls.is_empty() {
            self.add_obstacle_points(&mut profile, stop_at_obstacle);
        }

        propagate_ground_coefficient(profile.points_mut());
        interpolate_ground_elevation(profile.points_mut());

        trace!(
            "profile; {:?} -> {:?}, points: {}, free field: {}",
            source,
            receiver,
            profile.len(),
            profile.is_free_field()
        );
        profile
    }

    /// Adds a cut point for every processed wall crossed by the
    /// source to receiver line.
    fn add_obstacle_points(&self, profile: &mut CutProfile, stop_at_obstacle: bool) {
        let source = profile.source().coord;
        let receiver = profile.receiver().coord;
        let mut walk = ObstacleWalk {
            scene: self,
            source,
            receiver,
            line: Line::new(source.coord(), receiver.coord()),
            stop_at_obstacle,
            points: Vec::new(),
            obstructed: false,
            ground_effect: false,
        };

        let mut seen = HashSet::new();
        for (p0, p1) in split_segment(source, receiver, self.config.max_line_length) {
            let flow = self
                .wall_index
                .visit(envelope(p0.coord(), p1.coord()), |i| {
                    if !seen.insert(i) {
                        return ControlFlow::Continue(());
                    }
                    walk.visit(&self.processed_walls[i])
                });
            if flow.is_break() {
                break;
            }
        }

        profile.has_building_intersection |= walk.obstructed;
        profile.has_ground_effect_intersection |= walk.ground_effect;
        profile.insert_cut_points(walk.points, true);
    }
}

/// State of a single pass over the walls crossing a profile line.
struct ObstacleWalk<'a> {
    scene: &'a Scene,
    source: Coord3,
    receiver: Coord3,
    line: Line<f64>,
    stop_at_obstacle: bool,
    points: Vec<CutPoint>,
    obstructed: bool,
    ground_effect: bool,
}

impl ObstacleWalk<'_> {
    fn visit(&mut self, wall: &ProcessedWall) -> ControlFlow<()> {
        let Some(at) = self.intersection(wall) else {
            return ControlFlow::Continue(());
        };
        match wall.kind {
            ObstacleKind::Building => {
                let crossing = self.facade_crossing(wall, at);
                self.obstacle(wall, at, crossing)
            }
            ObstacleKind::Wall => self.obstacle(wall, at, WallCrossing::Through),
            ObstacleKind::GroundEffect => {
                self.ground_effect(wall, at);
                ControlFlow::Continue(())
            }
        }
    }

    /// Point where the profile line meets `wall`, at the wall's top
    /// elevation.
    fn intersection(&self, wall: &ProcessedWall) -> Option<Coord3> {
        let c = match line_intersection(self.line, wall.line())? {
            LineIntersection::SinglePoint { intersection, .. } => intersection,
            LineIntersection::Collinear { intersection } => intersection.start,
        };
        Some(Coord3::new(c.x, c.y, wall.z_at(c)))
    }

    /// Facades are oriented with the building on their right; a probe
    /// on the left is outside.
    fn facade_crossing(&self, wall: &ProcessedWall, at: Coord3) -> WallCrossing {
        let d = wall.p1.coord() - wall.p0.coord();
        let len = d.x.hypot(d.y);
        let outside = Coord {
            x: at.x - d.y / len * MILLIMETER,
            y: at.y + d.x / len * MILLIMETER,
        };
        let source = self.source.coord();
        let to_source = |c: Coord<f64>| (c.x - source.x).hypot(c.y - source.y);
        if to_source(outside) < to_source(at.coord()) {
            WallCrossing::Enter
        } else {
            WallCrossing::Exit
        }
    }

    fn obstacle(
        &mut self,
        wall: &ProcessedWall,
        at: Coord3,
        crossing: WallCrossing,
    ) -> ControlFlow<()> {
        let obstacle = ObstacleCrossing {
            origin: wall.origin,
            wall: wall.index,
            segment: [wall.p0, wall.p1],
            height: wall.height,
            absorption: wall.absorption.clone(),
            id: wall.id,
            crossing,
        };
        self.points.push(match wall.kind {
            ObstacleKind::Building => CutPoint::building(at, obstacle),
            _ => CutPoint::wall(at, obstacle),
        });

        let ray_z = interpolate_segment_z(at.coord(), self.source, self.receiver);
        if ray_z <= at.z {
            self.obstructed = true;
            if self.stop_at_obstacle {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn ground_effect(&mut self, wall: &ProcessedWall, at: Coord3) {
        self.ground_effect = true;
        let scene = self.scene;
        let after = step_towards(at.coord(), self.line.start, self.line.end, MILLIMETER);
        let zone = &scene.ground_zones[wall.origin];

        if zone.geometry().intersects(&after) {
            self.points.push(CutPoint::ground_effect(
                at.with_z(f64::NAN),
                Some(wall.index),
                Some(wall.origin),
                zone.coefficient(),
            ));
            return;
        }
        match scene.ground_zone_at(after) {
            None => self.points.push(CutPoint::ground_effect(
                at.with_z(f64::NAN),
                Some(wall.index),
                None,
                scene.config.default_ground_coefficient,
            )),
            Some(next) if !scene.zones_touch(next, wall.origin) => {
                self.points.push(CutPoint::ground_effect(
                    Coord3::from(after),
                    None,
                    Some(next),
                    scene.ground_zones[next].coefficient(),
                ))
            }
            // The touching zone emits its own entry point.
            Some(_) => {}
        }
    }
}

/// Adds the terrain breakpoints of the source to receiver line.
fn add_topography_points(tin: &Tin, profile: &mut CutProfile, stop_at_obstacle: bool) {
    let source = profile.source().coord;
    let receiver = profile.receiver().coord;
    let relief = tin.trace(source, receiver, stop_at_obstacle);

    let (Some(first), Some(last)) = (relief.points.first(), relief.points.last()) else {
        warn!(
            "propagation out of the DEM area from {:?} to {:?}",
            source, receiver
        );
        profile.source_mut().z_ground = Some(0.0);
        profile.receiver_mut().z_ground = Some(0.0);
        return;
    };
    profile.has_topography_intersection = !relief.free_field;
    profile.source_mut().z_ground = Some(first.z);
    if relief.free_field || !stop_at_obstacle {
        profile.receiver_mut().z_ground = Some(last.z);
    }

    let points = &relief.points;
    let breakpoints: Vec<CutPoint> = (1..points.len().saturating_sub(1))
        .filter(|&i| {
            distance_to_segment(points[i], points[i - 1], points[i + 1]) >= TOPOGRAPHY_TOLERANCE
        })
        .map(|i| CutPoint::topography(points[i]))
        .collect();
    profile.insert_cut_points(breakpoints, true);
}

/// Gives every point without a ground coefficient the one of the
/// closest ground effect point before it, or the source's.
fn propagate_ground_coefficient(points: &mut [CutPoint]) {
    let mut current = points
        .first()
        .and_then(|p| p.ground_coefficient)
        .unwrap_or(0.0);
    for point in points.iter_mut() {
        match point.ground_coefficient {
            None => point.ground_coefficient = Some(current),
            Some(g) if point.is_ground_effect() => current = g,
            Some(_) => {}
        }
    }
}

/// Fills in unknown ground elevations by planar interpolation
/// between the closest known neighbours.
fn interpolate_ground_elevation(points: &mut [CutPoint]) {
    let n = points.len();
    let mut previous = 0;
    let mut next = 0;
    for i in 1..n.saturating_sub(1) {
        if points[i].z_ground.is_some() {
            previous = i;
            continue;
        }
        if next <= i {
            next = (i + 1..n)
                .find(|&j| points[j].z_ground.is_some())
                .unwrap_or(previous);
        }
        let a = &points[previous];
        let b = &points[next];
        let z = interpolate_segment_z(
            points[i].coord.coord(),
            a.coord.with_z(a.z_ground.unwrap_or(0.0)),
            b.coord.with_z(b.z_ground.unwrap_or(0.0)),
        );
        let point = &mut points[i];
        point.z_ground = Some(z);
        if !point.coord.has_z() || point.is_ground_effect() {
            point.coord.z = z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{interpolate_ground_elevation, propagate_ground_coefficient};
    use crate::profile::CutPoint;
    use approx::assert_relative_eq;
    use tin::Coord3;

    #[test]
    fn test_propagate_ground_coefficient() {
        let mut source = CutPoint::source(Coord3::new(0.0, 0.0, 1.0));
        source.ground_coefficient = Some(0.3);
        let mut points = vec![
            source,
            CutPoint::topography(Coord3::new(10.0, 0.0, 0.0)),
            CutPoint::ground_effect(Coord3::flat(20.0, 0.0), Some(0), Some(0), 0.9),
            CutPoint::topography(Coord3::new(30.0, 0.0, 0.0)),
            CutPoint::receiver(Coord3::new(40.0, 0.0, 1.0)),
        ];
        propagate_ground_coefficient(&mut points);
        let g: Vec<f64> = points.iter().map(|p| p.ground_coefficient.unwrap()).collect();
        assert_eq!(g, vec![0.3, 0.3, 0.9, 0.9, 0.9]);
    }

    #[test]
    fn test_interpolate_ground_elevation() {
        let mut source = CutPoint::source(Coord3::new(0.0, 0.0, 11.0));
        source.z_ground = Some(10.0);
        let mut receiver = CutPoint::receiver(Coord3::new(40.0, 0.0, 21.0));
        receiver.z_ground = Some(20.0);
        let mut points = vec![
            source,
            CutPoint::ground_effect(Coord3::flat(10.0, 0.0), Some(0), Some(0), 0.9),
            CutPoint::topography(Coord3::new(20.0, 0.0, 30.0)),
            CutPoint::v_edge_diffraction(Coord3::new(30.0, 0.0, 50.0)),
            receiver,
        ];
        interpolate_ground_elevation(&mut points);
        assert_relative_eq!(points[1].z_ground.unwrap(), 20.0);
        assert_relative_eq!(points[1].coord.z, 20.0);
        assert_relative_eq!(points[2].z_ground.unwrap(), 30.0);
        assert_relative_eq!(points[3].z_ground.unwrap(), 25.0);
        // A known coordinate elevation is kept.
        assert_relative_eq!(points[3].coord.z, 50.0);
    }
}
