use crate::Absorption;
use geo::{
    geometry::{Coord, Line, LineString, MultiPolygon, Polygon, Rect},
    Area, Winding,
};
use serde::{Deserialize, Serialize};
use tin::{geometry::interpolate_segment_z, Coord3};

/// What a [`ProcessedWall`] was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// A facade of a building footprint.
    Building,
    /// A segment of a free-standing wall.
    Wall,
    /// A border segment of a ground zone.
    GroundEffect,
}

/// A building footprint extruded to a flat roof.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    /// Closed exterior ring, clockwise once added to a scene.
    exterior: Vec<Coord3>,

    /// Closed hole rings, counter-clockwise once added to a scene.
    interiors: Vec<Vec<Coord3>>,

    /// Planar footprint matching the rings.
    footprint: Polygon<f64>,

    /// Height above ground (meters), or absolute roof elevation when
    /// the scene uses absolute building elevations.
    height: f64,

    absorption: Absorption,

    /// Caller supplied primary key.
    id: Option<i64>,
}

impl Building {
    /// A building whose roof elevation is derived from `height` when
    /// the scene is finished.
    pub fn new(footprint: Polygon<f64>, height: f64) -> Self {
        let (exterior, interiors) = footprint.clone().into_inner();
        Self {
            exterior: exterior.coords().map(|c| Coord3::from(*c)).collect(),
            interiors: interiors
                .iter()
                .map(|ring| ring.coords().map(|c| Coord3::from(*c)).collect())
                .collect(),
            footprint,
            height,
            absorption: Absorption::default(),
            id: None,
        }
    }

    /// A building with explicit vertex elevations.
    pub fn from_rings(exterior: Vec<Coord3>, interiors: Vec<Vec<Coord3>>, height: f64) -> Self {
        let footprint = footprint(&exterior, &interiors);
        Self {
            exterior,
            interiors,
            footprint,
            height,
            absorption: Absorption::default(),
            id: None,
        }
    }

    #[must_use]
    pub fn with_absorption(mut self, absorption: impl Into<Absorption>) -> Self {
        self.absorption = absorption.into();
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn exterior(&self) -> &[Coord3] {
        &self.exterior
    }

    pub fn interiors(&self) -> &[Vec<Coord3>] {
        &self.interiors
    }

    pub fn footprint(&self) -> &Polygon<f64> {
        &self.footprint
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn absorption(&self) -> &Absorption {
        &self.absorption
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Roof elevation, `NaN` until known.
    pub fn roof_z(&self) -> f64 {
        self.exterior.first().map_or(f64::NAN, |c| c.z)
    }

    /// Exterior ring followed by every hole.
    pub fn rings(&self) -> impl Iterator<Item = &[Coord3]> {
        std::iter::once(self.exterior.as_slice()).chain(self.interiors.iter().map(Vec::as_slice))
    }

    /// Closes and orients the rings. Returns `false` for footprints
    /// that cannot be used.
    pub(crate) fn normalize(&mut self) -> bool {
        if !(self.height.is_finite()
            && self
                .rings()
                .flatten()
                .all(|c| c.x.is_finite() && c.y.is_finite()))
        {
            return false;
        }
        close_ring(&mut self.exterior);
        self.interiors.retain_mut(|ring| {
            close_ring(ring);
            ring.len() >= 4
        });
        if self.exterior.len() < 4 {
            return false;
        }
        orient_ring(&mut self.exterior, false);
        for ring in &mut self.interiors {
            orient_ring(ring, true);
        }
        self.footprint = footprint(&self.exterior, &self.interiors);
        self.footprint.unsigned_area() > 0.0
    }

    pub(crate) fn set_roof_z(&mut self, z: f64) {
        for c in self.exterior.iter_mut().chain(self.interiors.iter_mut().flatten()) {
            c.z = z;
        }
    }
}

fn close_ring(ring: &mut Vec<Coord3>) {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last()) {
        if first.coord() != last.coord() {
            ring.push(first);
        }
    }
}

fn orient_ring(ring: &mut [Coord3], ccw: bool) {
    let line = LineString::from(ring.iter().map(Coord3::coord).collect::<Vec<_>>());
    let reversed = if ccw { line.is_cw() } else { line.is_ccw() };
    if reversed {
        ring.reverse();
    }
}

fn footprint(exterior: &[Coord3], interiors: &[Vec<Coord3>]) -> Polygon<f64> {
    let ring = |r: &[Coord3]| LineString::from(r.iter().map(Coord3::coord).collect::<Vec<_>>());
    Polygon::new(
        ring(exterior),
        interiors.iter().map(|r| ring(r)).collect(),
    )
}

/// A single free-standing wall segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    p0: Coord3,
    p1: Coord3,

    /// Height above ground (meters), or absolute top elevation when
    /// the scene uses absolute building elevations.
    height: f64,

    absorption: Absorption,

    /// Caller supplied primary key.
    id: Option<i64>,
}

impl Wall {
    pub fn new(p0: Coord3, p1: Coord3, height: f64) -> Self {
        Self {
            p0,
            p1,
            height,
            absorption: Absorption::default(),
            id: None,
        }
    }

    #[must_use]
    pub fn with_absorption(mut self, absorption: impl Into<Absorption>) -> Self {
        self.absorption = absorption.into();
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn p0(&self) -> Coord3 {
        self.p0
    }

    pub fn p1(&self) -> Coord3 {
        self.p1
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn absorption(&self) -> &Absorption {
        &self.absorption
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn line(&self) -> Line<f64> {
        Line::new(self.p0.coord(), self.p1.coord())
    }

    pub(crate) fn is_valid(&self) -> bool {
        [self.p0, self.p1]
            .iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
            && self.height.is_finite()
            && self.p0.coord() != self.p1.coord()
    }

    pub(crate) fn endpoints_mut(&mut self) -> [&mut Coord3; 2] {
        [&mut self.p0, &mut self.p1]
    }
}

/// An area with a uniform ground coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundZone {
    geometry: MultiPolygon<f64>,

    /// Ground coefficient `G` in `[0, 1]`; 0 is hard, 1 is porous.
    coefficient: f64,
}

impl GroundZone {
    pub fn new(geometry: impl Into<MultiPolygon<f64>>, coefficient: f64) -> Self {
        Self {
            geometry: geometry.into(),
            coefficient,
        }
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.geometry.0.is_empty()
            && self.coefficient.is_finite()
            && self
                .geometry
                .0
                .iter()
                .all(|p| p.exterior().coords().all(|c| c.x.is_finite() && c.y.is_finite()))
    }
}

/// Elementary obstacle segment stored in the wall index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedWall {
    pub p0: Coord3,
    pub p1: Coord3,
    pub kind: ObstacleKind,

    /// Index of the building, free wall or ground zone this segment
    /// belongs to.
    pub origin: usize,

    /// Position of this segment in the scene's processed walls.
    pub index: usize,

    /// Height of the originating obstacle.
    pub height: f64,

    /// Per band absorption of the originating obstacle.
    pub absorption: Vec<f64>,

    /// Primary key of the originating obstacle.
    pub id: Option<i64>,
}

impl ProcessedWall {
    pub fn line(&self) -> Line<f64> {
        Line::new(self.p0.coord(), self.p1.coord())
    }

    pub fn envelope(&self) -> Rect<f64> {
        Rect::new(self.p0.coord(), self.p1.coord())
    }

    /// Top elevation of the wall above `c`, `NaN` when either end is
    /// unknown.
    pub fn z_at(&self, c: Coord<f64>) -> f64 {
        if !(self.p0.has_z() && self.p1.has_z()) {
            f64::NAN
        } else if self.p0.z == self.p1.z {
            self.p0.z
        } else {
            interpolate_segment_z(c, self.p0, self.p1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Building, ProcessedWall};
    use approx::assert_relative_eq;
    use geo::{polygon, Coord, Winding};
    use tin::Coord3;

    #[test]
    fn test_normalize_orients_rings() {
        let mut building = Building::new(
            polygon!(
                exterior: [
                    (x: 0.0, y: 0.0),
                    (x: 10.0, y: 0.0),
                    (x: 10.0, y: 10.0),
                    (x: 0.0, y: 10.0),
                ],
                interiors: [[
                    (x: 2.0, y: 2.0),
                    (x: 2.0, y: 4.0),
                    (x: 4.0, y: 4.0),
                    (x: 4.0, y: 2.0),
                ]],
            ),
            10.0,
        );
        assert!(building.normalize());
        assert!(building.footprint().exterior().is_cw());
        assert!(building.footprint().interiors()[0].is_ccw());
        assert_eq!(building.exterior().first(), building.exterior().last());
        assert_eq!(building.rings().count(), 2);
    }

    #[test]
    fn test_normalize_rejects_degenerate() {
        let mut flat = Building::from_rings(
            vec![
                Coord3::flat(0.0, 0.0),
                Coord3::flat(5.0, 0.0),
                Coord3::flat(10.0, 0.0),
            ],
            vec![],
            5.0,
        );
        assert!(!flat.normalize());

        let mut short = Building::from_rings(
            vec![Coord3::flat(0.0, 0.0), Coord3::flat(5.0, 0.0)],
            vec![],
            5.0,
        );
        assert!(!short.normalize());

        let square = |d: f64| {
            vec![
                Coord3::flat(d, d),
                Coord3::flat(10.0 - d, d),
                Coord3::flat(10.0 - d, 10.0 - d),
                Coord3::flat(d, 10.0 - d),
            ]
        };
        let mut hole = square(2.0);
        hole[1].y = f64::NAN;
        let mut broken_hole = Building::from_rings(square(0.0), vec![hole], 5.0);
        assert!(!broken_hole.normalize());
        let mut fine = Building::from_rings(square(0.0), vec![square(2.0)], 5.0);
        assert!(fine.normalize());
    }

    #[test]
    fn test_wall_top_elevation() {
        let wall = ProcessedWall {
            p0: Coord3::new(0.0, 0.0, 10.0),
            p1: Coord3::new(10.0, 0.0, 20.0),
            kind: super::ObstacleKind::Wall,
            origin: 0,
            index: 0,
            height: 10.0,
            absorption: vec![],
            id: None,
        };
        assert_relative_eq!(wall.z_at(Coord { x: 5.0, y: 0.0 }), 15.0);
        let unknown = ProcessedWall {
            p1: Coord3::flat(10.0, 0.0),
            ..wall
        };
        assert!(unknown.z_at(Coord { x: 5.0, y: 0.0 }).is_nan());
    }
}
