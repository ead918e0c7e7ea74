use serde::{Deserialize, Serialize};
use tin::Coord3;

/// Ground coefficient used over building roofs when averaging `G`
/// along a profile.
pub const DEFAULT_ROOF_GROUND_COEFFICIENT: f64 = 0.0;

/// How a profile line crosses a building facade or wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallCrossing {
    /// Going from outside to inside a building footprint.
    Enter,
    /// Going from inside to outside a building footprint.
    Exit,
    /// Crossing a free-standing wall.
    Through,
}

/// Obstacle data attached to a facade or wall cut point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleCrossing {
    /// Index of the building or free wall.
    pub origin: usize,

    /// Index of the crossed processed wall.
    pub wall: usize,

    /// End points of the crossed segment, at top elevation.
    pub segment: [Coord3; 2],

    pub height: f64,

    /// Per band absorption, empty when unspecified.
    pub absorption: Vec<f64>,

    /// Primary key of the obstacle.
    pub id: Option<i64>,

    pub crossing: WallCrossing,
}

/// Reflection on a vertical surface, added by path search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionPoint {
    /// Reflecting segment.
    pub segment: [Coord3; 2],

    pub absorption: Vec<f64>,

    pub id: Option<i64>,
}

/// What a [`CutPoint`] marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CutPointKind {
    Source,
    Receiver,
    Building(ObstacleCrossing),
    Wall(ObstacleCrossing),
    Topography,
    GroundEffect {
        /// Ground zone border segment that was crossed, if any.
        wall: Option<usize>,
        /// Ground zone entered, `None` when leaving every zone.
        zone: Option<usize>,
    },
    Reflection(ReflectionPoint),
    VEdgeDiffraction,
}

/// A point where the vertical plane through source and receiver meets
/// something relevant to propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPoint {
    /// Position; `z` is the obstacle top, the ground, or the caller
    /// supplied elevation for sources and receivers.
    pub coord: Coord3,

    /// Ground elevation under `coord`.
    pub z_ground: Option<f64>,

    /// Ground coefficient `G` from this point on.
    pub ground_coefficient: Option<f64>,

    /// Wide angle diffraction candidate.
    pub corner: bool,

    #[serde(flatten)]
    pub kind: CutPointKind,
}

impl CutPoint {
    pub fn new(coord: Coord3, kind: CutPointKind) -> Self {
        Self {
            coord,
            z_ground: None,
            ground_coefficient: None,
            corner: false,
            kind,
        }
    }

    pub fn source(coord: Coord3) -> Self {
        Self::new(coord, CutPointKind::Source)
    }

    pub fn receiver(coord: Coord3) -> Self {
        Self::new(coord, CutPointKind::Receiver)
    }

    /// A terrain breakpoint; `coord.z` is the ground.
    pub fn topography(coord: Coord3) -> Self {
        Self {
            z_ground: Some(coord.z),
            ..Self::new(coord, CutPointKind::Topography)
        }
    }

    pub fn ground_effect(
        coord: Coord3,
        wall: Option<usize>,
        zone: Option<usize>,
        ground_coefficient: f64,
    ) -> Self {
        Self {
            ground_coefficient: Some(ground_coefficient),
            ..Self::new(coord, CutPointKind::GroundEffect { wall, zone })
        }
    }

    pub fn building(coord: Coord3, obstacle: ObstacleCrossing) -> Self {
        Self::new(coord, CutPointKind::Building(obstacle))
    }

    pub fn wall(coord: Coord3, obstacle: ObstacleCrossing) -> Self {
        Self::new(coord, CutPointKind::Wall(obstacle))
    }

    pub fn reflection(coord: Coord3, reflection: ReflectionPoint) -> Self {
        Self::new(coord, CutPointKind::Reflection(reflection))
    }

    pub fn v_edge_diffraction(coord: Coord3) -> Self {
        Self::new(coord, CutPointKind::VEdgeDiffraction)
    }

    #[must_use]
    pub fn with_corner(mut self, corner: bool) -> Self {
        self.corner = corner;
        self
    }

    pub fn is_ground_effect(&self) -> bool {
        matches!(self.kind, CutPointKind::GroundEffect { .. })
    }

    pub fn is_topography(&self) -> bool {
        matches!(self.kind, CutPointKind::Topography)
    }

    /// Facade or wall crossing data.
    pub fn obstacle(&self) -> Option<&ObstacleCrossing> {
        match &self.kind {
            CutPointKind::Building(o) | CutPointKind::Wall(o) => Some(o),
            _ => None,
        }
    }

    pub fn crossing(&self) -> Option<WallCrossing> {
        self.obstacle().map(|o| o.crossing)
    }

    fn z_ground_or_zero(&self) -> f64 {
        self.z_ground.unwrap_or(0.0)
    }
}

/// Shape of the path a profile was cut for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// A straight source to receiver path.
    #[default]
    Direct,
    /// A lateral path passing left of the obstacles.
    Left,
    /// A lateral path passing right of the obstacles.
    Right,
    /// A path with reflections.
    Reflection,
}

/// Ordered cut points along a source to receiver segment.
///
/// The first point is always the source and the last one the
/// receiver; points in between are sorted by planar distance from the
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutProfile {
    points: Vec<CutPoint>,

    /// Some building or wall top lies on or above the direct line.
    pub has_building_intersection: bool,

    /// The terrain rises above the direct line somewhere.
    pub has_topography_intersection: bool,

    /// At least one ground zone border was crossed.
    pub has_ground_effect_intersection: bool,

    pub kind: ProfileKind,
}

impl CutProfile {
    pub fn new(source: CutPoint, receiver: CutPoint) -> Self {
        Self {
            points: vec![source, receiver],
            has_building_intersection: false,
            has_topography_intersection: false,
            has_ground_effect_intersection: false,
            kind: ProfileKind::default(),
        }
    }

    pub fn points(&self) -> &[CutPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn source(&self) -> &CutPoint {
        &self.points[0]
    }

    pub fn receiver(&self) -> &CutPoint {
        &self.points[self.points.len() - 1]
    }

    pub(crate) fn source_mut(&mut self) -> &mut CutPoint {
        &mut self.points[0]
    }

    pub(crate) fn receiver_mut(&mut self) -> &mut CutPoint {
        let last = self.points.len() - 1;
        &mut self.points[last]
    }

    pub(crate) fn points_mut(&mut self) -> &mut [CutPoint] {
        &mut self.points
    }

    /// Neither buildings nor terrain block the direct line.
    pub fn is_free_field(&self) -> bool {
        !self.has_building_intersection && !self.has_topography_intersection
    }

    /// Inserts `points` between source and receiver.
    ///
    /// With `sort`, intermediate points are reordered by planar
    /// distance from the source; the sort is stable so points at the
    /// same distance keep their insertion order.
    pub fn insert_cut_points(&mut self, points: impl IntoIterator<Item = CutPoint>, sort: bool) {
        let receiver = self.points.len() - 1;
        self.points.splice(receiver..receiver, points);
        if sort {
            let origin = self.points[0].coord;
            let last = self.points.len() - 1;
            self.points[1..last].sort_by(|a, b| {
                a.coord
                    .distance_2d(&origin)
                    .total_cmp(&b.coord.distance_2d(&origin))
            });
        }
    }

    /// Length weighted mean ground coefficient between points `from`
    /// and `to`, using `roof_ground_coefficient` across building
    /// footprints.
    pub fn g_path(&self, from: usize, to: usize, roof_ground_coefficient: f64) -> f64 {
        let to = to.min(self.points.len() - 1);
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut above_roof = false;
        for i in 0..to {
            let current = &self.points[i];
            match current.crossing() {
                Some(WallCrossing::Enter) if matches!(current.kind, CutPointKind::Building(_)) => {
                    above_roof = true
                }
                Some(WallCrossing::Exit) => above_roof = false,
                _ => {}
            }
            if i >= from {
                let length = current.coord.distance_2d(&self.points[i + 1].coord);
                let g = if above_roof {
                    roof_ground_coefficient
                } else {
                    current.ground_coefficient.unwrap_or(0.0)
                };
                weighted += length * g;
                total += length;
            }
        }
        if total > 0.0 {
            weighted / total
        } else {
            self.points[from.min(to)].ground_coefficient.unwrap_or(0.0)
        }
    }

    /// Ground polyline under the profile, with facades and walls as
    /// vertical steps from the ground to their top.
    pub fn ground_polyline(&self) -> Vec<Coord3> {
        let mut polyline = Vec::with_capacity(self.points.len() * 2);
        let mut over_building = false;
        for point in &self.points {
            let ground = point.coord.with_z(point.z_ground_or_zero());
            match &point.kind {
                CutPointKind::Building(o) | CutPointKind::Wall(o) => {
                    let top = point.coord;
                    match o.crossing {
                        WallCrossing::Enter => {
                            over_building = true;
                            polyline.extend([ground, top]);
                        }
                        WallCrossing::Through => polyline.extend([ground, top, ground]),
                        WallCrossing::Exit => {
                            over_building = false;
                            polyline.extend([top, ground]);
                        }
                    }
                }
                CutPointKind::Reflection(_) => polyline.extend([ground, ground, ground]),
                CutPointKind::GroundEffect { .. } => {}
                CutPointKind::Topography if over_building => {}
                _ => polyline.push(ground),
            }
        }
        polyline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn facade(x: f64, crossing: WallCrossing) -> CutPoint {
        let mut point = CutPoint::building(
            Coord3::new(x, 0.0, 10.0),
            ObstacleCrossing {
                origin: 0,
                wall: 0,
                segment: [Coord3::new(x, -5.0, 10.0), Coord3::new(x, 5.0, 10.0)],
                height: 10.0,
                absorption: vec![],
                id: Some(7),
                crossing,
            },
        );
        point.z_ground = Some(0.0);
        point
    }

    fn profile() -> CutProfile {
        let mut source = CutPoint::source(Coord3::new(0.0, 0.0, 1.0));
        source.z_ground = Some(0.0);
        source.ground_coefficient = Some(1.0);
        let mut receiver = CutPoint::receiver(Coord3::new(100.0, 0.0, 1.0));
        receiver.z_ground = Some(0.0);
        receiver.ground_coefficient = Some(1.0);
        CutProfile::new(source, receiver)
    }

    #[test]
    fn test_insert_keeps_endpoints() {
        let mut p = profile();
        p.insert_cut_points(
            vec![
                facade(60.0, WallCrossing::Exit),
                facade(40.0, WallCrossing::Enter),
            ],
            true,
        );
        assert_eq!(p.len(), 4);
        assert!(matches!(p.source().kind, CutPointKind::Source));
        assert!(matches!(p.receiver().kind, CutPointKind::Receiver));
        assert_relative_eq!(p.points()[1].coord.x, 40.0);
        assert_relative_eq!(p.points()[2].coord.x, 60.0);

        let mut unsorted = profile();
        unsorted.insert_cut_points(vec![facade(60.0, WallCrossing::Exit)], false);
        unsorted.insert_cut_points(vec![facade(40.0, WallCrossing::Enter)], false);
        assert_relative_eq!(unsorted.points()[1].coord.x, 60.0);
    }

    #[test]
    fn test_g_path_uses_roof_coefficient() {
        let mut p = profile();
        let mut enter = facade(40.0, WallCrossing::Enter);
        enter.ground_coefficient = Some(1.0);
        let mut exit = facade(60.0, WallCrossing::Exit);
        exit.ground_coefficient = Some(1.0);
        p.insert_cut_points(vec![enter, exit], true);

        assert_relative_eq!(p.g_path(0, 3, 0.0), 0.8);
        assert_relative_eq!(p.g_path(0, 3, 1.0), 1.0);
        assert_relative_eq!(p.g_path(0, 1, 0.0), 1.0);
    }

    #[test]
    fn test_ground_polyline_steps() {
        let mut p = profile();
        let mut over_roof = CutPoint::topography(Coord3::new(50.0, 0.0, 0.0));
        over_roof.ground_coefficient = Some(0.0);
        p.insert_cut_points(
            vec![
                facade(40.0, WallCrossing::Enter),
                over_roof,
                facade(60.0, WallCrossing::Exit),
            ],
            true,
        );
        let polyline = p.ground_polyline();
        let xz: Vec<(f64, f64)> = polyline.iter().map(|c| (c.x, c.z)).collect();
        assert_eq!(
            xz,
            vec![
                (0.0, 0.0),
                (40.0, 0.0),
                (40.0, 10.0),
                (60.0, 10.0),
                (60.0, 0.0),
                (100.0, 0.0)
            ]
        );
    }

    #[test]
    fn test_serialize_tags_kind() {
        let json = serde_json::to_value(facade(40.0, WallCrossing::Enter)).unwrap();
        assert_eq!(json["type"], "Building");
        assert_eq!(json["crossing"], "Enter");
        assert_eq!(json["id"], 7);
        let back: CutPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, facade(40.0, WallCrossing::Enter));
    }
}
