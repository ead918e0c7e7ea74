use crate::{
    index::EnvelopeIndex,
    obstacle::{Building, GroundZone, ObstacleKind, ProcessedWall, Wall},
    wide_angle::wide_angle_points,
    Absorption, FrequencyBands, SceneConfig, SceneError,
};
use geo::{
    geometry::{Coord, MultiPolygon, Rect},
    BoundingRect, Intersects, Relate,
};
use log::{debug, error, warn};
use std::{collections::HashSet, ops::Range};
use tin::{Coord3, Tin, TinBuilder};

/// Collects scene geometry. Call [`SceneBuilder::finish`] to get a
/// queryable [`Scene`].
///
/// Invalid geometry is logged and skipped rather than rejected, so a
/// single bad feature does not abort loading a whole dataset.
#[derive(Debug, Clone, Default)]
pub struct SceneBuilder {
    config: SceneConfig,
    buildings: Vec<Building>,
    walls: Vec<Wall>,
    ground_zones: Vec<GroundZone>,
    terrain: TinBuilder,

    /// Bounding box of everything added so far.
    envelope: Option<Rect<f64>>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: SceneConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn max_line_length(mut self, meters: f64) -> Self {
        self.config.max_line_length = meters;
        self
    }

    #[must_use]
    pub fn absolute_building_z(mut self, absolute: bool) -> Self {
        self.config.absolute_building_z = absolute;
        self
    }

    #[must_use]
    pub fn frequencies(mut self, bands: FrequencyBands) -> Self {
        self.config.frequencies = bands;
        self
    }

    #[must_use]
    pub fn default_ground_coefficient(mut self, g: f64) -> Self {
        self.config.default_ground_coefficient = g;
        self
    }

    #[must_use]
    pub fn wide_angle_range(mut self, min: f64, max: f64) -> Self {
        self.config.wide_angle_range = (min, max);
        self
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn add_building(&mut self, mut building: Building) -> &mut Self {
        if !building.normalize() {
            error!(
                "skipping building {:?}: empty or degenerate footprint",
                building.id()
            );
            return self;
        }
        self.expand(building.footprint().bounding_rect());
        self.buildings.push(building);
        self
    }

    /// Adds a free-standing wall following `line`, one segment per
    /// consecutive vertex pair.
    pub fn add_wall(
        &mut self,
        line: &[Coord3],
        height: f64,
        absorption: impl Into<Absorption>,
        id: Option<i64>,
    ) -> &mut Self {
        if line.len() < 2 {
            error!("skipping wall {:?}: fewer than two vertices", id);
            return self;
        }
        let absorption = absorption.into();
        for pair in line.windows(2) {
            let mut wall = Wall::new(pair[0], pair[1], height).with_absorption(absorption.clone());
            if let Some(id) = id {
                wall = wall.with_id(id);
            }
            self.add_wall_segment(wall);
        }
        self
    }

    pub fn add_wall_segment(&mut self, wall: Wall) -> &mut Self {
        if !wall.is_valid() {
            error!("skipping wall {:?}: degenerate segment", wall.id());
            return self;
        }
        self.expand(Some(wall.line().bounding_rect()));
        self.walls.push(wall);
        self
    }

    /// Adds a ground elevation sample. An unknown elevation is taken
    /// as 0.
    pub fn add_topographic_point(&mut self, point: Coord3) -> &mut Self {
        if !(point.x.is_finite() && point.y.is_finite()) {
            error!("skipping topographic point {:?}", point);
            return self;
        }
        self.expand(Some(Rect::new(point.coord(), point.coord())));
        self.terrain.add_point(point);
        self
    }

    /// Adds the vertices of an elevation line.
    pub fn add_topographic_line(&mut self, line: &[Coord3]) -> &mut Self {
        if line.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            error!("skipping topographic line with non-finite coordinates");
            return self;
        }
        for p in line {
            self.expand(Some(Rect::new(p.coord(), p.coord())));
        }
        self.terrain.add_line(line);
        self
    }

    /// Adds an area of uniform ground coefficient `g`.
    pub fn add_ground_effect(
        &mut self,
        geometry: impl Into<MultiPolygon<f64>>,
        coefficient: f64,
    ) -> &mut Self {
        let zone = GroundZone::new(geometry, coefficient);
        if !zone.is_valid() {
            error!("skipping ground zone with coefficient {coefficient}: invalid geometry");
            return self;
        }
        if !(0.0..=1.0).contains(&coefficient) {
            warn!("ground coefficient {coefficient} is outside [0, 1]");
        }
        self.expand(zone.geometry().bounding_rect());
        self.ground_zones.push(zone);
        self
    }

    pub fn add_ground_effect_rect(&mut self, rect: Rect<f64>, coefficient: f64) -> &mut Self {
        self.add_ground_effect(rect.to_polygon(), coefficient)
    }

    fn expand(&mut self, rect: Option<Rect<f64>>) {
        if let Some(rect) = rect {
            self.envelope = Some(match self.envelope {
                None => rect,
                Some(e) => Rect::new(
                    Coord {
                        x: e.min().x.min(rect.min().x),
                        y: e.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: e.max().x.max(rect.max().x),
                        y: e.max().y.max(rect.max().y),
                    },
                ),
            });
        }
    }

    /// Triangulates the terrain, settles obstacle elevations and
    /// builds the spatial indexes.
    pub fn finish(self) -> Result<Scene, SceneError> {
        self.config.validate()?;
        let now = std::time::Instant::now();
        let Self {
            config,
            mut buildings,
            mut walls,
            ground_zones,
            terrain,
            envelope,
        } = self;

        let tin = if terrain.len() > 1 {
            Some(terrain.build()?)
        } else {
            if terrain.len() == 1 {
                warn!("ignoring a single topographic point");
            }
            None
        };

        settle_building_z(&mut buildings, tin.as_ref(), config.absolute_building_z);
        settle_wall_z(&mut walls, tin.as_ref());

        let mut processed_walls = Vec::new();
        let mut building_walls = Vec::with_capacity(buildings.len());
        let mut wide_angles = Vec::with_capacity(buildings.len());
        for (b, building) in buildings.iter().enumerate() {
            wide_angles.push(wide_angle_points(
                building.exterior(),
                config.wide_angle_range,
            ));
            let absorption = building.absorption().spectrum(&config.frequencies);
            let start = processed_walls.len();
            for ring in building.rings() {
                for pair in ring.windows(2) {
                    if pair[0].coord() == pair[1].coord() {
                        continue;
                    }
                    processed_walls.push(ProcessedWall {
                        p0: pair[0],
                        p1: pair[1],
                        kind: ObstacleKind::Building,
                        origin: b,
                        index: processed_walls.len(),
                        height: building.height(),
                        absorption: absorption.clone(),
                        id: building.id(),
                    });
                }
            }
            building_walls.push(start..processed_walls.len());
        }

        for (w, wall) in walls.iter().enumerate() {
            processed_walls.push(ProcessedWall {
                p0: wall.p0(),
                p1: wall.p1(),
                kind: ObstacleKind::Wall,
                origin: w,
                index: processed_walls.len(),
                height: wall.height(),
                absorption: wall.absorption().spectrum(&config.frequencies),
                id: wall.id(),
            });
        }

        let mut zone_envelopes = Vec::new();
        for (z, zone) in ground_zones.iter().enumerate() {
            for polygon in zone.geometry() {
                if let Some(rect) = polygon.bounding_rect() {
                    zone_envelopes.push((rect, z));
                }
                for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                    for line in ring.lines() {
                        if line.start == line.end {
                            continue;
                        }
                        processed_walls.push(ProcessedWall {
                            p0: Coord3::from(line.start),
                            p1: Coord3::from(line.end),
                            kind: ObstacleKind::GroundEffect,
                            origin: z,
                            index: processed_walls.len(),
                            height: 0.0,
                            absorption: Vec::new(),
                            id: None,
                        });
                    }
                }
            }
        }

        let wall_index = EnvelopeIndex::bulk_load(
            processed_walls
                .iter()
                .map(|wall| (wall.envelope(), wall.index)),
        );
        let building_index = EnvelopeIndex::bulk_load(
            buildings
                .iter()
                .enumerate()
                .filter_map(|(b, building)| building.footprint().bounding_rect().map(|r| (r, b))),
        );
        let zone_index = EnvelopeIndex::bulk_load(zone_envelopes.iter().copied());
        let touching_zones = touching_pairs(&ground_zones, &zone_envelopes, &zone_index);

        debug!(
            "scene; buildings: {}, walls: {}, ground zones: {}, processed walls: {}, triangles: {}, exec: {:?}",
            buildings.len(),
            walls.len(),
            ground_zones.len(),
            processed_walls.len(),
            tin.as_ref().map_or(0, Tin::len),
            now.elapsed()
        );

        Ok(Scene {
            config,
            buildings,
            walls,
            ground_zones,
            tin,
            processed_walls,
            building_walls,
            wide_angles,
            wall_index,
            building_index,
            zone_index,
            touching_zones,
            envelope,
        })
    }
}

fn is_unset(z: f64) -> bool {
    z.is_nan() || z == 0.0
}

/// Turns building heights into roof elevations.
fn settle_building_z(buildings: &mut [Building], tin: Option<&Tin>, absolute: bool) {
    for building in buildings {
        if absolute && !is_unset(building.roof_z()) {
            continue;
        }
        let base = match tin {
            Some(tin) => {
                let mut hint = None;
                building
                    .rings()
                    .flatten()
                    .map(|c| tin.elevation_with_hint(c.coord(), &mut hint))
                    .fold(f64::INFINITY, f64::min)
            }
            None => 0.0,
        };
        let base = if base.is_finite() { base } else { 0.0 };
        building.set_roof_z(base + building.height());
    }
}

/// Turns free wall heights into top elevations at each end.
fn settle_wall_z(walls: &mut [Wall], tin: Option<&Tin>) {
    for wall in walls {
        let height = wall.height();
        for p in wall.endpoints_mut() {
            if is_unset(p.z) {
                p.z = height + tin.map_or(0.0, |tin| tin.elevation(p.coord()));
            }
        }
    }
}

/// Pairs of ground zones whose geometries touch without overlapping.
fn touching_pairs(
    zones: &[GroundZone],
    envelopes: &[(Rect<f64>, usize)],
    index: &EnvelopeIndex,
) -> HashSet<(usize, usize)> {
    let mut pairs = HashSet::new();
    for (rect, a) in envelopes {
        for b in index.query(*rect) {
            if b <= *a || pairs.contains(&(*a, b)) {
                continue;
            }
            if zones[*a]
                .geometry()
                .relate(zones[b].geometry())
                .is_touches()
            {
                pairs.insert((*a, b));
            }
        }
    }
    pairs
}

/// Immutable, indexed propagation scene.
///
/// A `Scene` is `Send + Sync`; profiles can be computed from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct Scene {
    pub(crate) config: SceneConfig,
    pub(crate) buildings: Vec<Building>,
    pub(crate) walls: Vec<Wall>,
    pub(crate) ground_zones: Vec<GroundZone>,
    pub(crate) tin: Option<Tin>,

    /// Building facades, then free walls, then ground zone borders.
    pub(crate) processed_walls: Vec<ProcessedWall>,

    /// Range of each building's facades in `processed_walls`.
    pub(crate) building_walls: Vec<Range<usize>>,

    /// Closed wide angle corner list of each building.
    pub(crate) wide_angles: Vec<Vec<Coord3>>,

    pub(crate) wall_index: EnvelopeIndex,
    pub(crate) building_index: EnvelopeIndex,
    pub(crate) zone_index: EnvelopeIndex,

    /// Ground zone index pairs `(a, b)`, `a < b`, that touch.
    pub(crate) touching_zones: HashSet<(usize, usize)>,

    pub(crate) envelope: Option<Rect<f64>>,
}

impl Scene {
    pub fn builder() -> SceneBuilder {
        SceneBuilder::new()
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn ground_zones(&self) -> &[GroundZone] {
        &self.ground_zones
    }

    pub fn processed_walls(&self) -> &[ProcessedWall] {
        &self.processed_walls
    }

    /// Facades of building `b`.
    pub fn building_walls(&self, b: usize) -> &[ProcessedWall] {
        match self.building_walls.get(b) {
            Some(range) => &self.processed_walls[range.clone()],
            None => &[],
        }
    }

    /// Closed list of wide angle corner points of building `b`.
    pub fn wide_angle_points(&self, b: usize) -> &[Coord3] {
        self.wide_angles.get(b).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tin(&self) -> Option<&Tin> {
        self.tin.as_ref()
    }

    pub fn has_terrain(&self) -> bool {
        self.tin.is_some()
    }

    /// Bounding box of every feature added to the scene.
    pub fn envelope(&self) -> Option<Rect<f64>> {
        self.envelope
    }

    /// Ground elevation at `c`; 0 without terrain or outside it.
    pub fn elevation(&self, c: Coord<f64>) -> f64 {
        self.tin.as_ref().map_or(0.0, |tin| tin.elevation(c))
    }

    /// Like [`Scene::elevation`], reusing and updating the triangle
    /// `hint` of a previous lookup.
    pub fn elevation_with_hint(&self, c: Coord<f64>, hint: &mut Option<usize>) -> f64 {
        self.tin
            .as_ref()
            .map_or(0.0, |tin| tin.elevation_with_hint(c, hint))
    }

    /// Roof elevation of the building covering `c`, or the ground
    /// elevation when there is none.
    pub fn z_at(&self, c: Coord<f64>) -> f64 {
        self.building_at(c)
            .map_or_else(|| self.elevation(c), |b| self.buildings[b].roof_z())
    }

    /// Lowest index building whose footprint covers `c`.
    pub fn building_at(&self, c: Coord<f64>) -> Option<usize> {
        self.building_index
            .query(Rect::new(c, c))
            .into_iter()
            .find(|&b| self.buildings[b].footprint().intersects(&c))
    }

    /// Lowest index ground zone covering `c`.
    pub fn ground_zone_at(&self, c: Coord<f64>) -> Option<usize> {
        self.zone_index
            .query(Rect::new(c, c))
            .into_iter()
            .find(|&z| self.ground_zones[z].geometry().intersects(&c))
    }

    /// Ground coefficient at `c`, or `default` outside every zone.
    pub fn ground_coefficient_at(&self, c: Coord<f64>, default: f64) -> f64 {
        self.ground_zone_at(c)
            .map_or(default, |z| self.ground_zones[z].coefficient())
    }

    /// Building facades and free walls whose envelope intersects
    /// `rect`.
    pub fn walls_in(&self, rect: Rect<f64>) -> impl Iterator<Item = &ProcessedWall> + '_ {
        self.wall_index
            .query(rect)
            .into_iter()
            .map(move |i| &self.processed_walls[i])
            .filter(|wall| wall.kind != ObstacleKind::GroundEffect)
    }

    /// Buildings whose footprint envelope intersects `rect`.
    pub fn buildings_in(&self, rect: Rect<f64>) -> Vec<usize> {
        self.building_index.query(rect)
    }

    /// Returns `true` if ground zones `a` and `b` share a border
    /// without overlapping.
    pub fn zones_touch(&self, a: usize, b: usize) -> bool {
        self.touching_zones.contains(&(a.min(b), a.max(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Scene, SceneBuilder};
    use crate::{obstacle::ObstacleKind, Building, SceneError};
    use approx::assert_relative_eq;
    use geo::{coord, polygon, Rect};
    use tin::Coord3;

    fn square(x: f64, y: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]
    }

    fn sloped_terrain(builder: &mut SceneBuilder) {
        builder
            .add_topographic_point(Coord3::new(-100.0, -100.0, 0.0))
            .add_topographic_point(Coord3::new(200.0, -100.0, 30.0))
            .add_topographic_point(Coord3::new(200.0, 200.0, 30.0))
            .add_topographic_point(Coord3::new(-100.0, 200.0, 0.0));
    }

    #[test]
    fn test_roof_z_without_terrain() {
        let mut builder = Scene::builder();
        builder.add_building(Building::new(square(0.0, 0.0, 10.0), 12.0));
        let scene = builder.finish().unwrap();
        assert!(!scene.has_terrain());
        assert_relative_eq!(scene.buildings()[0].roof_z(), 12.0);
        assert_relative_eq!(scene.z_at(coord! { x: 5.0, y: 5.0 }), 12.0);
        assert_relative_eq!(scene.z_at(coord! { x: 50.0, y: 5.0 }), 0.0);
    }

    #[test]
    fn test_roof_z_over_terrain() {
        let mut builder = Scene::builder();
        sloped_terrain(&mut builder);
        builder.add_building(Building::new(square(0.0, 0.0, 10.0), 12.0));
        let scene = builder.finish().unwrap();
        // Ground under the footprint ranges from 10 to 11.
        assert_relative_eq!(scene.buildings()[0].roof_z(), 22.0, epsilon = 1e-9);
        assert_relative_eq!(
            scene.elevation(coord! { x: 50.0, y: 0.0 }),
            15.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_absolute_roof_z_is_kept() {
        let mut builder = Scene::builder().absolute_building_z(true);
        let ring = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]
            .iter()
            .map(|&(x, y)| Coord3::new(x, y, 40.0))
            .collect();
        builder.add_building(Building::from_rings(ring, vec![], 12.0));
        let scene = builder.finish().unwrap();
        assert_relative_eq!(scene.buildings()[0].roof_z(), 40.0);
    }

    #[test]
    fn test_free_wall_z_follows_ground() {
        let mut builder = Scene::builder();
        sloped_terrain(&mut builder);
        builder.add_wall(
            &[Coord3::flat(0.0, 0.0), Coord3::flat(100.0, 0.0)],
            4.0,
            0.5,
            Some(3),
        );
        let scene = builder.finish().unwrap();
        let wall = &scene.walls()[0];
        assert_relative_eq!(wall.p0().z, 14.0, epsilon = 1e-9);
        assert_relative_eq!(wall.p1().z, 24.0, epsilon = 1e-9);
        let processed = scene
            .processed_walls()
            .iter()
            .find(|w| w.kind == ObstacleKind::Wall)
            .unwrap();
        assert_eq!(processed.id, Some(3));
        assert_eq!(processed.absorption, vec![0.5; 8]);
    }

    #[test]
    fn test_processed_walls() {
        let mut builder = Scene::builder();
        builder
            .add_building(Building::new(square(0.0, 0.0, 10.0), 5.0).with_id(1))
            .add_building(Building::new(square(20.0, 0.0, 10.0), 5.0).with_id(2))
            .add_ground_effect_rect(
                Rect::new(coord! { x: -50.0, y: -50.0 }, coord! { x: 50.0, y: 50.0 }),
                0.7,
            );
        let scene = builder.finish().unwrap();

        assert_eq!(scene.processed_walls().len(), 12);
        for (i, wall) in scene.processed_walls().iter().enumerate() {
            assert_eq!(wall.index, i);
        }
        assert_eq!(scene.building_walls(1).len(), 4);
        assert!(scene.building_walls(1).iter().all(|w| w.origin == 1 && w.id == Some(2)));
        assert_eq!(scene.wide_angle_points(0).len(), 5);
        assert!(scene.building_walls(9).is_empty());

        let near_second = Rect::new(coord! { x: 19.0, y: 4.0 }, coord! { x: 21.0, y: 6.0 });
        assert_eq!(scene.walls_in(near_second).count(), 1);
        assert_eq!(scene.buildings_in(near_second), vec![1]);

        assert_eq!(scene.ground_zone_at(coord! { x: 0.0, y: 0.0 }), Some(0));
        assert_eq!(scene.ground_zone_at(coord! { x: 60.0, y: 0.0 }), None);
        assert_relative_eq!(scene.ground_coefficient_at(coord! { x: 60.0, y: 0.0 }, 0.2), 0.2);
        assert_eq!(scene.envelope().unwrap().max(), coord! { x: 50.0, y: 50.0 });
    }

    #[test]
    fn test_touching_zones() {
        let mut builder = Scene::builder();
        builder
            .add_ground_effect(square(0.0, 0.0, 10.0), 0.0)
            .add_ground_effect(square(10.0, 0.0, 10.0), 1.0)
            .add_ground_effect(square(15.0, 0.0, 10.0), 0.5);
        let scene = builder.finish().unwrap();
        assert!(scene.zones_touch(0, 1));
        assert!(scene.zones_touch(1, 0));
        assert!(!scene.zones_touch(1, 2));
        assert!(!scene.zones_touch(0, 2));
    }

    #[test]
    fn test_invalid_geometry_is_skipped() {
        let mut builder = Scene::builder();
        builder
            .add_building(Building::from_rings(vec![Coord3::flat(0.0, 0.0)], vec![], 5.0))
            .add_wall(&[Coord3::flat(0.0, 0.0)], 2.0, 0.1, None)
            .add_wall(&[Coord3::flat(0.0, 0.0), Coord3::flat(0.0, 0.0)], 2.0, 0.1, None)
            .add_topographic_point(Coord3::new(f64::NAN, 0.0, 0.0));
        let scene = builder.finish().unwrap();
        assert!(scene.buildings().is_empty());
        assert!(scene.walls().is_empty());
        assert!(!scene.has_terrain());
    }

    #[test]
    fn test_degenerate_terrain_is_an_error() {
        let mut builder = Scene::builder();
        builder
            .add_topographic_point(Coord3::new(0.0, 0.0, 0.0))
            .add_topographic_point(Coord3::new(1.0, 0.0, 0.0));
        assert!(matches!(builder.finish(), Err(SceneError::Tin(_))));

        let builder = Scene::builder().max_line_length(-1.0);
        assert!(matches!(builder.finish(), Err(SceneError::Config(_))));
    }

    #[test]
    fn test_scene_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Scene>();
    }
}
