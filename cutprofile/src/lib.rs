//! # Cut Profiles
//!
//! `cutprofile` builds the vertical cut of a propagation scene between
//! a sound source and a receiver: terrain breakpoints, building and
//! wall crossings and ground coefficient changes, in order along the
//! line.
//!
//! ```no_run
//! use cutprofile::{geo::polygon, tin::Coord3, Building, Scene};
//!
//! let mut builder = Scene::builder().max_line_length(60.0);
//! builder
//!     .add_building(Building::new(
//!         polygon![(x: 40.0, y: -10.0), (x: 60.0, y: -10.0), (x: 60.0, y: 10.0), (x: 40.0, y: 10.0)],
//!         10.0,
//!     ))
//!     .add_ground_effect(
//!         polygon![(x: 0.0, y: -50.0), (x: 30.0, y: -50.0), (x: 30.0, y: 50.0), (x: 0.0, y: 50.0)],
//!         0.9,
//!     );
//! let scene = builder.finish()?;
//!
//! let profile = scene.build_profile(
//!     Coord3::new(0.0, 0.0, 1.0),
//!     Coord3::new(100.0, 0.0, 4.0),
//!     0.0,
//!     false,
//! );
//! assert!(!profile.is_free_field());
//! # Ok::<(), cutprofile::SceneError>(())
//! ```

mod absorption;
mod batch;
mod config;
mod cut;
mod error;
mod index;
pub mod math;
mod obstacle;
mod profile;
mod scene;
mod side_hull;
mod wide_angle;

pub use {
    crate::{
        absorption::{
            statistical_alpha, wall_alpha, wall_impedance, Absorption, FrequencyBands,
            A_WEIGHTING_THIRD_OCTAVE, EXACT_THIRD_OCTAVE, NOMINAL_THIRD_OCTAVE,
        },
        config::SceneConfig,
        cut::MILLIMETER,
        error::SceneError,
        index::EnvelopeIndex,
        obstacle::{Building, GroundZone, ObstacleKind, ProcessedWall, Wall},
        profile::{
            CutPoint, CutPointKind, CutProfile, ObstacleCrossing, ProfileKind, ReflectionPoint,
            WallCrossing, DEFAULT_ROOF_GROUND_COEFFICIENT,
        },
        scene::{Scene, SceneBuilder},
        side_hull::{filter_by_side, CornerSet, CutPlane, Obstacle, Side},
        wide_angle::{wide_angle_points, WIDE_ANGLE_EPSILON},
    },
    geo, tin,
};
