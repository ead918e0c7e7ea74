use crate::{CutProfile, Scene};
use log::debug;
use rayon::prelude::*;
use tin::Coord3;

impl Scene {
    /// Builds the profiles from `source` to each of `receivers` in
    /// parallel.
    ///
    /// Results are in receiver order and identical to calling
    /// [`Scene::build_profile`] for each receiver in turn.
    pub fn profiles(
        &self,
        source: Coord3,
        receivers: &[Coord3],
        default_ground_coefficient: f64,
        stop_at_obstacle: bool,
    ) -> Vec<CutProfile> {
        let now = std::time::Instant::now();
        let profiles: Vec<CutProfile> = receivers
            .par_iter()
            .map(|&receiver| {
                self.build_profile(source, receiver, default_ground_coefficient, stop_at_obstacle)
            })
            .collect();
        debug!(
            "profiles; receivers: {}, exec: {:?}",
            receivers.len(),
            now.elapsed()
        );
        profiles
    }
}

#[cfg(test)]
mod tests {
    use crate::{Building, Scene};
    use geo::polygon;
    use tin::Coord3;

    #[test]
    fn test_profiles_match_sequential() {
        let mut builder = Scene::builder();
        builder
            .add_building(Building::new(
                polygon![(x: 40.0, y: -20.0), (x: 60.0, y: -20.0), (x: 60.0, y: 20.0), (x: 40.0, y: 20.0)],
                10.0,
            ))
            .add_ground_effect(
                polygon![(x: 0.0, y: -50.0), (x: 30.0, y: -50.0), (x: 30.0, y: 50.0), (x: 0.0, y: 50.0)],
                0.8,
            );
        let scene = builder.finish().unwrap();

        let source = Coord3::new(0.0, 0.0, 1.0);
        let receivers: Vec<Coord3> = (0..32)
            .map(|i| Coord3::new(100.0, -40.0 + 2.5 * i as f64, 4.0))
            .collect();

        let parallel = scene.profiles(source, &receivers, 0.0, false);
        assert_eq!(parallel.len(), receivers.len());
        for (profile, receiver) in parallel.iter().zip(&receivers) {
            assert_eq!(profile, &scene.build_profile(source, *receiver, 0.0, false));
        }
        assert!(scene.profiles(source, &[], 0.0, false).is_empty());
    }
}
