use crate::{FrequencyBands, SceneError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Scene construction and query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Longest chunk (meters) a query segment is split into before
    /// probing the obstacle indexes.
    pub max_line_length: f64,

    /// Treat building and wall elevations as absolute. When `false`,
    /// heights are relative to the ground under the footprint.
    pub absolute_building_z: bool,

    /// Bands used to expand scalar absorption into spectra.
    pub frequencies: FrequencyBands,

    /// Ground coefficient `G` outside every ground zone.
    pub default_ground_coefficient: f64,

    /// Opening angle range (radians) of polygon corners kept as wide
    /// angle diffraction points.
    pub wide_angle_range: (f64, f64),
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_line_length: 60.0,
            absolute_building_z: false,
            frequencies: FrequencyBands::default(),
            default_ground_coefficient: 0.0,
            wide_angle_range: (0.0, 2.0 * PI),
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), SceneError> {
        if !(self.max_line_length.is_finite() && self.max_line_length > 0.0) {
            return Err(SceneError::Config(format!(
                "max_line_length must be positive, got {}",
                self.max_line_length
            )));
        }
        if !(0.0..=1.0).contains(&self.default_ground_coefficient) {
            return Err(SceneError::Config(format!(
                "default_ground_coefficient must be in [0, 1], got {}",
                self.default_ground_coefficient
            )));
        }
        let (min, max) = self.wide_angle_range;
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(SceneError::Config(format!(
                "empty wide_angle_range ({min}, {max})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SceneConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_config() {
        let config: SceneConfig =
            serde_json::from_str(r#"{"max_line_length": 25.0, "frequencies": [500, 1000]}"#)
                .unwrap();
        assert_relative_eq!(config.max_line_length, 25.0);
        assert_eq!(config.frequencies.nominal(), &[500, 1000]);
        assert!(!config.absolute_building_z);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = SceneConfig {
            max_line_length: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = SceneConfig {
            default_ground_coefficient: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
