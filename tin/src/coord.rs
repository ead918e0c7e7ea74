use geo::geometry::Coord;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A planar coordinate with an optional elevation.
///
/// An unknown elevation is stored as `NaN` and serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord3 {
    pub x: f64,
    pub y: f64,
    #[serde(
        default = "unknown_z",
        serialize_with = "serialize_z",
        deserialize_with = "deserialize_z"
    )]
    pub z: f64,
}

fn unknown_z() -> f64 {
    f64::NAN
}

fn serialize_z<S: Serializer>(z: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    Some(*z).filter(|z| !z.is_nan()).serialize(serializer)
}

fn deserialize_z<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Coord3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// A coordinate with unknown elevation.
    pub const fn flat(x: f64, y: f64) -> Self {
        Self { x, y, z: f64::NAN }
    }

    /// Planar part of this coordinate.
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    pub fn has_z(&self) -> bool {
        !self.z.is_nan()
    }

    #[must_use]
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = z;
        self
    }

    pub fn distance_2d(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Euclidean distance, falling back to the planar distance when
    /// either elevation is unknown.
    pub fn distance_3d(&self, other: &Self) -> f64 {
        let dz = self.z - other.z;
        if dz.is_nan() {
            self.distance_2d(other)
        } else {
            (self.x - other.x).hypot(self.y - other.y).hypot(dz)
        }
    }
}

impl From<Coord<f64>> for Coord3 {
    fn from(c: Coord<f64>) -> Self {
        Self::flat(c.x, c.y)
    }
}

impl From<(f64, f64, f64)> for Coord3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::Coord3;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_ignores_unknown_z() {
        let a = Coord3::new(0.0, 0.0, 0.0);
        let b = Coord3::flat(3.0, 4.0);
        assert_relative_eq!(a.distance_3d(&b), 5.0);
        assert_relative_eq!(a.distance_3d(&b.with_z(12.0)), 13.0);
        assert!(!b.has_z());
    }

    #[test]
    fn test_unknown_z_serializes_as_null() {
        let json = serde_json::to_string(&Coord3::flat(1.5, -2.0)).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":-2.0,"z":null}"#);
        let back: Coord3 = serde_json::from_str(&json).unwrap();
        assert_eq!((back.x, back.y), (1.5, -2.0));
        assert!(!back.has_z());

        let missing: Coord3 = serde_json::from_str(r#"{"x":0.0,"y":0.0}"#).unwrap();
        assert!(!missing.has_z());

        let known = Coord3::new(3.0, 4.0, 12.5);
        let back: Coord3 = serde_json::from_str(&serde_json::to_string(&known).unwrap()).unwrap();
        assert_eq!(back, known);
    }
}
