//! Frequency bands and wall absorption.
//!
//! # References
//!
//! 1. [Directive (EU) 2015/996, Annex II](https://eur-lex.europa.eu/eli/dir/2015/996/oj)
//! 1. Delany & Bazley, _Acoustical properties of fibrous absorbent
//!    materials_, Applied Acoustics 3 (1970).

use crate::SceneError;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Nominal third-octave band center frequencies (Hz).
pub const NOMINAL_THIRD_OCTAVE: [u32; 24] = [
    50, 63, 80, 100, 125, 160, 200, 250, 315, 400, 500, 630, 800, 1000, 1250, 1600, 2000, 2500,
    3150, 4000, 5000, 6300, 8000, 10000,
];

/// Exact third-octave band center frequencies (Hz), `1000 * 10^(n/10)`.
#[allow(clippy::excessive_precision)]
pub const EXACT_THIRD_OCTAVE: [f64; 24] = [
    50.1187234, 63.0957344, 79.4328235, 100.0, 125.892541, 158.489319, 199.526231, 251.188643,
    316.227766, 398.107171, 501.187234, 630.957344, 794.328235, 1000.0, 1258.92541, 1584.89319,
    1995.26231, 2511.88643, 3162.27766, 3981.07171, 5011.87234, 6309.57344, 7943.28235, 10000.0,
];

/// A-weighting correction per third-octave band (dB).
pub const A_WEIGHTING_THIRD_OCTAVE: [f64; 24] = [
    -30.2, -26.2, -22.5, -19.1, -16.1, -13.4, -10.9, -8.6, -6.6, -4.8, -3.2, -1.9, -0.8, 0.0, 0.6,
    1.0, 1.2, 1.3, 1.2, 1.0, 0.5, -0.1, -1.1, -2.5,
];

/// Flow resistivity bounds (kPa·s/m²) used by the impedance model.
const MIN_RESISTIVITY: f64 = 20.0;
const MAX_RESISTIVITY: f64 = 20_000.0;

/// Ordered set of frequency bands carried by absorption spectra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct FrequencyBands {
    /// Nominal center frequency of each band (Hz).
    nominal: Vec<u32>,

    /// Exact center frequency of each band (Hz).
    exact: Vec<f64>,

    /// A-weighting correction of each band (dB).
    a_weighting: Vec<f64>,
}

impl FrequencyBands {
    /// Builds bands from nominal third-octave frequencies.
    ///
    /// Fails on frequencies that are not third-octave centers.
    pub fn new(nominal: Vec<u32>) -> Result<Self, SceneError> {
        let mut exact = Vec::with_capacity(nominal.len());
        let mut a_weighting = Vec::with_capacity(nominal.len());
        for f in &nominal {
            let i = NOMINAL_THIRD_OCTAVE
                .iter()
                .position(|n| n == f)
                .ok_or(SceneError::Frequency(*f))?;
            exact.push(EXACT_THIRD_OCTAVE[i]);
            a_weighting.push(A_WEIGHTING_THIRD_OCTAVE[i]);
        }
        Ok(Self {
            nominal,
            exact,
            a_weighting,
        })
    }

    /// The eight octave bands from 63 Hz to 8 kHz.
    pub fn octave() -> Self {
        Self::from_indices((1..NOMINAL_THIRD_OCTAVE.len()).step_by(3))
    }

    /// All 24 third-octave bands from 50 Hz to 10 kHz.
    pub fn third_octave() -> Self {
        Self::from_indices(0..NOMINAL_THIRD_OCTAVE.len())
    }

    fn from_indices(indices: impl Iterator<Item = usize> + Clone) -> Self {
        Self {
            nominal: indices.clone().map(|i| NOMINAL_THIRD_OCTAVE[i]).collect(),
            exact: indices.clone().map(|i| EXACT_THIRD_OCTAVE[i]).collect(),
            a_weighting: indices.map(|i| A_WEIGHTING_THIRD_OCTAVE[i]).collect(),
        }
    }

    pub fn nominal(&self) -> &[u32] {
        &self.nominal
    }

    pub fn exact(&self) -> &[f64] {
        &self.exact
    }

    pub fn a_weighting(&self) -> &[f64] {
        &self.a_weighting
    }

    pub fn len(&self) -> usize {
        self.nominal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nominal.is_empty()
    }
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self::octave()
    }
}

impl TryFrom<Vec<u32>> for FrequencyBands {
    type Error = SceneError;

    fn try_from(nominal: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(nominal)
    }
}

impl From<FrequencyBands> for Vec<u32> {
    fn from(bands: FrequencyBands) -> Self {
        bands.nominal
    }
}

/// Acoustic absorption of a wall or building facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Absorption {
    /// One value for every band. Values in `[0, 1]` are absorption
    /// coefficients; anything else is a flow resistivity converted
    /// per band with [`wall_alpha`].
    Scalar(f64),

    /// Absorption coefficient per band. An empty spectrum means the
    /// absorption is unspecified.
    Spectrum(Vec<f64>),
}

impl Default for Absorption {
    fn default() -> Self {
        Self::Spectrum(Vec::new())
    }
}

impl Absorption {
    /// Per-band absorption coefficients for `bands`.
    pub fn spectrum(&self, bands: &FrequencyBands) -> Vec<f64> {
        match self {
            Self::Spectrum(alphas) => alphas.clone(),
            Self::Scalar(value) => bands
                .exact()
                .iter()
                .map(|&f| wall_alpha(*value, f))
                .collect(),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Spectrum(alphas) if alphas.is_empty())
    }
}

impl From<f64> for Absorption {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Absorption {
    fn from(alphas: Vec<f64>) -> Self {
        Self::Spectrum(alphas)
    }
}

/// Absorption coefficient at `frequency` for a wall described by
/// `value`.
///
/// `value` in `[0, 1]` is returned unchanged. Otherwise it is taken
/// as a flow resistivity, clamped to `[20, 20000]`, and converted
/// through the Delany-Bazley impedance.
pub fn wall_alpha(value: f64, frequency: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        statistical_alpha(wall_impedance(
            value.clamp(MIN_RESISTIVITY, MAX_RESISTIVITY),
            frequency,
        ))
    }
}

/// Normalized surface impedance of a porous wall.
pub fn wall_impedance(resistivity: f64, frequency: f64) -> Complex64 {
    let s = (frequency / resistivity).ln();
    Complex64::new(
        1.0 + 9.08 * (-0.75 * s).exp(),
        11.9 * (-0.73 * s).exp(),
    )
}

/// Random incidence absorption coefficient of a surface with
/// normalized `impedance`.
pub fn statistical_alpha(impedance: Complex64) -> f64 {
    let admittance = impedance.inv();
    let (x, y) = (admittance.re, admittance.im);
    let a1 = (x * x - y * y) / y;
    let a2 = y / (x * x + y * y + x);
    let a3 = ((x + 1.0).powi(2) + y * y) / (x * x + y * y);
    8.0 * x * (1.0 + a1 * a2.atan() - x * a3.ln())
}
