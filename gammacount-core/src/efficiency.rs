//! Full-energy-peak efficiency curves.
//!
//! Efficiency curves are fitted per counting position. [`EfficiencyModel`]
//! covers the curve families in use for high-purity germanium detectors and
//! [`EfficiencyTable`] maps counting positions (source-detector distance) to
//! the curve measured there.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Full-energy-peak efficiency as a function of gamma energy in keV.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum EfficiencyModel {
    /// `10a − 10b·log₁₀E + 0.1c·(log₁₀E)² − 10⁴d/E²`
    LogQuadratic { a: f64, b: f64, c: f64, d: f64 },
    /// Four-factor form `1 / (a·E^b + c·E^d)`. Not valid below ~100 keV.
    FourFactor { a: f64, b: f64, c: f64, d: f64 },
    /// Fifth-order polynomial in `ln E`, lowest order first.
    LogPolynomial { coefficients: [f64; 6] },
    /// Energy-independent efficiency.
    Constant { efficiency: f64 },
}

impl EfficiencyModel {
    /// Log-quadratic curve for a germanium detector at 1 cm.
    #[must_use]
    pub fn germanium_log_quadratic() -> Self {
        Self::LogQuadratic {
            a: 0.032_791_01,
            b: 0.014_624_66,
            c: 0.150_079_03,
            d: -0.015_957_4,
        }
    }

    /// Four-factor curve for a germanium detector at 1 cm.
    #[must_use]
    pub fn germanium_four_factor() -> Self {
        Self::FourFactor {
            a: 6.007_689_00e-01,
            b: 5.848_427_44e-01,
            c: 3.117_570_94e-11,
            d: 3.760_813_47,
        }
    }

    /// Log-polynomial curve for a germanium detector at 1 cm.
    #[must_use]
    pub fn germanium_log_polynomial() -> Self {
        Self::LogPolynomial {
            coefficients: [
                -5.868_286_77e+01,
                5.190_512_12e+01,
                -1.810_788_95e+01,
                3.124_512_64,
                -2.670_441_86e-01,
                9.050_960_28e-03,
            ],
        }
    }

    /// Evaluates the curve at `energy` keV.
    #[must_use]
    pub fn eval(&self, energy: f64) -> f64 {
        match *self {
            Self::LogQuadratic { a, b, c, d } => {
                let l = energy.log10();
                a * 10.0 - b * 10.0 * l + c * 0.1 * l * l - d * 1e4 / (energy * energy)
            }
            Self::FourFactor { a, b, c, d } => 1.0 / (a * energy.powf(b) + c * energy.powf(d)),
            Self::LogPolynomial { coefficients } => {
                let l = energy.ln();
                coefficients.iter().rev().fold(0.0, |acc, &k| acc * l + k)
            }
            Self::Constant { efficiency } => efficiency,
        }
    }
}

impl Default for EfficiencyModel {
    fn default() -> Self {
        Self::germanium_log_quadratic()
    }
}

/// One counting position and its efficiency curve.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EfficiencyEntry {
    /// Source-detector distance in cm.
    pub distance: f64,
    /// Curve measured at that distance.
    pub model: EfficiencyModel,
}

/// Counting position → efficiency curve lookup.
///
/// Built once before schedule optimisation. Distances are matched with a
/// small absolute tolerance; when nothing matches, the fallback model is used
/// if one was set.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EfficiencyTable {
    #[cfg_attr(feature = "serde", serde(default))]
    entries: Vec<EfficiencyEntry>,
    #[cfg_attr(feature = "serde", serde(default))]
    fallback: Option<EfficiencyModel>,
}

const DISTANCE_TOLERANCE: f64 = 1e-6;

impl EfficiencyEntry {
    fn is_at(&self, distance: f64) -> bool {
        (self.distance - distance).abs() <= DISTANCE_TOLERANCE
    }
}

impl EfficiencyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that answers every lookup with `model`.
    #[must_use]
    pub fn uniform(model: EfficiencyModel) -> Self {
        Self {
            entries: Vec::new(),
            fallback: Some(model),
        }
    }

    /// Registers the curve for a counting position, replacing any previous one.
    #[must_use]
    pub fn with_position(mut self, distance: f64, model: EfficiencyModel) -> Self {
        self.insert(distance, model);
        self
    }

    /// Sets the model used when no position matches.
    #[must_use]
    pub fn with_fallback(mut self, model: EfficiencyModel) -> Self {
        self.fallback = Some(model);
        self
    }

    /// Registers the curve for a counting position, replacing any previous one.
    pub fn insert(&mut self, distance: f64, model: EfficiencyModel) {
        match self.entries.iter_mut().find(|e| e.is_at(distance)) {
            Some(entry) => entry.model = model,
            None => self.entries.push(EfficiencyEntry { distance, model }),
        }
    }

    /// Returns the curve for a counting position.
    ///
    /// # Errors
    /// Returns `MissingEfficiency` if no entry matches and there is no fallback.
    pub fn lookup(&self, distance: f64) -> Result<&EfficiencyModel> {
        self.entries
            .iter()
            .find(|e| e.is_at(distance))
            .map(|e| &e.model)
            .or(self.fallback.as_ref())
            .ok_or(Error::MissingEfficiency(distance))
    }

    /// Number of explicit positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no explicit positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
