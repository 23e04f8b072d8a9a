//! Photopeak line shape.
//!
//! The model is the sum of four components evaluated at channel `x`, with
//! `z = (x − centroid) / width`:
//!
//! - gaussian `A·exp(−z²/2)`
//! - smeared step `S / (1 + e^z)²`, the continuum step under the peak
//! - skew gaussian `K·e^{rz} / (1 + e^z)⁴`, the low-energy tail
//! - quadratic background `q·x² + l·x + o`
//!
//! The exponentials are evaluated in log space so that channels far from the
//! centroid do not overflow.
#![allow(clippy::must_use_candidate, clippy::suboptimal_flops)]

use std::f64::consts::PI;

use crate::special::gamma;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Gaussian photopeak.
pub fn gaussian(x: f64, amplitude: f64, centroid: f64, width: f64) -> f64 {
    let z = (x - centroid) / width;
    amplitude * (-0.5 * z * z).exp()
}

/// Step in the continuum below the peak, smeared by the detector resolution.
pub fn smeared_step(x: f64, centroid: f64, width: f64, amplitude: f64) -> f64 {
    let z = (x - centroid) / width;
    amplitude * (-2.0 * softplus(z)).exp()
}

/// Low-energy tail from incomplete charge collection.
pub fn skew_gaussian(x: f64, centroid: f64, width: f64, amplitude: f64, range: f64) -> f64 {
    let z = (x - centroid) / width;
    amplitude * (range * z - 4.0 * softplus(z)).exp()
}

/// Quadratic background.
pub fn quadratic(x: f64, quadratic: f64, linear: f64, offset: f64) -> f64 {
    (quadratic * x + linear) * x + offset
}

/// Nine-parameter photopeak model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineShape {
    pub amplitude: f64,
    pub centroid: f64,
    pub width: f64,
    pub skew_amplitude: f64,
    pub skew_range: f64,
    pub step_amplitude: f64,
    pub quadratic: f64,
    pub linear: f64,
    pub offset: f64,
}

impl LineShape {
    /// Number of model parameters.
    pub const PARAMETER_COUNT: usize = 9;

    /// Parameter names in [`to_array`](Self::to_array) order.
    pub const PARAMETER_NAMES: [&'static str; 9] = [
        "amplitude",
        "centroid",
        "width",
        "skew_amplitude",
        "skew_range",
        "step_amplitude",
        "quadratic",
        "linear",
        "offset",
    ];

    pub fn from_array(p: [f64; 9]) -> Self {
        Self {
            amplitude: p[0],
            centroid: p[1],
            width: p[2],
            skew_amplitude: p[3],
            skew_range: p[4],
            step_amplitude: p[5],
            quadratic: p[6],
            linear: p[7],
            offset: p[8],
        }
    }

    pub fn to_array(&self) -> [f64; 9] {
        [
            self.amplitude,
            self.centroid,
            self.width,
            self.skew_amplitude,
            self.skew_range,
            self.step_amplitude,
            self.quadratic,
            self.linear,
            self.offset,
        ]
    }

    /// Full model at channel `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.peak(x) + self.continuum(x)
    }

    /// Photopeak counts only (gaussian and tail).
    pub fn peak(&self, x: f64) -> f64 {
        gaussian(x, self.amplitude, self.centroid, self.width)
            + skew_gaussian(
                x,
                self.centroid,
                self.width,
                self.skew_amplitude,
                self.skew_range,
            )
    }

    /// Step and background under the peak.
    pub fn continuum(&self, x: f64) -> f64 {
        smeared_step(x, self.centroid, self.width, self.step_amplitude)
            + quadratic(x, self.quadratic, self.linear, self.offset)
    }

    /// Integrated photopeak counts.
    ///
    /// The tail integral `w·K·Γ(r)·Γ(4−r)/6` only converges for
    /// `0 < r < 4`; outside that range, or when it comes out negative or
    /// larger than the gaussian area, it is discarded.
    pub fn peak_area(&self) -> PeakArea {
        let gaussian = self.amplitude * self.width * (2.0 * PI).sqrt();
        let r = self.skew_range;
        let skew = self.width * self.skew_amplitude * gamma(r) * gamma(4.0 - r) / 6.0;
        let skew_discarded = !skew.is_finite() || skew < 0.0 || skew > gaussian;
        let total = if skew_discarded { gaussian } else { gaussian + skew };
        PeakArea {
            gaussian,
            skew,
            total,
            skew_discarded,
        }
    }
}

/// Photopeak area broken down by component.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakArea {
    pub gaussian: f64,
    /// Tail area as computed, even when discarded.
    pub skew: f64,
    pub total: f64,
    pub skew_discarded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::E;

    fn shape() -> LineShape {
        LineShape {
            amplitude: 2000.0,
            centroid: 500.0,
            width: 4.0,
            skew_amplitude: 150.0,
            skew_range: 1.2,
            step_amplitude: 15.0,
            quadratic: 1e-5,
            linear: 0.002,
            offset: 10.0,
        }
    }

    #[test]
    fn test_components_at_centroid() {
        assert_relative_eq!(gaussian(500.0, 2000.0, 500.0, 4.0), 2000.0);
        assert_relative_eq!(smeared_step(500.0, 500.0, 4.0, 16.0), 4.0);
        assert_relative_eq!(skew_gaussian(500.0, 500.0, 4.0, 160.0, 1.2), 10.0);
        assert_relative_eq!(quadratic(10.0, 1.0, 2.0, 3.0), 123.0);
    }

    #[test]
    fn test_components_far_from_centroid() {
        // Step is flat below the peak and vanishes above it.
        let below = smeared_step(0.0, 500.0, 4.0, 15.0);
        assert_relative_eq!(below, 15.0, max_relative = 1e-12);
        assert_abs_diff_eq!(smeared_step(1e6, 500.0, 0.1, 15.0), 0.0);
        assert_abs_diff_eq!(skew_gaussian(1e6, 500.0, 0.1, 150.0, 1.2), 0.0);
        assert_abs_diff_eq!(skew_gaussian(-1e6, 500.0, 0.1, 150.0, 1.2), 0.0);
        assert!(gaussian(1e6, 1.0, 0.0, 1.0).is_finite());
    }

    #[test]
    fn test_step_is_logistic_and_belongs_to_continuum() {
        // One width above the centroid: S / (1 + e)².
        let step = smeared_step(504.0, 500.0, 4.0, 16.0);
        assert_relative_eq!(step, 16.0 / (1.0 + E).powi(2), max_relative = 1e-12);

        let shape = shape();
        let x = 503.0;
        let step = smeared_step(x, 500.0, 4.0, 15.0);
        let background = quadratic(x, 1e-5, 0.002, 10.0);
        assert_relative_eq!(shape.continuum(x), step + background);
        let tail = skew_gaussian(x, 500.0, 4.0, 150.0, 1.2);
        assert_relative_eq!(shape.peak(x), gaussian(x, 2000.0, 500.0, 4.0) + tail);
        assert_relative_eq!(shape.evaluate(x), shape.peak(x) + shape.continuum(x));
    }

    #[test]
    fn test_array_round_trip() {
        let s = shape();
        assert_eq!(LineShape::from_array(s.to_array()), s);
        assert_relative_eq!(s.evaluate(510.0), s.peak(510.0) + s.continuum(510.0));
    }

    #[test]
    fn test_peak_area_matches_numeric_integral() {
        let s = shape();
        let area = s.peak_area();
        assert!(!area.skew_discarded);

        let step = 0.01;
        let numeric: f64 = (0..200_000)
            .map(|i| s.peak(s.centroid - 1000.0 + f64::from(i) * step) * step)
            .sum();
        assert_relative_eq!(area.total, numeric, max_relative = 1e-4);
        assert_relative_eq!(area.gaussian, 2000.0 * 4.0 * (2.0 * PI).sqrt());
    }

    #[test]
    fn test_skew_term_discarded() {
        let divergent = LineShape {
            skew_range: 4.5,
            ..shape()
        };
        let area = divergent.peak_area();
        assert!(area.skew_discarded);
        assert_relative_eq!(area.total, area.gaussian);

        let huge = LineShape {
            skew_amplitude: 1e7,
            ..shape()
        };
        assert!(huge.peak_area().skew_discarded);

        let integer = LineShape {
            skew_range: 4.0,
            ..shape()
        };
        assert!(integer.peak_area().skew_discarded);
    }
}
