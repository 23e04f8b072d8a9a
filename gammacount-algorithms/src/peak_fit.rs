//! Photopeak fitting.
//!
//! A fit runs in two stages. A plain gaussian fitted to the channels around
//! the strongest local maximum fixes the amplitude and centroid; the full
//! [`LineShape`] is then fitted with those two held, weighted by the count
//! uncertainties and bounded to non-negative values.
//!
//! The skew range is held inside `(0, 4)`, where the tail integral
//! converges. Near zero the tail turns into a second step and its area
//! diverges.
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss
)]

use gammacount_core::{Diagnostic, DiagnosticKind, Diagnostics, Error, Result, Spectrum};
use nalgebra::DMatrix;

use crate::line_model::{gaussian, LineShape, PeakArea};
use crate::lm::{Bounds, LeastSquaresProblem, LevenbergMarquardt, LmConfig};
use crate::peak_find::find_peaks;
use crate::stats::reduced_chi_square;
use crate::windows::PeakWindow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Indices of the fitted parameters within [`LineShape::to_array`].
const FREE: [usize; 7] = [2, 3, 4, 5, 6, 7, 8];

/// Position of the skew range among the fitted parameters.
const SKEW_RANGE: usize = 2;

/// Fit settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakFitConfig {
    /// Samples either side of the seed used for the gaussian pre-fit.
    pub peak_width: usize,
    /// Lower bound on every fitted parameter.
    pub lower_bound: f64,
    /// Upper bound on every fitted parameter.
    pub upper_bound: f64,
    /// Tighter interval for the skew range, inside the common bounds.
    pub skew_range_bounds: (f64, f64),
    /// Seed detection threshold, relative to the counts range.
    pub seed_threshold: f64,
    /// Seed detection minimum peak separation (samples).
    pub seed_min_distance: usize,
    pub lm: LmConfig,
}

impl Default for PeakFitConfig {
    fn default() -> Self {
        Self {
            peak_width: 20,
            lower_bound: 0.0,
            upper_bound: 5e5,
            skew_range_bounds: (0.5, 3.5),
            seed_threshold: 0.25,
            seed_min_distance: 10,
            lm: LmConfig::default(),
        }
    }
}

impl PeakFitConfig {
    #[must_use]
    pub fn with_peak_width(mut self, samples: usize) -> Self {
        self.peak_width = samples;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    #[must_use]
    pub fn with_skew_range_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.skew_range_bounds = (lower, upper);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, threshold: f64, min_distance: usize) -> Self {
        self.seed_threshold = threshold;
        self.seed_min_distance = min_distance;
        self
    }

    #[must_use]
    pub fn with_lm(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }
}

/// Outcome of a photopeak fit.
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    pub shape: LineShape,
    /// 9×9 covariance in [`LineShape::to_array`] order; the held amplitude
    /// and centroid have zero rows and columns.
    pub covariance: DMatrix<f64>,
    /// Integrated photopeak counts.
    pub peak_counts: f64,
    /// Poisson uncertainty of `peak_counts`.
    pub peak_counts_std: f64,
    pub area: PeakArea,
    pub reduced_chi_square: f64,
    /// Iterations of the full-model fit.
    pub iterations: usize,
    /// Sample index the fit was seeded from.
    pub seed_index: usize,
    pub diagnostics: Diagnostics,
}

impl FitResult {
    /// One-sigma parameter uncertainties from the covariance diagonal.
    pub fn parameter_std(&self) -> [f64; 9] {
        let mut std = [0.0; 9];
        for (i, s) in std.iter_mut().enumerate() {
            *s = self.covariance[(i, i)].max(0.0).sqrt();
        }
        std
    }
}

/// Unweighted three-parameter gaussian.
struct GaussianProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
}

impl LeastSquaresProblem for GaussianProblem<'_> {
    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn residuals(&self, p: &[f64], out: &mut [f64]) {
        for ((o, &x), &y) in out.iter_mut().zip(self.x).zip(self.y) {
            *o = y - gaussian(x, p[0], p[1], p[2]);
        }
    }
}

/// Weighted full line shape with amplitude and centroid held.
struct LineProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
    sigma: &'a [f64],
    amplitude: f64,
    centroid: f64,
}

impl LineProblem<'_> {
    fn shape(&self, p: &[f64]) -> LineShape {
        LineShape {
            amplitude: self.amplitude,
            centroid: self.centroid,
            width: p[0],
            skew_amplitude: p[1],
            skew_range: p[2],
            step_amplitude: p[3],
            quadratic: p[4],
            linear: p[5],
            offset: p[6],
        }
    }
}

impl LeastSquaresProblem for LineProblem<'_> {
    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn residuals(&self, p: &[f64], out: &mut [f64]) {
        let shape = self.shape(p);
        for (((o, &x), &y), &s) in out.iter_mut().zip(self.x).zip(self.y).zip(self.sigma) {
            *o = (y - shape.evaluate(x)) / s;
        }
    }
}

/// Photopeak fitter.
#[derive(Clone, Debug, Default)]
pub struct PeakFitter {
    config: PeakFitConfig,
}

impl PeakFitter {
    pub fn new(config: PeakFitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PeakFitConfig {
        &self.config
    }

    /// Fits the window `window` of `spectrum`.
    pub fn fit_window(&self, spectrum: &Spectrum, window: &PeakWindow) -> Result<FitResult> {
        let (x, y) = spectrum.slice(window.low, window.high);
        self.fit(&x, &y, None)
    }

    /// Fits one photopeak.
    ///
    /// `count_std` defaults to `√counts`, with empty channels given an
    /// uncertainty of one count.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for mismatched or non-finite inputs and for
    /// nine or fewer samples, and `FitDidNotConverge` when either stage of
    /// the fit fails to converge.
    pub fn fit(
        &self,
        channels: &[f64],
        counts: &[f64],
        count_std: Option<&[f64]>,
    ) -> Result<FitResult> {
        self.validate(channels, counts, count_std)?;
        let mut diagnostics = Diagnostics::new();

        let seed = self.seed_index(counts, &mut diagnostics);
        let (amplitude, centroid, width) = self.gaussian_prefit(channels, counts, seed)?;
        log::debug!("gaussian seed: a {amplitude:.3}, c {centroid:.3}, w {width:.3}");

        let sigma: Vec<f64> = match count_std {
            Some(std) => std.to_vec(),
            None => counts
                .iter()
                .map(|&c| if c > 0.0 { c.sqrt() } else { 1.0 })
                .collect(),
        };

        let problem = LineProblem {
            x: channels,
            y: counts,
            sigma: &sigma,
            amplitude,
            centroid,
        };
        let initial = initial_guess(counts, amplitude, width, self.config.skew_range_bounds);
        let solver = LevenbergMarquardt::new(self.config.lm.clone());
        let report = solver.minimize(&problem, &initial, &self.bounds())?;

        let shape = problem.shape(&report.params);
        let area = shape.peak_area();
        if area.skew_discarded {
            diagnostics.push(Diagnostic::warning(DiagnosticKind::SkewTermDiscarded {
                skew: area.skew,
                gaussian: area.gaussian,
            }));
        }

        let n = LineShape::PARAMETER_COUNT;
        let mut covariance = DMatrix::zeros(n, n);
        for (a, &i) in FREE.iter().enumerate() {
            for (b, &j) in FREE.iter().enumerate() {
                covariance[(i, j)] = report.covariance[(a, b)];
            }
        }

        let model: Vec<f64> = channels.iter().map(|&x| shape.evaluate(x)).collect();
        let reduced_chi_square = reduced_chi_square(counts, &model, Some(&sigma), n)?;

        let peak_counts = area.total;
        Ok(FitResult {
            shape,
            covariance,
            peak_counts,
            peak_counts_std: peak_counts.max(0.0).sqrt(),
            area,
            reduced_chi_square,
            iterations: report.iterations,
            seed_index: seed,
            diagnostics,
        })
    }

    fn validate(&self, channels: &[f64], counts: &[f64], count_std: Option<&[f64]>) -> Result<()> {
        Error::ensure(
            channels.len() == counts.len(),
            "counts",
            format!("{} counts for {} channels", counts.len(), channels.len()),
        )?;
        Error::ensure(
            counts.len() > LineShape::PARAMETER_COUNT,
            "counts",
            format!(
                "{} samples cannot constrain {} parameters",
                counts.len(),
                LineShape::PARAMETER_COUNT
            ),
        )?;
        Error::ensure(
            channels.iter().chain(counts).all(|v| v.is_finite()),
            "counts",
            "channels and counts must be finite",
        )?;
        Error::ensure(
            self.config.lower_bound < self.config.upper_bound,
            "upper_bound",
            "must exceed lower_bound",
        )?;
        let (lo, hi) = self.config.skew_range_bounds;
        Error::ensure(
            lo >= self.config.lower_bound && hi <= self.config.upper_bound && lo < hi,
            "skew_range_bounds",
            format!("({lo}, {hi}) must be a non-empty interval within the parameter bounds"),
        )?;
        if let Some(std) = count_std {
            Error::ensure(
                std.len() == counts.len(),
                "count_std",
                format!("{} uncertainties for {} counts", std.len(), counts.len()),
            )?;
            Error::ensure(
                std.iter().all(|s| s.is_finite() && *s > 0.0),
                "count_std",
                "uncertainties must be greater than zero",
            )?;
        }
        Ok(())
    }

    fn bounds(&self) -> Bounds {
        let mut bounds =
            Bounds::uniform(FREE.len(), self.config.lower_bound, self.config.upper_bound);
        (bounds.lower[SKEW_RANGE], bounds.upper[SKEW_RANGE]) = self.config.skew_range_bounds;
        bounds
    }

    /// Highest detected peak, or the window maximum when nothing is detected.
    fn seed_index(&self, counts: &[f64], diagnostics: &mut Diagnostics) -> usize {
        let detected = find_peaks(
            counts,
            self.config.seed_threshold,
            self.config.seed_min_distance,
        );
        if let Some(best) = argmax(&detected, |&i| counts[i]) {
            return detected[best];
        }
        let index = argmax(counts, |&c| c).unwrap_or(0);
        diagnostics.push(Diagnostic::warning(DiagnosticKind::SeedFallback { index }));
        index
    }

    fn gaussian_prefit(
        &self,
        channels: &[f64],
        counts: &[f64],
        seed: usize,
    ) -> Result<(f64, f64, f64)> {
        let lo = seed.saturating_sub(self.config.peak_width);
        let hi = (seed + self.config.peak_width + 1).min(counts.len());
        let (x, y) = (&channels[lo..hi], &counts[lo..hi]);
        let problem = GaussianProblem { x, y };
        let initial = [counts[seed], channels[seed], half_max_width(x, y, seed - lo)];
        let solver = LevenbergMarquardt::new(self.config.lm.clone());
        let report = solver.minimize(&problem, &initial, &Bounds::unbounded(3))?;
        Ok((report.params[0], report.params[1], report.params[2].abs()))
    }
}

/// Index of the first largest value of `key`.
fn argmax<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, item) in items.iter().enumerate() {
        let value = key(item);
        match best {
            Some((_, b)) if b >= value => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

/// Gaussian width estimated from the full width at half maximum around `peak`.
fn half_max_width(x: &[f64], y: &[f64], peak: usize) -> f64 {
    let half = y[peak] / 2.0;
    let below = |i: &usize| y[*i] < half;
    let left = (0..peak).rev().find(below).unwrap_or(0);
    let right = (peak + 1..y.len()).find(below).unwrap_or(y.len() - 1);
    ((x[right] - x[left]) / (8.0 * std::f64::consts::LN_2).sqrt()).max(1.0)
}

/// Starting point for `[width, skew amplitude, skew range, step, quadratic,
/// linear, offset]`: the continuum level comes from the window edges, where
/// the step is fully on (low side) or off (high side).
fn initial_guess(counts: &[f64], amplitude: f64, width: f64, skew_range: (f64, f64)) -> [f64; 7] {
    let edge = (counts.len() / 10).clamp(1, 5);
    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    let low = mean(&counts[..edge]);
    let high = mean(&counts[counts.len() - edge..]);
    [
        width,
        amplitude / 20.0,
        (width / 4.0).clamp(skew_range.0, skew_range.1),
        (low - high).max(0.0),
        0.0,
        0.0,
        high.max(0.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn noiseless(shape: &LineShape, range: std::ops::Range<i32>) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = range.map(f64::from).collect();
        let y = x.iter().map(|&x| shape.evaluate(x)).collect();
        (x, y)
    }

    fn truth() -> LineShape {
        LineShape {
            amplitude: 1500.0,
            centroid: 300.0,
            width: 3.0,
            skew_amplitude: 60.0,
            skew_range: 1.5,
            step_amplitude: 12.0,
            quadratic: 0.0,
            linear: 0.01,
            offset: 20.0,
        }
    }

    #[test]
    fn test_noiseless_fit_recovers_area() {
        let shape = truth();
        let (x, y) = noiseless(&shape, 240..361);
        let result = PeakFitter::default().fit(&x, &y, None).unwrap();

        let expected = shape.peak_area().total;
        assert_relative_eq!(result.peak_counts, expected, max_relative = 0.02);
        assert_relative_eq!(result.peak_counts_std, result.peak_counts.sqrt());
        assert_relative_eq!(result.shape.centroid, 300.0, epsilon = 0.2);
        assert_eq!(result.seed_index, 60);
        assert!(result.reduced_chi_square < 1.0);
    }

    #[test]
    fn test_covariance_layout() {
        let (x, y) = noiseless(&truth(), 240..361);
        let result = PeakFitter::default().fit(&x, &y, None).unwrap();
        assert_eq!(result.covariance.shape(), (9, 9));
        for k in 0..9 {
            assert_relative_eq!(result.covariance[(0, k)], 0.0);
            assert_relative_eq!(result.covariance[(k, 1)], 0.0);
        }
        assert!(result.covariance[(2, 2)] > 0.0);
        let std = result.parameter_std();
        assert_relative_eq!(std[0], 0.0);
        assert!(std[2] > 0.0);
    }

    #[test]
    fn test_fitted_parameters_respect_bounds() {
        let (x, y) = noiseless(&truth(), 240..361);
        let result = PeakFitter::default().fit(&x, &y, None).unwrap();
        for (k, value) in result.shape.to_array().iter().enumerate().skip(2) {
            assert!((0.0..=5e5).contains(value), "parameter {k} = {value}");
        }
    }

    #[test]
    fn test_skew_range_stays_in_convergent_interval() {
        let (x, y) = noiseless(&truth(), 240..361);
        let result = PeakFitter::default().fit(&x, &y, None).unwrap();
        assert!((0.5..=3.5).contains(&result.shape.skew_range));

        let inverted = PeakFitConfig::default().with_skew_range_bounds(3.0, 1.0);
        let err = PeakFitter::new(inverted).fit(&x, &y, None).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_seed_falls_back_to_maximum() {
        // Monotonic data has no local maximum.
        let x: Vec<f64> = (0..30).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 10.0 + v).collect();
        let mut diagnostics = Diagnostics::new();
        let seed = PeakFitter::default().seed_index(&y, &mut diagnostics);
        assert_eq!(seed, 29);
        let fallback = DiagnosticKind::SeedFallback { index: 29 };
        assert!(diagnostics.any(|k| *k == fallback));
    }

    #[test]
    fn test_rejects_short_or_mismatched_input() {
        let fitter = PeakFitter::default();
        let x: Vec<f64> = (0..9).map(f64::from).collect();
        let y = vec![1.0; 9];
        let err = fitter.fit(&x, &y, None).unwrap_err();
        assert!(err.is_invalid_parameter());

        let x: Vec<f64> = (0..20).map(f64::from).collect();
        assert!(fitter.fit(&x, &y, None).is_err());
        let y = vec![1.0; 20];
        assert!(fitter.fit(&x, &y, Some(&[0.0; 20])).is_err());
    }

    #[test]
    fn test_half_max_width() {
        let x: Vec<f64> = (0..41).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|&v| gaussian(v, 100.0, 20.0, 4.0)).collect();
        let w = half_max_width(&x, &y, 20);
        assert!(w > 3.0 && w < 5.5, "{w}");
    }
}
