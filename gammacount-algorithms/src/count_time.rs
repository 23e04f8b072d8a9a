//! Count time for a single gamma line under decay and background.
//!
//! The foreground time needed for a relative precision σ on the net rate
//! follows Knoll (3rd ed., ch. 3) for the optimal split between foreground
//! and background counting. Because the source decays while it is counted,
//! the rate in that relation is the mean observed rate over the count, which
//! itself depends on the count time; the two are solved by fixed-point
//! iteration starting from a one second count.
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use gammacount_core::{
    decay_constant, ActivityUnit, Diagnostic, DiagnosticKind, Diagnostics, Error, Result,
    INFEASIBLE_TIME,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Iteration controls and dead-time advisory settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountTimeConfig {
    /// Stop once successive count times differ by less than this (s).
    pub precision: f64,
    /// Give up after this many fixed-point steps.
    pub max_iterations: usize,
    /// Non-paralyzable dead time per recorded count (s).
    pub dead_time_per_count: f64,
    /// Dead fraction above which a warning is raised.
    pub dead_time_warn_fraction: f64,
}

impl Default for CountTimeConfig {
    fn default() -> Self {
        Self {
            precision: 1.0,
            max_iterations: 10_000,
            dead_time_per_count: 1e-5,
            dead_time_warn_fraction: 0.05,
        }
    }
}

impl CountTimeConfig {
    #[must_use]
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_dead_time(mut self, per_count: f64, warn_fraction: f64) -> Self {
        self.dead_time_per_count = per_count;
        self.dead_time_warn_fraction = warn_fraction;
        self
    }

    fn validate(&self) -> Result<()> {
        Error::ensure(
            self.precision.is_finite() && self.precision > 0.0,
            "precision",
            "must be greater than zero",
        )?;
        Error::ensure(
            self.max_iterations > 0,
            "max_iterations",
            "must be at least 1",
        )?;
        Error::ensure(
            self.dead_time_per_count.is_finite() && self.dead_time_per_count >= 0.0,
            "dead_time_per_count",
            "must be non-negative",
        )
    }
}

/// One count-time problem.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountTimeRequest {
    /// Target relative uncertainty of the net rate, in (0, 1].
    pub sigma: f64,
    /// Half-life in seconds.
    pub half_life: f64,
    /// Activity (or atoms) at the start of the count, in `units`.
    pub initial: f64,
    /// Absolute full-energy-peak efficiency, in (0, 1].
    pub efficiency: f64,
    /// Background rate under the peak (cps).
    pub background: f64,
    /// Unit of `initial`.
    pub units: ActivityUnit,
    /// Subject attached to diagnostics.
    pub label: Option<String>,
}

impl CountTimeRequest {
    /// Default background rate under the peak (cps).
    pub const DEFAULT_BACKGROUND: f64 = 0.001;

    /// Creates a request with the default background and Bq units.
    pub fn new(sigma: f64, half_life: f64, initial: f64, efficiency: f64) -> Self {
        Self {
            sigma,
            half_life,
            initial,
            efficiency,
            background: Self::DEFAULT_BACKGROUND,
            units: ActivityUnit::Becquerel,
            label: None,
        }
    }

    #[must_use]
    pub fn with_background(mut self, background: f64) -> Self {
        self.background = background;
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: ActivityUnit) -> Self {
        self.units = units;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn validate(&self) -> Result<()> {
        Error::ensure(
            self.sigma > 0.0 && self.sigma <= 1.0,
            "sigma",
            format!("must lie in (0, 1], got {}", self.sigma),
        )?;
        Error::ensure(
            self.half_life.is_finite() && self.half_life > 0.0,
            "half_life",
            format!("must be greater than zero, got {}", self.half_life),
        )?;
        Error::ensure(
            self.initial.is_finite() && self.initial >= 0.0,
            "initial",
            format!("must be non-negative, got {}", self.initial),
        )?;
        Error::ensure(
            self.efficiency > 0.0 && self.efficiency <= 1.0,
            "efficiency",
            format!("must lie in (0, 1], got {}", self.efficiency),
        )?;
        Error::ensure(
            self.background.is_finite() && self.background >= 0.0,
            "background",
            format!("must be non-negative, got {}", self.background),
        )
    }

    fn diagnostic(&self, diagnostic: Diagnostic) -> Diagnostic {
        match &self.label {
            Some(label) => diagnostic.with_subject(label.clone()),
            None => diagnostic,
        }
    }
}

/// Result of a count-time solve.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountTimeSolution {
    /// Foreground (sample) count time in seconds.
    pub live_time: f64,
    /// Matching background count time in seconds.
    pub background_time: f64,
    /// Mean observed rate over the foreground count (cps).
    pub mean_rate: f64,
    /// Fixed-point steps taken.
    pub iterations: usize,
    /// False when the sentinel time was returned.
    pub feasible: bool,
    /// Advisories raised while solving.
    pub diagnostics: Diagnostics,
}

/// Fixed-point count-time solver.
#[derive(Clone, Debug, Default)]
pub struct CountTimeSolver {
    config: CountTimeConfig,
}

impl CountTimeSolver {
    pub fn new(config: CountTimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CountTimeConfig {
        &self.config
    }

    /// Solves for the foreground and background count times.
    ///
    /// Unreachable targets are not errors: they return
    /// [`INFEASIBLE_TIME`] for both times with `feasible == false`.
    /// Diagnostics are logged and returned in the solution.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when the request or configuration is out of
    /// range.
    pub fn solve(&self, request: &CountTimeRequest) -> Result<CountTimeSolution> {
        let solution = self.solve_quiet(request)?;
        solution.diagnostics.emit();
        Ok(solution)
    }

    /// As [`solve`](Self::solve) but leaves logging to the caller.
    pub(crate) fn solve_quiet(&self, request: &CountTimeRequest) -> Result<CountTimeSolution> {
        self.config.validate()?;
        request.validate()?;

        let lambda = decay_constant(request.half_life)?;
        let mut diagnostics = Diagnostics::new();
        if !request.units.is_recognized() {
            diagnostics.record(request.diagnostic(Diagnostic::warning(
                DiagnosticKind::UnrecognizedUnits {
                    units: request.units.to_string(),
                },
            )));
        }

        // Observed rate at t = 0: atoms decay at λN, activities are already rates.
        let initial_rate = if request.units.is_atoms() {
            request.efficiency * lambda * request.initial
        } else {
            request.efficiency * request.initial * request.units.to_base_factor()
        };
        self.check_dead_time(request, initial_rate, &mut diagnostics);

        let mean_rate = |tf: f64| initial_rate * -(-lambda * tf).exp_m1() / (lambda * tf);
        let sigma_sq = request.sigma * request.sigma;
        let bg = request.background;

        let mut tf = 1.0;
        for iteration in 1..=self.config.max_iterations {
            let rate = mean_rate(tf);
            let Some(next) = knoll_time(rate, bg, sigma_sq) else {
                log::debug!("count time diverged after {iteration} steps (rate {rate:e})");
                return Ok(Self::infeasible(request, iteration, rate, diagnostics));
            };
            let delta = (next - tf).abs();
            tf = next;
            if delta < self.config.precision {
                let background_time = if bg > 0.0 {
                    tf / ((rate + bg) / bg).sqrt()
                } else {
                    0.0
                };
                return Ok(CountTimeSolution {
                    live_time: tf,
                    background_time,
                    mean_rate: rate,
                    iterations: iteration,
                    feasible: true,
                    diagnostics,
                });
            }
        }

        log::debug!(
            "count time did not settle within {} steps",
            self.config.max_iterations
        );
        Ok(Self::infeasible(
            request,
            self.config.max_iterations,
            mean_rate(tf),
            diagnostics,
        ))
    }

    fn check_dead_time(
        &self,
        request: &CountTimeRequest,
        rate: f64,
        diagnostics: &mut Diagnostics,
    ) {
        let tau = self.config.dead_time_per_count;
        let fraction = rate * tau / (1.0 + rate * tau);
        if fraction > self.config.dead_time_warn_fraction {
            diagnostics.record(request.diagnostic(Diagnostic::warning(
                DiagnosticKind::DeadTime { rate, fraction },
            )));
        }
    }

    fn infeasible(
        request: &CountTimeRequest,
        iterations: usize,
        rate: f64,
        mut diagnostics: Diagnostics,
    ) -> CountTimeSolution {
        diagnostics.record(request.diagnostic(Diagnostic::warning(
            DiagnosticKind::InfeasibleCountTime,
        )));
        CountTimeSolution {
            live_time: INFEASIBLE_TIME,
            background_time: INFEASIBLE_TIME,
            mean_rate: rate,
            iterations,
            feasible: false,
            diagnostics,
        }
    }
}

/// Foreground time for net-rate precision σ at mean rate `s` over background
/// `bg`, with the background counted for the optimal fraction of the time.
fn knoll_time(s: f64, bg: f64, sigma_sq: f64) -> Option<f64> {
    if s.is_nan() || s <= 0.0 {
        return None;
    }
    let tf = if bg > 0.0 {
        let ratio = ((s + bg) / bg).sqrt();
        ((s + bg).sqrt() + bg.sqrt()).powi(2) / (sigma_sq * s * s) / (1.0 + 1.0 / ratio)
    } else {
        1.0 / (sigma_sq * s)
    };
    tf.is_finite().then_some(tf)
}

/// Foreground and background count times with the default solver settings.
///
/// # Errors
/// Returns `InvalidParameter` for out-of-range inputs.
pub fn foil_count_time(
    sigma: f64,
    half_life: f64,
    initial: f64,
    efficiency: f64,
    background: f64,
    units: ActivityUnit,
) -> Result<(f64, f64)> {
    let request = CountTimeRequest::new(sigma, half_life, initial, efficiency)
        .with_background(background)
        .with_units(units);
    let solution = CountTimeSolver::default().solve(&request)?;
    Ok((solution.live_time, solution.background_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bq_times(half_life: f64, activity: f64, efficiency: f64, background: f64) -> (f64, f64) {
        foil_count_time(
            0.01,
            half_life,
            activity,
            efficiency,
            background,
            ActivityUnit::Becquerel,
        )
        .unwrap()
    }

    #[test]
    fn test_reference_count_times() {
        let (tf, tb) = bq_times(54_000.0, 548.104_26, 0.015_188_801_327_2, 0.01);
        assert_relative_eq!(tf, 1_254.519_432_654, max_relative = 1e-6);
        assert!(tb > 0.0 && tb < tf);

        let (tf, _) = bq_times(16_200.0, 1_714.110_718, 0.049_960_336_365_5, 0.01);
        assert_relative_eq!(tf, 118.346_764_33, max_relative = 1e-6);
    }

    #[test]
    fn test_long_count_and_background() {
        let (tf, tb) = bq_times(128_160.0, 46.425_931, 0.015_049_491_445_8, 0.01);
        assert_relative_eq!(tf, 17_054.945_721_3, max_relative = 1e-6);
        assert_relative_eq!(tb, 2_072.133_204_7, max_relative = 1e-6);

        let (tf, tb) = bq_times(128_160.0, 46.425_931, 0.015_049_491_445_8, 0.001);
        assert_relative_eq!(tf, 15_520.792_29, max_relative = 1e-6);
        assert_relative_eq!(tb, 599.099_768_4, max_relative = 1e-6);
    }

    #[test]
    fn test_tighter_precision_needs_longer_counts() {
        let solver = CountTimeSolver::default();
        let mut previous = 0.0;
        for sigma in [0.05, 0.03, 0.02, 0.01, 0.005] {
            let solution = solver
                .solve(&CountTimeRequest::new(sigma, 54_000.0, 548.1, 0.015))
                .unwrap();
            assert!(solution.feasible);
            assert!(solution.live_time > previous, "sigma {sigma}");
            previous = solution.live_time;
        }
    }

    #[test]
    fn test_zero_activity_is_infeasible() {
        let request = CountTimeRequest::new(0.01, 54_000.0, 0.0, 0.01)
            .with_label("Na24");
        let solution = CountTimeSolver::default().solve(&request).unwrap();
        assert!(!solution.feasible);
        assert_relative_eq!(solution.live_time, INFEASIBLE_TIME);
        assert_relative_eq!(solution.background_time, INFEASIBLE_TIME);
        let diagnostic = solution.diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::InfeasibleCountTime);
        assert_eq!(diagnostic.subject.as_deref(), Some("Na24"));
    }

    #[test]
    fn test_zero_background_limit() {
        let request = CountTimeRequest::new(0.01, 1e12, 100.0, 0.1)
            .with_background(0.0);
        let solution = CountTimeSolver::default().solve(&request).unwrap();
        // Effectively stable source: 10 cps, 1e4 counts needed.
        assert_relative_eq!(solution.live_time, 1000.0, max_relative = 1e-4);
        assert_relative_eq!(solution.background_time, 0.0);
    }

    #[test]
    fn test_iteration_cap_gives_sentinel() {
        let solver = CountTimeSolver::new(CountTimeConfig::default().with_max_iterations(1));
        let solution = solver
            .solve(&CountTimeRequest::new(0.01, 54_000.0, 548.1, 0.015))
            .unwrap();
        assert!(!solution.feasible);
        assert_eq!(solution.iterations, 1);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let solver = CountTimeSolver::default();
        let base = CountTimeRequest::new(0.01, 54_000.0, 548.1, 0.015);
        let corruptions: [fn(&mut CountTimeRequest); 7] = [
            |r| r.sigma = 0.0,
            |r| r.sigma = 1.5,
            |r| r.half_life = 0.0,
            |r| r.initial = -1.0,
            |r| r.efficiency = 1.2,
            |r| r.efficiency = 0.0,
            |r| r.background = -0.1,
        ];
        for corrupt in corruptions {
            let mut bad = base.clone();
            corrupt(&mut bad);
            assert!(solver.solve(&bad).unwrap_err().is_invalid_parameter());
        }
    }

    #[test]
    fn test_dead_time_warning() {
        let solver = CountTimeSolver::default();
        let hot = CountTimeRequest::new(0.01, 54_000.0, 1e6, 0.1);
        let solution = solver.solve(&hot).unwrap();
        assert!(solution.feasible);
        let busy = |k: &DiagnosticKind| match k {
            DiagnosticKind::DeadTime { fraction, .. } => *fraction > 0.05,
            _ => false,
        };
        assert!(solution.diagnostics.any(busy));

        let cold = CountTimeRequest::new(0.01, 54_000.0, 548.1, 0.015);
        let quiet = solver.solve(&cold).unwrap();
        assert!(quiet.diagnostics.is_empty());
    }

    #[test]
    fn test_units_scale_activity() {
        let solver = CountTimeSolver::default();
        let bq = CountTimeRequest::new(0.01, 54_000.0, 3.7e4, 0.015);
        let uci = CountTimeRequest::new(0.01, 54_000.0, 1.0, 0.015)
            .with_units(ActivityUnit::MicroCurie);
        assert_relative_eq!(
            solver.solve(&bq).unwrap().live_time,
            solver.solve(&uci).unwrap().live_time,
            max_relative = 1e-12
        );

        let unknown = CountTimeRequest::new(0.01, 54_000.0, 548.1, 0.015)
            .with_units(ActivityUnit::parse("mCi"));
        let solution = solver.solve(&unknown).unwrap();
        assert!(solution
            .diagnostics
            .any(|k| matches!(k, DiagnosticKind::UnrecognizedUnits { .. })));
    }
}
