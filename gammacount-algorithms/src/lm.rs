//! Bounded Levenberg-Marquardt least squares.
//!
//! Minimises `Σ rᵢ(p)²` for a residual vector supplied by a
//! [`LeastSquaresProblem`]. The Jacobian is taken by finite differences,
//! damping uses Marquardt's diagonal scaling, and box bounds are enforced by
//! projecting every trial step and freezing parameters pinned at a bound
//! whose gradient points outward.
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::many_single_char_names,
    clippy::cast_precision_loss
)]

use gammacount_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A nonlinear least-squares problem.
pub trait LeastSquaresProblem {
    /// Number of residuals.
    fn residual_count(&self) -> usize;

    /// Writes the residuals at `params` into `out`. Weighted problems return
    /// residuals already divided by their uncertainties.
    fn residuals(&self, params: &[f64], out: &mut [f64]);
}

/// Solver settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LmConfig {
    pub max_iterations: usize,
    /// Relative reduction of the cost below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Largest projected gradient component at convergence.
    pub gtol: f64,
    pub initial_damping: f64,
    /// Factor applied to the damping after a rejected step.
    pub damping_increase: f64,
    /// Factor the damping is divided by after an accepted step.
    pub damping_decrease: f64,
    /// Relative finite-difference step.
    pub diff_step: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_damping: 1e-3,
            damping_increase: 10.0,
            damping_decrease: 10.0,
            diff_step: 1e-7,
        }
    }
}

impl LmConfig {
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_tolerances(mut self, ftol: f64, xtol: f64, gtol: f64) -> Self {
        self.ftol = ftol;
        self.xtol = xtol;
        self.gtol = gtol;
        self
    }
}

const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-15;

/// Box bounds on the parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    /// No bounds on `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    /// The same interval for all `n` parameters.
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        Self {
            lower: vec![lower; n],
            upper: vec![upper; n],
        }
    }

    fn clamp(&self, params: &mut [f64]) {
        for ((p, &lo), &hi) in params.iter_mut().zip(&self.lower).zip(&self.upper) {
            *p = p.clamp(lo, hi);
        }
    }
}

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// Projected gradient below `gtol`.
    Gradient,
    /// Relative cost reduction below `ftol`.
    Cost,
    /// Relative step below `xtol`.
    Step,
}

/// Converged solution.
#[derive(Clone, Debug, PartialEq)]
pub struct LmReport {
    pub params: Vec<f64>,
    /// `(JᵀJ)⁻¹` at the solution, in parameter units.
    pub covariance: DMatrix<f64>,
    /// Sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Levenberg-Marquardt driver.
#[derive(Clone, Debug, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

struct Evaluator<'a, P: LeastSquaresProblem + ?Sized> {
    problem: &'a P,
    bounds: &'a Bounds,
    diff_step: f64,
    evaluations: usize,
}

impl<P: LeastSquaresProblem + ?Sized> Evaluator<'_, P> {
    fn residuals(&mut self, params: &[f64]) -> DVector<f64> {
        let mut out = DVector::zeros(self.problem.residual_count());
        self.problem.residuals(params, out.as_mut_slice());
        self.evaluations += 1;
        out
    }

    /// Central differences, one-sided next to a bound.
    fn jacobian(&mut self, params: &[f64], at: &DVector<f64>) -> DMatrix<f64> {
        let m = at.len();
        let n = params.len();
        let mut jac = DMatrix::zeros(m, n);
        let mut shifted = params.to_vec();
        for j in 0..n {
            let h = self.diff_step * params[j].abs().max(1.0);
            let up = params[j] + h;
            let down = params[j] - h;
            let column = if up <= self.bounds.upper[j] && down >= self.bounds.lower[j] {
                shifted[j] = up;
                let plus = self.residuals(&shifted);
                shifted[j] = down;
                let minus = self.residuals(&shifted);
                (plus - minus) / (2.0 * h)
            } else if up <= self.bounds.upper[j] {
                shifted[j] = up;
                (self.residuals(&shifted) - at) / h
            } else {
                shifted[j] = down;
                (at - self.residuals(&shifted)) / h
            };
            shifted[j] = params[j];
            jac.set_column(j, &column);
        }
        jac
    }
}

impl LevenbergMarquardt {
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimises the problem from `initial` within `bounds`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for inconsistent dimensions or residuals
    /// that are not finite at the start point, and `FitDidNotConverge` when
    /// the iteration cap is reached or no step reduces the cost.
    #[allow(clippy::too_many_lines)]
    pub fn minimize<P: LeastSquaresProblem + ?Sized>(
        &self,
        problem: &P,
        initial: &[f64],
        bounds: &Bounds,
    ) -> Result<LmReport> {
        let n = initial.len();
        let m = problem.residual_count();
        Error::ensure(n > 0, "initial", "at least one parameter is required")?;
        Error::ensure(
            bounds.lower.len() == n && bounds.upper.len() == n,
            "bounds",
            format!("expected {n} bounds"),
        )?;
        Error::ensure(
            bounds.lower.iter().zip(&bounds.upper).all(|(l, u)| l < u),
            "bounds",
            "lower bounds must be below upper bounds",
        )?;
        Error::ensure(
            m >= n,
            "residuals",
            format!("{m} residuals cannot constrain {n} parameters"),
        )?;

        let mut evaluator = Evaluator {
            problem,
            bounds,
            diff_step: self.config.diff_step,
            evaluations: 0,
        };
        let mut params = initial.to_vec();
        bounds.clamp(&mut params);
        let mut residuals = evaluator.residuals(&params);
        let mut cost = residuals.norm_squared();
        Error::ensure(
            cost.is_finite(),
            "initial",
            "residuals are not finite at the starting point",
        )?;

        let mut damping = self.config.initial_damping;
        for iteration in 1..=self.config.max_iterations {
            let jac = evaluator.jacobian(&params, &residuals);
            let mut jtj = jac.tr_mul(&jac);
            let mut gradient = jac.tr_mul(&residuals);

            // Freeze parameters held at a bound by a gradient pointing out.
            for j in 0..n {
                let at_lower = params[j] <= bounds.lower[j] && gradient[j] > 0.0;
                let at_upper = params[j] >= bounds.upper[j] && gradient[j] < 0.0;
                if at_lower || at_upper {
                    gradient[j] = 0.0;
                    jtj.row_mut(j).fill(0.0);
                    jtj.column_mut(j).fill(0.0);
                    jtj[(j, j)] = 1.0;
                }
            }

            if gradient.amax() <= self.config.gtol {
                return Ok(finish(
                    &mut evaluator,
                    params,
                    &residuals,
                    cost,
                    iteration,
                    Termination::Gradient,
                ));
            }

            let scale =
                DVector::from_iterator(n, jtj.diagonal().iter().map(|d| d.max(f64::EPSILON)));

            loop {
                let mut damped = jtj.clone();
                for j in 0..n {
                    damped[(j, j)] += damping * scale[j];
                }
                let Some(cholesky) = damped.cholesky() else {
                    damping *= self.config.damping_increase;
                    if damping > MAX_DAMPING {
                        return Err(not_converged(iteration, "normal equations are singular"));
                    }
                    continue;
                };
                let step = cholesky.solve(&(-&gradient));

                let mut trial: Vec<f64> = params.iter().zip(&step).map(|(p, s)| p + s).collect();
                bounds.clamp(&mut trial);
                let moved = params
                    .iter()
                    .zip(&trial)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let size = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                if moved <= self.config.xtol * (size + self.config.xtol) {
                    return Ok(finish(
                        &mut evaluator,
                        params,
                        &residuals,
                        cost,
                        iteration,
                        Termination::Step,
                    ));
                }

                let trial_residuals = evaluator.residuals(&trial);
                let trial_cost = trial_residuals.norm_squared();
                if trial_cost.is_finite() && trial_cost < cost {
                    let reduction = (cost - trial_cost) / cost;
                    params = trial;
                    residuals = trial_residuals;
                    cost = trial_cost;
                    damping = (damping / self.config.damping_decrease).max(MIN_DAMPING);
                    log::trace!("lm step {iteration}: cost {cost:.6e}, damping {damping:.1e}");
                    if reduction <= self.config.ftol {
                        return Ok(finish(
                            &mut evaluator,
                            params,
                            &residuals,
                            cost,
                            iteration,
                            Termination::Cost,
                        ));
                    }
                    break;
                }

                damping *= self.config.damping_increase;
                if damping > MAX_DAMPING {
                    return Err(not_converged(iteration, "no step reduces the cost"));
                }
            }
        }

        let limit = self.config.max_iterations;
        Err(not_converged(limit, "iteration limit reached"))
    }
}

fn finish<P: LeastSquaresProblem + ?Sized>(
    evaluator: &mut Evaluator<'_, P>,
    params: Vec<f64>,
    residuals: &DVector<f64>,
    cost: f64,
    iterations: usize,
    termination: Termination,
) -> LmReport {
    let jac = evaluator.jacobian(&params, residuals);
    let covariance = covariance(&jac);
    log::debug!(
        "lm {termination:?} after {iterations} iterations ({} evaluations), cost {cost:.6e}",
        evaluator.evaluations
    );
    LmReport {
        params,
        covariance,
        cost,
        iterations,
        evaluations: evaluator.evaluations,
        termination,
    }
}

/// `(JᵀJ)⁻¹`, falling back to the pseudo-inverse when `JᵀJ` is singular.
pub fn covariance(jacobian: &DMatrix<f64>) -> DMatrix<f64> {
    let jtj = jacobian.tr_mul(jacobian);
    let n = jtj.nrows();
    if let Some(inverse) = jtj.clone().try_inverse() {
        if inverse.iter().all(|v| v.is_finite()) {
            return inverse;
        }
    }
    jtj.pseudo_inverse(f64::EPSILON * n as f64)
        .unwrap_or_else(|_| DMatrix::from_element(n, n, f64::INFINITY))
}

fn not_converged(iterations: usize, reason: &str) -> Error {
    Error::FitDidNotConverge {
        iterations,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// y = a·exp(−b·x)
    struct Exponential {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for Exponential {
        fn residual_count(&self) -> usize {
            self.x.len()
        }

        fn residuals(&self, params: &[f64], out: &mut [f64]) {
            for ((o, x), y) in out.iter_mut().zip(&self.x).zip(&self.y) {
                *o = y - params[0] * (-params[1] * x).exp();
            }
        }
    }

    fn exponential() -> Exponential {
        let x: Vec<f64> = (0..20).map(|i| f64::from(i) * 0.25).collect();
        let y = x.iter().map(|x| 3.0 * (-0.7 * x).exp()).collect();
        Exponential { x, y }
    }

    #[test]
    fn test_recovers_exact_parameters() {
        let report = LevenbergMarquardt::default()
            .minimize(&exponential(), &[1.0, 0.1], &Bounds::unbounded(2))
            .unwrap();
        assert_relative_eq!(report.params[0], 3.0, max_relative = 1e-6);
        assert_relative_eq!(report.params[1], 0.7, max_relative = 1e-6);
        assert!(report.cost < 1e-12);
        assert_eq!(report.covariance.shape(), (2, 2));
    }

    #[test]
    fn test_respects_bounds() {
        let bounds = Bounds {
            lower: vec![0.0, 0.0],
            upper: vec![2.0, 5.0],
        };
        let report = LevenbergMarquardt::default()
            .minimize(&exponential(), &[1.0, 0.1], &bounds)
            .unwrap();
        assert_relative_eq!(report.params[0], 2.0);
        assert!(report.params[1] > 0.0 && report.params[1] < 0.7);
    }

    #[test]
    fn test_linear_covariance() {
        // Straight line with unit weights: covariance is (XᵀX)⁻¹.
        struct Line;
        impl LeastSquaresProblem for Line {
            fn residual_count(&self) -> usize {
                3
            }
            fn residuals(&self, p: &[f64], out: &mut [f64]) {
                for (i, o) in out.iter_mut().enumerate() {
                    let x = i as f64;
                    *o = (2.0 * x + 1.0) - (p[0] * x + p[1]);
                }
            }
        }
        let report = LevenbergMarquardt::default()
            .minimize(&Line, &[0.0, 0.0], &Bounds::unbounded(2))
            .unwrap();
        assert_relative_eq!(report.params[0], 2.0, max_relative = 1e-8);
        assert_relative_eq!(report.params[1], 1.0, max_relative = 1e-8);
        // XᵀX = [[5, 3], [3, 3]], inverse = [[0.5, -0.5], [-0.5, 5/6]]
        assert_relative_eq!(report.covariance[(0, 0)], 0.5, max_relative = 1e-5);
        assert_relative_eq!(report.covariance[(0, 1)], -0.5, max_relative = 1e-5);
        assert_relative_eq!(report.covariance[(1, 1)], 5.0 / 6.0, max_relative = 1e-5);
    }

    #[test]
    fn test_iteration_cap() {
        let solver = LevenbergMarquardt::new(LmConfig::default().with_max_iterations(1));
        let err = solver
            .minimize(&exponential(), &[1.0, 0.1], &Bounds::unbounded(2))
            .unwrap_err();
        let Error::FitDidNotConverge { iterations, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(iterations, 1);
    }

    #[test]
    fn test_rejects_bad_setup() {
        let solver = LevenbergMarquardt::default();
        let problem = exponential();
        let too_few = solver.minimize(&problem, &[1.0], &Bounds::unbounded(2));
        assert!(too_few.is_err());
        let empty_interval = Bounds::uniform(2, 1.0, 1.0);
        let pinched = solver.minimize(&problem, &[1.0, 0.1], &empty_interval);
        assert!(pinched.is_err());
    }
}
