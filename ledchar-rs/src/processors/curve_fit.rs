//! Nonlinear least squares with the Levenberg-Marquardt method.
//!
//! A [`Model`] describes a function `f(x; p)` and its gradient with respect to
//! the parameters. [`fit`] minimizes `Σ (yᵢ − f(xᵢ; p))²` starting from an
//! initial guess, solving the damped normal equations
//! `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr` with a Cholesky factorization at each step.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::config::FitConfig;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;
/// Floor for the diagonal scaling so that flat parameters still get damped.
const MIN_DIAGONAL: f64 = 1e-12;

/// Errors that can occur while fitting a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("x has {x_len} values but y has {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },

    #[error("{points} points cannot determine {params} parameters")]
    InsufficientData { points: usize, params: usize },

    #[error("input or initial guess contains NaN or infinite values")]
    NonFinite,

    #[error("all y values are equal ({value}), the series has no peak")]
    DegenerateInput { value: f64 },

    #[error("{points} point(s) at or above half maximum, FWHM is undefined")]
    InsufficientPeakWidth { points: usize },

    #[error("optimizer did not converge after {iterations} iterations")]
    Convergence { iterations: usize },
}

/// Result type for fitting operations.
pub type Result<T> = std::result::Result<T, FitError>;

/// A parametric model `f(x; p)`.
pub trait Model {
    /// Number of parameters in `p`.
    fn num_params(&self) -> usize;

    /// Evaluate the model at `x`.
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Write `∂f/∂pⱼ` at `x` into `out` (length `num_params()`).
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Fitted parameters, in the model's order.
    pub params: Vec<f64>,
    /// Residual sum of squares at the solution.
    pub cost: f64,
    /// Number of Levenberg-Marquardt iterations used.
    pub iterations: usize,
}

fn sum_squares<M: Model + ?Sized>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model.evaluate(xi, params);
            r * r
        })
        .sum()
}

/// Fit `model` to the samples `(x, y)` starting from `initial`.
///
/// # Arguments
///
/// * `model` - The model to fit
/// * `x`, `y` - Samples, equal length, at least `model.num_params()` of them
/// * `initial` - Starting parameters
/// * `config` - Iteration limit and convergence tolerances
///
/// # Errors
///
/// Returns [`FitError::Convergence`] when the iteration limit is reached or no
/// step can reduce the residual, and input validation errors otherwise. No
/// alternative starting points are tried.
pub fn fit<M: Model + ?Sized>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    config: &FitConfig,
) -> Result<FitReport> {
    let m = model.num_params();
    let n = x.len();

    if n != y.len() {
        return Err(FitError::LengthMismatch {
            x_len: n,
            y_len: y.len(),
        });
    }
    if n < m {
        return Err(FitError::InsufficientData {
            points: n,
            params: m,
        });
    }
    debug_assert_eq!(initial.len(), m, "initial guess must match the model");
    if !x.iter().chain(y).chain(initial).all(|v| v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let mut params = DVector::from_column_slice(initial);
    let mut cost = sum_squares(model, x, y, params.as_slice());
    if !cost.is_finite() {
        return Err(FitError::Convergence { iterations: 0 });
    }

    let report = |params: &DVector<f64>, cost: f64, iterations: usize| FitReport {
        params: params.iter().copied().collect(),
        cost,
        iterations,
    };

    if cost == 0.0 {
        return Ok(report(&params, cost, 0));
    }

    let mut damping = INITIAL_DAMPING;
    let mut jacobian = DMatrix::<f64>::zeros(n, m);
    let mut residuals = DVector::<f64>::zeros(n);
    let mut row = vec![0.0; m];

    for iteration in 1..=config.max_iterations {
        for i in 0..n {
            let p = params.as_slice();
            residuals[i] = y[i] - model.evaluate(x[i], p);
            model.gradient(x[i], p, &mut row);
            for (j, &g) in row.iter().enumerate() {
                jacobian[(i, j)] = g;
            }
        }

        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let jtr = &jt * &residuals;

        if !jtj.iter().chain(jtr.iter()).all(|v| v.is_finite()) {
            return Err(FitError::Convergence { iterations: iteration });
        }
        if jtr.amax() <= config.gtol {
            return Ok(report(&params, cost, iteration));
        }

        // Raise the damping until a step lowers the cost
        loop {
            let mut damped = jtj.clone();
            for j in 0..m {
                damped[(j, j)] += damping * jtj[(j, j)].max(MIN_DIAGONAL);
            }

            let step = match damped.cholesky() {
                Some(factor) => factor.solve(&jtr),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return Err(FitError::Convergence { iterations: iteration });
                    }
                    continue;
                }
            };

            let step_norm = step.norm();
            let small_step = step_norm <= config.xtol * (params.norm() + config.xtol);
            let candidate = &params + &step;
            let candidate_cost = sum_squares(model, x, y, candidate.as_slice());

            if candidate_cost.is_finite() && candidate_cost < cost {
                let converged = cost - candidate_cost <= config.ftol * cost || small_step;
                params = candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(MIN_DAMPING);

                if converged || cost == 0.0 {
                    log::debug!("fit converged after {} iterations, cost {:e}", iteration, cost);
                    return Ok(report(&params, cost, iteration));
                }
                break;
            }

            if small_step {
                return Ok(report(&params, cost, iteration));
            }

            damping *= 10.0;
            if damping > MAX_DAMPING {
                return Err(FitError::Convergence { iterations: iteration });
            }
        }
    }

    Err(FitError::Convergence {
        iterations: config.max_iterations,
    })
}
