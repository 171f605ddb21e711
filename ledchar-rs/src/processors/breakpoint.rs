//! Breakpoint of a two-segment piecewise-linear fit.
//!
//! The IV curve of an LED is nearly flat below its turn-on voltage and close to
//! linear above it. Fitting
//!
//! ```text
//! f(x) = k1·(x − x0) + y0    for x <  x0
//! f(x) = k2·(x − x0) + y0    for x >= x0
//! ```
//!
//! by least squares locates the transition `x0`.

use crate::config::{BreakpointGuess, FitConfig};
use crate::core::loaders::SampleSeries;
use crate::core::transforms::{linear_regression, median, round_all};

use super::curve_fit::{self, FitError, Model, Result};

/// Slope guess for the segment below the breakpoint.
const FIXED_K1: f64 = 0.1;
/// Slope guess for the segment above the breakpoint.
const FIXED_K2: f64 = 1.0;

/// Two linear segments joined at `(x0, y0)`; parameters `[x0, y0, k1, k2]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiecewiseLinear;

impl Model for PiecewiseLinear {
    fn num_params(&self) -> usize {
        4
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let (x0, y0) = (p[0], p[1]);
        let slope = if x < x0 { p[2] } else { p[3] };
        slope * (x - x0) + y0
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        let x0 = p[0];
        if x < x0 {
            out.copy_from_slice(&[-p[2], 1.0, x - x0, 0.0]);
        } else {
            out.copy_from_slice(&[-p[3], 1.0, 0.0, x - x0]);
        }
    }
}

/// Parameters of a fitted piecewise-linear model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakpointFit {
    pub x0: f64,
    pub y0: f64,
    pub k1: f64,
    pub k2: f64,
    /// Residual sum of squares on the rounded data.
    pub cost: f64,
    pub iterations: usize,
}

/// Starting parameters `[x0, y0, k1, k2]` for the fit.
///
/// Both policies put the breakpoint at the median of x. `Fixed` uses the median
/// of y with slopes 0.1 and 1.0; `Regression` fits a line to each side of the
/// median and joins them there, keeping the fixed slope on a side with too few
/// distinct points.
pub fn initial_guess(x: &[f64], y: &[f64], policy: BreakpointGuess) -> Result<[f64; 4]> {
    let x0 = median(x).ok_or(FitError::NonFinite)?;
    let y_med = median(y).ok_or(FitError::NonFinite)?;

    match policy {
        BreakpointGuess::Fixed => Ok([x0, y_med, FIXED_K1, FIXED_K2]),
        BreakpointGuess::Regression => {
            let (mut below_x, mut below_y) = (Vec::new(), Vec::new());
            let (mut above_x, mut above_y) = (Vec::new(), Vec::new());
            for (&xi, &yi) in x.iter().zip(y) {
                if xi < x0 {
                    below_x.push(xi);
                    below_y.push(yi);
                } else {
                    above_x.push(xi);
                    above_y.push(yi);
                }
            }

            let below = linear_regression(&below_x, &below_y);
            let above = linear_regression(&above_x, &above_y);

            let y0 = match (below, above) {
                (Some((k1, b1)), Some((k2, b2))) => 0.5 * ((k1 * x0 + b1) + (k2 * x0 + b2)),
                (Some((k, b)), None) | (None, Some((k, b))) => k * x0 + b,
                (None, None) => y_med,
            };
            let k1 = below.map_or(FIXED_K1, |(k, _)| k);
            let k2 = above.map_or(FIXED_K2, |(k, _)| k);

            Ok([x0, y0, k1, k2])
        }
    }
}

/// Fit the piecewise-linear model and return all parameters.
///
/// x is rounded to `config.x_decimals` and y to `config.y_decimals` decimal
/// places before fitting.
///
/// # Errors
///
/// Fails with [`FitError::InsufficientData`] for fewer than 4 samples and
/// [`FitError::Convergence`] when the optimizer does not converge from the
/// initial guess.
pub fn fit_breakpoint(series: &SampleSeries, config: &FitConfig) -> Result<BreakpointFit> {
    if series.x.len() != series.y.len() {
        return Err(FitError::LengthMismatch {
            x_len: series.x.len(),
            y_len: series.y.len(),
        });
    }
    let model = PiecewiseLinear;
    if series.len() < model.num_params() {
        return Err(FitError::InsufficientData {
            points: series.len(),
            params: model.num_params(),
        });
    }

    let x = round_all(&series.x, config.x_decimals);
    let y = round_all(&series.y, config.y_decimals);

    let guess = initial_guess(&x, &y, config.initial_guess)?;
    log::debug!(
        "breakpoint initial guess ({:?}): x0={:.4} y0={:.4} k1={:.4} k2={:.4}",
        config.initial_guess,
        guess[0],
        guess[1],
        guess[2],
        guess[3]
    );

    let report = curve_fit::fit(&model, &x, &y, &guess, config)?;
    let p = &report.params;

    Ok(BreakpointFit {
        x0: p[0],
        y0: p[1],
        k1: p[2],
        k2: p[3],
        cost: report.cost,
        iterations: report.iterations,
    })
}

/// Breakpoint `x0` of the piecewise-linear fit.
pub fn find_breakpoint(series: &SampleSeries, config: &FitConfig) -> Result<f64> {
    fit_breakpoint(series, config).map(|fit| fit.x0)
}
