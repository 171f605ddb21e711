//! Peak position and width of an emission spectrum.
//!
//! The spectrum is min-max normalized, the FWHM of the highest peak seeds a
//! Gaussian `A·exp(−(x−mu)²/(2·sigma²))`, and the fitted `sigma²` is reported
//! as the variance.

use crate::config::{FitConfig, PeakLocation};
use crate::core::loaders::SampleSeries;
use crate::core::transforms::{argmax, fwhm_to_sigma, normalize_min_max, width_above};

use super::curve_fit::{self, FitError, Model, Result};

/// Gaussian with parameters `[amplitude, mu, sigma]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gaussian;

impl Model for Gaussian {
    fn num_params(&self) -> usize {
        3
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let (a, mu, sigma) = (p[0], p[1], p[2]);
        a * (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp()
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        let (a, mu, sigma) = (p[0], p[1], p[2]);
        let dx = x - mu;
        let s2 = sigma * sigma;
        let e = (-dx * dx / (2.0 * s2)).exp();
        out[0] = e;
        out[1] = a * e * dx / s2;
        out[2] = a * e * dx * dx / (s2 * sigma);
    }
}

/// Everything learned about a spectrum's peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakFit {
    /// Position of the highest sample.
    pub x_max: f64,
    /// Full width at half maximum measured on the samples.
    pub fwhm: f64,
    /// Standard deviation derived from the FWHM, used as the starting sigma.
    pub sigma_estimate: f64,
    /// Fitted amplitude on the normalized scale.
    pub amplitude: f64,
    /// Fitted center.
    pub mu: f64,
    /// Fitted standard deviation (sign is irrelevant to the model).
    pub sigma: f64,
    pub iterations: usize,
}

impl PeakFit {
    /// Variance of the fitted Gaussian.
    #[inline]
    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Peak position according to `location`.
    pub fn position(&self, location: PeakLocation) -> f64 {
        match location {
            PeakLocation::Observed => self.x_max,
            PeakLocation::Fitted => self.mu,
        }
    }
}

/// Normalize the spectrum, estimate its FWHM and fit a Gaussian to it.
///
/// # Errors
///
/// - [`FitError::DegenerateInput`] when every intensity is the same
/// - [`FitError::InsufficientPeakWidth`] when fewer than two samples reach half
///   of the maximum, or they all share one x
/// - [`FitError::Convergence`] when the Gaussian fit does not converge
pub fn fit_peak(series: &SampleSeries, config: &FitConfig) -> Result<PeakFit> {
    let (x, y) = (&series.x, &series.y);
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    if x.len() < Gaussian.num_params() {
        return Err(FitError::InsufficientData {
            points: x.len(),
            params: Gaussian.num_params(),
        });
    }
    if !x.iter().chain(y).all(|v| v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let normalized =
        normalize_min_max(y).ok_or(FitError::DegenerateInput { value: y[0] })?;

    let idx_max = argmax(&normalized).ok_or(FitError::DegenerateInput { value: y[0] })?;
    let (x_max, y_max) = (x[idx_max], normalized[idx_max]);

    let (fwhm, above_half) =
        width_above(x, &normalized, y_max / 2.0).ok_or(FitError::InsufficientPeakWidth { points: 0 })?;
    let fwhm = fwhm.abs();
    if above_half < 2 || fwhm == 0.0 {
        return Err(FitError::InsufficientPeakWidth { points: above_half });
    }
    let sigma_estimate = fwhm_to_sigma(fwhm);

    log::debug!(
        "peak at x={:.4}, FWHM={:.4} over {} samples, sigma estimate {:.4}",
        x_max,
        fwhm,
        above_half,
        sigma_estimate
    );

    let report = curve_fit::fit(
        &Gaussian,
        x,
        &normalized,
        &[y_max, x_max, sigma_estimate],
        config,
    )?;
    let p = &report.params;

    Ok(PeakFit {
        x_max,
        fwhm,
        sigma_estimate,
        amplitude: p[0],
        mu: p[1],
        sigma: p[2].abs(),
        iterations: report.iterations,
    })
}

/// Peak position and fitted variance `(x_peak, sigma²)`.
///
/// The position is the highest sample unless `config.peak_location` asks for
/// the fitted center.
pub fn find_peak(series: &SampleSeries, config: &FitConfig) -> Result<(f64, f64)> {
    let fit = fit_peak(series, config)?;
    Ok((fit.position(config.peak_location), fit.variance()))
}
