//! Numeric helpers shared by the fitters.
//!
//! Everything here works on plain `f64` slices: rounding, medians, min-max
//! normalization, peak width estimation and ordinary least-squares lines.

/// Conversion factor between the FWHM and the standard deviation of a Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3; // 2 * sqrt(2 * ln 2)

/// Round a value to `decimals` decimal places, ties to even.
///
/// Matches the usual array-library behaviour of scaling, rounding to the
/// nearest integer (half to even) and scaling back.
///
/// # Example
///
/// ```
/// use ledchar::core::transforms::round_to;
///
/// assert_eq!(round_to(0.125, 2), 0.12);
/// assert_eq!(round_to(1.2345, 3), 1.234);
/// ```
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Round every value of a slice to `decimals` decimal places.
pub fn round_all(values: &[f64], decimals: i32) -> Vec<f64> {
    values.iter().map(|&v| round_to(v, decimals)).collect()
}

/// Median of a slice, averaging the two middle values for even lengths.
///
/// Returns `None` for an empty slice or when any value is NaN.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Minimum and maximum of a slice, or `None` if it is empty.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Scale values linearly onto [0, 1].
///
/// Returns `None` if the slice is empty or all values are equal, in which
/// case the scaling is undefined.
pub fn normalize_min_max(values: &[f64]) -> Option<Vec<f64>> {
    let (lo, hi) = min_max(values)?;
    let span = hi - lo;
    if span <= 0.0 || !span.is_finite() {
        return None;
    }
    Some(values.iter().map(|&v| (v - lo) / span).collect())
}

/// Index of the first maximum of a slice.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Width between the first and last sample at or above `level`.
///
/// Returns the width together with the number of samples at or above the
/// level, or `None` if no sample reaches it.
pub fn width_above(x: &[f64], y: &[f64], level: f64) -> Option<(f64, usize)> {
    let mut first: Option<usize> = None;
    let mut last = 0;
    let mut count = 0;

    for (i, &v) in y.iter().enumerate() {
        if v >= level {
            first.get_or_insert(i);
            last = i;
            count += 1;
        }
    }

    first.map(|first| (x[last] - x[first], count))
}

/// Convert a full width at half maximum into a Gaussian standard deviation.
#[inline]
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / FWHM_PER_SIGMA
}

/// Ordinary least-squares line `y = slope * x + intercept`.
///
/// Returns `None` with fewer than two points or when all x are equal.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        sxx += dx * dx;
        sxy += dx * (y[i] - mean_y);
    }

    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
