//! Inversion of a cumulative curve onto a percentile grid

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayView1};

/// Points of a cumulative curve usable as an interpolation abscissa
///
/// The first point is always kept. Every later point is kept only if its
/// cumulative value strictly exceeds the one immediately before it, which
/// drops the plateaus left by empty bins. Returns `(fractions, tracer)`.
pub fn monotonic_points(
    fractions: ArrayView1<'_, f64>,
    coords: ArrayView1<'_, f64>,
) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(fractions.len());
    let mut ys = Vec::with_capacity(fractions.len());
    let mut prev: Option<f64> = None;
    for (&x, &y) in fractions.iter().zip(coords.iter()) {
        let keep = match prev {
            None => true,
            Some(p) => x > p,
        };
        if keep {
            xs.push(x);
            ys.push(y);
        }
        prev = Some(x);
    }
    (xs, ys)
}

/// Piecewise-linear interpolation of `(xs, ys)` at `targets`
///
/// `xs` must be strictly increasing. Targets outside `[xs[0], xs[n-1]]`
/// yield NaN.
pub fn interpolate(xs: &[f64], ys: &[f64], targets: &[f64]) -> Array1<f64> {
    targets
        .iter()
        .map(|&p| {
            let n = xs.len();
            if n == 0 || !(p >= xs[0] && p <= xs[n - 1]) {
                return f64::NAN;
            }
            let j = xs.partition_point(|&x| x < p).min(n - 1);
            if j == 0 {
                return ys[0];
            }
            let i = j - 1;
            let t = (p - xs[i]) / (xs[j] - xs[i]);
            ys[i] + t * (ys[j] - ys[i])
        })
        .collect()
}

/// Tracer value at each target percentile
///
/// Treats the cumulative percentages as the independent coordinate and the
/// bin coordinates as the dependent variable, repairs monotonicity with
/// [`monotonic_points`] and interpolates linearly. Percentiles outside the
/// observed range are NaN.
///
/// # Errors
///
/// [`Error::InsufficientData`] if fewer than two points survive the
/// monotonicity filter.
pub fn invert_and_interpolate(
    fractions: ArrayView1<'_, f64>,
    coords: ArrayView1<'_, f64>,
    percentiles: &[f64],
) -> Result<Array1<f64>> {
    if fractions.len() != coords.len() {
        return Err(Error::invalid(format!(
            "{} cumulative values for {} bin coordinates",
            fractions.len(),
            coords.len()
        )));
    }
    let (xs, ys) = monotonic_points(fractions, coords);
    if xs.len() < 2 {
        return Err(Error::InsufficientData {
            time_index: 0,
            found: xs.len(),
        });
    }
    Ok(interpolate(&xs, &ys, percentiles))
}
