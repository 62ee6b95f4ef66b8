//! Tracer percentiles and extensive quantities
//!
//! Turns the cumulative volumetric histogram of a tracer into the tracer value
//! reached at each percentile of total volume, per timestep, and optionally
//! integrates it over the percentile axis into an extensive quantity (e.g.
//! heat or oxygen content below a given percentile).
//!
//! # Pipeline
//!
//! 1. [`HistogramPlan`](crate::histogram::HistogramPlan): normalized volumetric histogram
//! 2. [`CumulativePlan`]: bins reordered by [`Order`], cumulative volume as 0-100 %
//! 3. A single evaluation materializes the curve
//! 4. [`invert_and_interpolate`] for every timestep onto the percentile grid
//! 5. [`extensive_quantity`] if requested
//!
//! # Example
//!
//! ```
//! use ndarray::Array;
//! use tracer_percentile::{compute_tracer_percentile, BinEdges, Field, PercentileOptions};
//!
//! // ten equal cells at the centres of ten unit bins
//! let values: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
//! let thetao = Array::from_shape_vec((1, 10), values).unwrap().into_dyn();
//! let tracer = Field::new("thetao", &["time", "x"], thetao).unwrap();
//! let volume = Field::new("volcello", &["x"], Array::from_elem(10, 1.0).into_dyn()).unwrap();
//!
//! let options = PercentileOptions::default()
//!     .with_bin_edges(BinEdges::linspace(0.0, 10.0, 11).unwrap());
//! let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();
//!
//! let median = result.value_at(49, 0).unwrap();
//! assert!((median - 5.0).abs() < 1e-9);
//! ```

mod cumulative;
mod invert;

pub use cumulative::{CumulativeCurve, CumulativePlan, Order};
pub use invert::{interpolate, invert_and_interpolate, monotonic_points};

use crate::error::{Error, Result};
use crate::field::Field;
use crate::histogram::{BinEdges, HistogramPlan};
use crate::traits::Evaluate;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, info};

/// Options for [`compute_tracer_percentile`]
///
/// Defaults: edges derived from the tracer range with
/// [`BinEdges::DEFAULT_COUNT`] edges, percentiles 1 to 100 in steps of 1,
/// ascending order, extensive quantity computed with a prefactor of 1.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentileOptions {
    pub bin_edges: Option<BinEdges>,
    /// Edges derived when `bin_edges` is unset
    pub bin_count: usize,
    pub percentiles: Option<Vec<f64>>,
    pub order: Order,
    pub compute_extensive: bool,
    /// Integration prefactor, e.g. density times heat capacity
    pub prefactor: f64,
    /// Timesteps between progress log events (0 disables them)
    pub progress_interval: usize,
}

impl Default for PercentileOptions {
    fn default() -> Self {
        Self {
            bin_edges: None,
            bin_count: BinEdges::DEFAULT_COUNT,
            percentiles: None,
            order: Order::Ascending,
            compute_extensive: true,
            prefactor: 1.0,
            progress_interval: 10,
        }
    }
}

impl PercentileOptions {
    pub fn with_bin_edges(mut self, edges: BinEdges) -> Self {
        self.bin_edges = Some(edges);
        self
    }

    pub fn with_bin_count(mut self, count: usize) -> Self {
        self.bin_count = count;
        self
    }

    pub fn with_percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.percentiles = Some(percentiles);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn ascending(self, ascending: bool) -> Self {
        self.with_order(Order::from_ascending(ascending))
    }

    pub fn with_extensive(mut self, compute_extensive: bool) -> Self {
        self.compute_extensive = compute_extensive;
        self
    }

    pub fn with_prefactor(mut self, prefactor: f64) -> Self {
        self.prefactor = prefactor;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Target percentiles, validated
    ///
    /// Must be non-empty, finite and strictly increasing.
    pub fn percentile_grid(&self) -> Result<Array1<f64>> {
        let grid: Vec<f64> = match &self.percentiles {
            Some(p) => p.clone(),
            None => (1..=100).map(f64::from).collect(),
        };
        if grid.is_empty() {
            return Err(Error::invalid("percentile grid is empty"));
        }
        if grid.iter().any(|p| !p.is_finite()) {
            return Err(Error::invalid("percentile grid contains non-finite values"));
        }
        if grid.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::invalid("percentile grid must be strictly increasing"));
        }
        Ok(Array1::from(grid))
    }
}

/// Tracer value as a function of volume percentile
///
/// `tp[[p, t]]` is the tracer value such that `percentile[p]` percent of the
/// total volume at time `t` lies on the near side of it in the traversal
/// order. Percentiles outside the observed cumulative range are NaN.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TracerPercentile {
    tracer_name: String,
    units: Option<String>,
    order: Order,
    percentile: Array1<f64>,
    time: Array1<f64>,
    /// Shape `(percentile, time)`
    tp: Array2<f64>,
    total_volume: Array1<f64>,
    /// Shape `(percentile, time)`
    extensive: Option<Array2<f64>>,
}

impl TracerPercentile {
    /// Invert an already evaluated cumulative curve
    pub fn from_curve(curve: &CumulativeCurve, options: &PercentileOptions) -> Result<Self> {
        let percentile = options.percentile_grid()?;
        let percentiles = percentile.to_vec();

        info!(
            tracer = curve.tracer_name(),
            times = curve.num_times(),
            percentiles = percentiles.len(),
            order = %curve.order(),
            "inverting for tracer percentile at each time"
        );
        let tp = invert_all(curve, &percentiles, options.progress_interval)?;

        let extensive = if options.compute_extensive {
            Some(extensive_quantity(
                tp.view(),
                curve.total_volume().view(),
                options.prefactor,
            )?)
        } else {
            None
        };

        Ok(Self {
            tracer_name: curve.tracer_name().to_string(),
            units: curve.units().map(str::to_string),
            order: curve.order(),
            percentile,
            time: curve.time().clone(),
            tp,
            total_volume: curve.total_volume().clone(),
            extensive,
        })
    }

    pub fn tracer_name(&self) -> &str {
        &self.tracer_name
    }

    /// Units of the tracer, carried through to `tp`
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Percentile coordinate
    pub fn percentile(&self) -> &Array1<f64> {
        &self.percentile
    }

    /// Time coordinate
    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    /// Tracer percentile array, shape `(percentile, time)`
    pub fn tp(&self) -> ArrayView2<'_, f64> {
        self.tp.view()
    }

    /// Total binned volume per timestep
    pub fn total_volume(&self) -> &Array1<f64> {
        &self.total_volume
    }

    /// Extensive quantity, shape `(percentile, time)`, if computed
    pub fn extensive(&self) -> Option<ArrayView2<'_, f64>> {
        self.extensive.as_ref().map(|e| e.view())
    }

    /// Tracer value at a grid position, `None` if out of bounds or undefined
    pub fn value_at(&self, percentile_index: usize, time_index: usize) -> Option<f64> {
        self.tp
            .get((percentile_index, time_index))
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// Time series of tracer values at one percentile of the grid
    pub fn series_at(&self, percentile: f64) -> Option<ArrayView1<'_, f64>> {
        self.percentile
            .iter()
            .position(|&p| (p - percentile).abs() < 1e-9)
            .map(|i| self.tp.row(i))
    }
}

/// Whether timestep `t` emits a progress event
fn is_progress_step(t: usize, interval: usize) -> bool {
    interval > 0 && t % interval == 0
}

#[cfg(not(feature = "parallel"))]
fn invert_all(
    curve: &CumulativeCurve,
    percentiles: &[f64],
    progress_interval: usize,
) -> Result<Array2<f64>> {
    let mut tp = Array2::from_elem((percentiles.len(), curve.num_times()), f64::NAN);
    for (t, mut column) in tp.axis_iter_mut(Axis(1)).enumerate() {
        if is_progress_step(t, progress_interval) {
            debug!(time_index = t, "inverting timestep");
        }
        column.assign(&curve.invert_at(t, percentiles)?);
    }
    Ok(tp)
}

#[cfg(feature = "parallel")]
fn invert_all(
    curve: &CumulativeCurve,
    percentiles: &[f64],
    progress_interval: usize,
) -> Result<Array2<f64>> {
    use rayon::prelude::*;

    let mut tp = Array2::from_elem((percentiles.len(), curve.num_times()), f64::NAN);
    debug!(
        threads = rayon::current_num_threads(),
        "inverting timesteps in parallel"
    );
    tp.axis_iter_mut(Axis(1))
        .into_par_iter()
        .enumerate()
        .try_for_each(|(t, mut column)| -> Result<()> {
            if is_progress_step(t, progress_interval) {
                debug!(time_index = t, "inverting timestep");
            }
            column.assign(&curve.invert_at(t, percentiles)?);
            Ok(())
        })?;
    Ok(tp)
}

/// Tracer value as a function of volume percentile, per timestep
///
/// Bins the tracer by value weighted by cell volume, orders the bins by
/// `options.order`, accumulates the true volume into a 0-100 % curve and
/// inverts it onto the percentile grid. The cumulative curve is evaluated
/// exactly once, before the per-timestep loop.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for malformed fields, edges or percentiles
/// - [`Error::DegenerateDistribution`] if a timestep holds no binned volume
/// - [`Error::InsufficientData`] if a timestep leaves fewer than two
///   strictly increasing cumulative points
pub fn compute_tracer_percentile(
    tracer: &dyn Evaluate<Output = Field>,
    volume: &dyn Evaluate<Output = Field>,
    options: &PercentileOptions,
) -> Result<TracerPercentile> {
    let histogram = HistogramPlan::new(tracer, volume)
        .bin_edges(options.bin_edges.clone())
        .bin_count(options.bin_count)
        .normalize(true);
    let plan = CumulativePlan::new(histogram, options.order);

    info!(order = %plan.order(), "loading volumetric histogram");
    let curve = plan.evaluate()?;
    TracerPercentile::from_curve(&curve, options)
}

/// Extensive quantity accumulated over the percentile axis
///
/// `0.01 * total_volume[t] * cumsum_p(tp[p, t] * prefactor)`. The 0.01 turns
/// percent steps into volume fractions. Undefined (NaN) tracer percentiles
/// contribute nothing to the running sum.
pub fn extensive_quantity(
    tp: ArrayView2<'_, f64>,
    total_volume: ArrayView1<'_, f64>,
    prefactor: f64,
) -> Result<Array2<f64>> {
    if tp.ncols() != total_volume.len() {
        return Err(Error::invalid(format!(
            "tracer percentile has {} timesteps but total volume has {}",
            tp.ncols(),
            total_volume.len()
        )));
    }
    let mut out = tp.mapv(|v| if v.is_nan() { 0.0 } else { v * prefactor });
    out.accumulate_axis_inplace(Axis(0), |&prev, cur| *cur += prev);
    for (mut column, &vt) in out.axis_iter_mut(Axis(1)).zip(total_volume.iter()) {
        column.mapv_inplace(|c| 0.01 * vt * c);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{arr1, arr2, Array};

    fn ramp(times: usize) -> (Field, Field) {
        let values: Vec<f64> = (0..times)
            .flat_map(|_| (0..10).map(|i| i as f64 + 0.5))
            .collect();
        let tracer = Field::new(
            "thetao",
            &["time", "x"],
            Array::from_shape_vec((times, 10), values).unwrap().into_dyn(),
        )
        .unwrap()
        .with_units("degC");
        let volume = Field::new("volcello", &["x"], Array::from_elem(10, 1.0).into_dyn()).unwrap();
        (tracer, volume)
    }

    fn unit_edges() -> BinEdges {
        BinEdges::linspace(0.0, 10.0, 11).unwrap()
    }

    #[test]
    fn test_progress_steps() {
        let steps: Vec<usize> = (0..25).filter(|&t| is_progress_step(t, 10)).collect();
        assert_eq!(steps, vec![0, 10, 20]);
        assert!(!(0..25).any(|t| is_progress_step(t, 0)));
    }

    #[test]
    fn test_default_percentile_grid() {
        let grid = PercentileOptions::default().percentile_grid().unwrap();
        assert_eq!(grid.len(), 100);
        assert_eq!(grid[0], 1.0);
        assert_eq!(grid[99], 100.0);
    }

    #[test]
    fn test_percentile_grid_validation() {
        let bad = [vec![], vec![10.0, 5.0], vec![1.0, f64::NAN], vec![1.0, 1.0]];
        for grid in bad {
            let options = PercentileOptions::default().with_percentiles(grid);
            assert!(matches!(
                options.percentile_grid(),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_ramp_ascending() {
        let (tracer, volume) = ramp(1);
        let options = PercentileOptions::default().with_bin_edges(unit_edges());
        let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();

        assert_eq!(result.tp().shape(), &[100, 1]);
        assert_relative_eq!(result.value_at(9, 0).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.value_at(49, 0).unwrap(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(result.value_at(99, 0).unwrap(), 10.0, epsilon = 1e-9);
        // below the first cumulative point
        assert!(result.value_at(0, 0).is_none());
        assert_eq!(result.units(), Some("degC"));
        assert_eq!(result.order(), Order::Ascending);
    }

    #[test]
    fn test_ramp_descending() {
        let (tracer, volume) = ramp(1);
        let options = PercentileOptions::default()
            .with_bin_edges(unit_edges())
            .ascending(false);
        let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();

        assert_relative_eq!(result.value_at(9, 0).unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(result.value_at(99, 0).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_multiple_timesteps() {
        let (tracer, volume) = ramp(3);
        let tracer = tracer.with_coord("time", vec![1990.0, 1991.0, 1992.0]).unwrap();
        let options = PercentileOptions::default().with_bin_edges(unit_edges());
        let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();

        assert_eq!(result.time().to_vec(), vec![1990.0, 1991.0, 1992.0]);
        let median = result.series_at(50.0).unwrap();
        for &v in median.iter() {
            assert_relative_eq!(v, 5.0, epsilon = 1e-9);
        }
        assert!(result.series_at(50.5).is_none());
    }

    #[test]
    fn test_zero_volume_fails_degenerate() {
        let (tracer, _) = ramp(1);
        let volume = Field::new("volcello", &["x"], Array::zeros(10).into_dyn()).unwrap();
        let options = PercentileOptions::default().with_bin_edges(unit_edges());
        assert_eq!(
            compute_tracer_percentile(&tracer, &volume, &options).unwrap_err(),
            Error::DegenerateDistribution { time_index: 0 }
        );
    }

    #[test]
    fn test_single_bin_fails_insufficient() {
        let data = Array::from_shape_vec((1, 3), vec![0.5, 0.5, 0.5]).unwrap().into_dyn();
        let tracer = Field::new("o2", &["time", "x"], data).unwrap();
        let volume = Field::new("v", &["x"], Array::from_elem(3, 1.0).into_dyn()).unwrap();
        let options = PercentileOptions::default()
            .with_bin_edges(BinEdges::new(vec![0.0, 1.0]).unwrap());
        assert_eq!(
            compute_tracer_percentile(&tracer, &volume, &options).unwrap_err(),
            Error::InsufficientData {
                time_index: 0,
                found: 1
            }
        );
    }

    #[test]
    fn test_without_extensive() {
        let (tracer, volume) = ramp(1);
        let options = PercentileOptions::default()
            .with_bin_edges(unit_edges())
            .with_extensive(false);
        let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();
        assert!(result.extensive().is_none());
    }

    #[test]
    fn test_extensive_quantity() {
        let tp = arr2(&[[1.0, 2.0], [3.0, f64::NAN], [5.0, 4.0]]);
        let vt = arr1(&[100.0, 10.0]);
        let out = extensive_quantity(tp.view(), vt.view(), 2.0).unwrap();

        assert_relative_eq!(out[[0, 0]], 2.0);
        assert_relative_eq!(out[[1, 0]], 8.0);
        assert_relative_eq!(out[[2, 0]], 18.0);
        assert_relative_eq!(out[[0, 1]], 0.4);
        assert_relative_eq!(out[[1, 1]], 0.4);
        assert_relative_eq!(out[[2, 1]], 1.2);
    }

    #[test]
    fn test_extensive_shape_mismatch() {
        let tp = arr2(&[[1.0, 2.0]]);
        let vt = arr1(&[1.0]);
        assert!(extensive_quantity(tp.view(), vt.view(), 1.0).is_err());
    }

    #[test]
    fn test_extensive_uses_total_volume() {
        let (tracer, volume) = ramp(1);
        let options = PercentileOptions::default()
            .with_bin_edges(unit_edges())
            .with_prefactor(1.0);
        let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();
        let extensive = result.extensive().unwrap();

        assert_relative_eq!(result.total_volume()[0], 10.0);
        let expected: f64 = result.tp().column(0).iter().filter(|v| !v.is_nan()).sum::<f64>() * 0.1;
        assert_abs_diff_eq!(extensive[[99, 0]], expected, epsilon = 1e-9);
    }
}
