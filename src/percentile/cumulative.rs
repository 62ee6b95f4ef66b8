//! Cumulative volume fraction curves

use super::invert::invert_and_interpolate;
use crate::error::{Error, Result};
use crate::histogram::VolumeHistogram;
use crate::traits::Evaluate;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use std::borrow::Cow;

/// Direction in which tracer bins are accumulated
///
/// With `Ascending`, percentile 0 corresponds to the lowest tracer values;
/// with `Descending`, to the highest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            Order::Ascending
        } else {
            Order::Descending
        }
    }

    pub fn is_ascending(self) -> bool {
        self == Order::Ascending
    }

    /// Label used in output file names
    pub fn direction_name(self) -> &'static str {
        match self {
            Order::Ascending => "ascending",
            Order::Descending => "descending",
        }
    }
}

impl core::fmt::Display for Order {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.direction_name())
    }
}

/// Percentage of total volume accumulated up to each bin, per timestep
///
/// Bins are laid out in traversal order (ascending or descending tracer) and
/// each keeps its upper edge as coordinate. Values run from 0 to 100.
#[derive(Clone, Debug, PartialEq)]
pub struct CumulativeCurve {
    tracer_name: String,
    units: Option<String>,
    order: Order,
    time: Array1<f64>,
    /// Bin upper edges in traversal order
    coords: Array1<f64>,
    /// Shape `(time, bin)`
    fractions: Array2<f64>,
    total_volume: Array1<f64>,
}

impl CumulativeCurve {
    /// Accumulate true per-bin volumes in the given order
    ///
    /// # Errors
    ///
    /// [`Error::DegenerateDistribution`] if any timestep has no binned volume.
    pub fn from_histogram(hist: &VolumeHistogram, order: Order) -> Result<Self> {
        let mut volumes = hist.volumes();
        let mut coords = Array1::from(hist.bin_coords().to_vec());
        if order == Order::Descending {
            volumes = volumes.slice(s![.., ..;-1]).to_owned();
            coords = coords.slice(s![..;-1]).to_owned();
        }

        volumes.accumulate_axis_inplace(Axis(1), |&prev, cur| *cur += prev);
        let total_volume: Array1<f64> = volumes
            .axis_iter(Axis(0))
            .map(|row| row.len().checked_sub(1).map_or(0.0, |last| row[last]))
            .collect();

        if let Some(t) = total_volume.iter().position(|&vt| !(vt > 0.0)) {
            return Err(Error::DegenerateDistribution { time_index: t });
        }

        for (mut row, &vt) in volumes.axis_iter_mut(Axis(0)).zip(total_volume.iter()) {
            row.mapv_inplace(|c| c / vt * 100.0);
        }

        Ok(Self {
            tracer_name: hist.tracer_name().to_string(),
            units: hist.units().map(str::to_string),
            order,
            time: hist.time().clone(),
            coords,
            fractions: volumes,
            total_volume,
        })
    }

    pub fn tracer_name(&self) -> &str {
        &self.tracer_name
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    /// Bin upper edges in traversal order
    pub fn coords(&self) -> ArrayView1<'_, f64> {
        self.coords.view()
    }

    /// Cumulative percentages, shape `(time, bin)`
    pub fn fractions(&self) -> &Array2<f64> {
        &self.fractions
    }

    /// Cumulative percentages at one timestep
    pub fn fractions_at(&self, time_index: usize) -> ArrayView1<'_, f64> {
        self.fractions.row(time_index)
    }

    /// Total volume per timestep
    pub fn total_volume(&self) -> &Array1<f64> {
        &self.total_volume
    }

    pub fn num_times(&self) -> usize {
        self.fractions.nrows()
    }

    /// Tracer value at each target percentile for one timestep
    pub fn invert_at(&self, time_index: usize, percentiles: &[f64]) -> Result<Array1<f64>> {
        invert_and_interpolate(self.fractions_at(time_index), self.coords(), percentiles)
            .map_err(|e| e.at_time(time_index))
    }
}

impl Evaluate for CumulativeCurve {
    type Output = CumulativeCurve;

    fn evaluate(&self) -> Result<Cow<'_, CumulativeCurve>> {
        Ok(Cow::Borrowed(self))
    }
}

/// Deferred cumulative fraction curve over a (possibly deferred) histogram
pub struct CumulativePlan<H> {
    histogram: H,
    order: Order,
}

impl<H> CumulativePlan<H>
where
    H: Evaluate<Output = VolumeHistogram>,
{
    pub fn new(histogram: H, order: Order) -> Self {
        Self { histogram, order }
    }

    pub fn order(&self) -> Order {
        self.order
    }
}

impl<H> Evaluate for CumulativePlan<H>
where
    H: Evaluate<Output = VolumeHistogram>,
{
    type Output = CumulativeCurve;

    fn evaluate(&self) -> Result<Cow<'_, CumulativeCurve>> {
        let hist = self.histogram.evaluate()?;
        CumulativeCurve::from_histogram(&hist, self.order).map(Cow::Owned)
    }
}
