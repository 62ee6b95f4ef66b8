//! Volume-weighted histograms of tracer fields
//!
//! For every timestep, each grid cell contributes its volume to the bin
//! holding its tracer value. The result is a `(time, bin)` array, optionally
//! divided by bin width to give a volume density per unit tracer.

use super::edges::BinEdges;
use crate::error::{Error, Result};
use crate::field::{Field, TIME_DIM};
use crate::traits::{Evaluate, Merge};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use std::borrow::Cow;
use tracing::debug;

/// Volumetric histogram of a tracer, per timestep
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VolumeHistogram {
    tracer_name: String,
    units: Option<String>,
    edges: BinEdges,
    time: Array1<f64>,
    /// Shape `(time, bin)`
    values: Array2<f64>,
    normalized: bool,
}

impl VolumeHistogram {
    /// Sum cell volumes into bins, independently for every timestep
    ///
    /// Cells with a non-finite tracer value or volume are skipped (land, fill
    /// values). Negative volumes are rejected.
    pub(crate) fn accumulate(tracer: &Field, volume: &Field, edges: &BinEdges) -> Result<Self> {
        let time_ax = tracer.axis_of(TIME_DIM).ok_or_else(|| {
            Error::invalid(format!(
                "tracer '{}' has no '{}' dimension",
                tracer.name(),
                TIME_DIM
            ))
        })?;
        let time = tracer.coord(TIME_DIM).unwrap_or_default();
        let mut values = Array2::<f64>::zeros((time.len(), edges.num_bins()));

        volume.with_broadcast(tracer, |vol| -> Result<()> {
            let slices = tracer
                .data()
                .axis_iter(Axis(time_ax))
                .zip(vol.axis_iter(Axis(time_ax)));
            for (mut row, (tr, vo)) in values.axis_iter_mut(Axis(0)).zip(slices) {
                let mut negative = None;
                Zip::from(&tr).and(&vo).for_each(|&c, &v| {
                    if !v.is_finite() {
                        return;
                    }
                    if v < 0.0 {
                        negative.get_or_insert(v);
                        return;
                    }
                    if let Some(bin) = edges.bin_index(c) {
                        row[bin] += v;
                    }
                });
                if let Some(v) = negative {
                    return Err(Error::invalid(format!(
                        "volume '{}' contains negative value {}",
                        volume.name(),
                        v
                    )));
                }
            }
            Ok(())
        })??;

        Ok(Self {
            tracer_name: tracer.name().to_string(),
            units: tracer.units().map(str::to_string),
            edges: edges.clone(),
            time,
            values,
            normalized: false,
        })
    }

    /// Divide each bin by its width
    ///
    /// No-op if already normalized.
    pub fn into_normalized(mut self) -> Self {
        if !self.normalized {
            let widths = self.edges.widths();
            self.values /= &widths;
            self.normalized = true;
        }
        self
    }

    pub fn tracer_name(&self) -> &str {
        &self.tracer_name
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Name of the bin dimension, `<tracer>_bin`
    pub fn bin_dim(&self) -> String {
        format!("{}_bin", self.tracer_name)
    }

    pub fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Bin coordinate: the upper edge of each bin
    pub fn bin_coords(&self) -> &[f64] {
        self.edges.upper_edges()
    }

    pub fn bin_widths(&self) -> Array1<f64> {
        self.edges.widths()
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    /// Histogram values, shape `(time, bin)`
    ///
    /// Volume densities if normalized, otherwise volumes.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn num_times(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_bins(&self) -> usize {
        self.values.ncols()
    }

    /// True per-bin volumes, re-multiplying densities by bin width
    pub fn volumes(&self) -> Array2<f64> {
        if self.normalized {
            &self.values * &self.edges.widths()
        } else {
            self.values.clone()
        }
    }

    /// Total binned volume per timestep
    pub fn total_volume(&self) -> Array1<f64> {
        self.volumes().sum_axis(Axis(1))
    }
}

impl Merge for VolumeHistogram {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.tracer_name != other.tracer_name {
            return Err(Error::invalid(format!(
                "cannot merge histograms of '{}' and '{}'",
                self.tracer_name, other.tracer_name
            )));
        }
        if self.edges != other.edges {
            return Err(Error::invalid("cannot merge histograms with different bin edges"));
        }
        if self.time != other.time {
            return Err(Error::invalid("cannot merge histograms with different time coordinates"));
        }
        if self.normalized != other.normalized {
            return Err(Error::invalid(
                "cannot merge a normalized histogram with an unnormalized one",
            ));
        }
        self.values += &other.values;
        Ok(())
    }
}

impl Evaluate for VolumeHistogram {
    type Output = VolumeHistogram;

    fn evaluate(&self) -> Result<Cow<'_, VolumeHistogram>> {
        Ok(Cow::Borrowed(self))
    }
}

/// One piece of the domain: a tracer and its matching cell volumes
#[derive(Clone, Copy)]
pub struct Chunk<'a> {
    pub tracer: &'a dyn Evaluate<Output = Field>,
    pub volume: &'a dyn Evaluate<Output = Field>,
}

/// Deferred volumetric histogram
///
/// Describes a histogram over one or more spatial chunks without touching the
/// data. [`Evaluate::evaluate`] materializes each chunk, bins it and merges the
/// partial histograms. All chunks must share the same time coordinate.
///
/// If no edges are given, [`BinEdges::DEFAULT_COUNT`] edges are spread over
/// the global finite range of the tracer across all chunks.
pub struct HistogramPlan<'a> {
    chunks: Vec<Chunk<'a>>,
    edges: Option<BinEdges>,
    bin_count: usize,
    normalize: bool,
}

impl<'a> HistogramPlan<'a> {
    /// Plan a histogram over a single tracer/volume pair
    pub fn new(
        tracer: &'a dyn Evaluate<Output = Field>,
        volume: &'a dyn Evaluate<Output = Field>,
    ) -> Self {
        Self::chunked([Chunk { tracer, volume }])
    }

    /// Plan a histogram over several chunks of the same domain
    pub fn chunked(chunks: impl IntoIterator<Item = Chunk<'a>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            edges: None,
            bin_count: BinEdges::DEFAULT_COUNT,
            normalize: true,
        }
    }

    pub fn with_chunk(
        mut self,
        tracer: &'a dyn Evaluate<Output = Field>,
        volume: &'a dyn Evaluate<Output = Field>,
    ) -> Self {
        self.chunks.push(Chunk { tracer, volume });
        self
    }

    pub fn bin_edges(mut self, edges: Option<BinEdges>) -> Self {
        self.edges = edges;
        self
    }

    /// Number of edges derived when no explicit edges are set
    pub fn bin_count(mut self, count: usize) -> Self {
        self.bin_count = count;
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }
}

impl Evaluate for HistogramPlan<'_> {
    type Output = VolumeHistogram;

    fn evaluate(&self) -> Result<Cow<'_, VolumeHistogram>> {
        let fields = self
            .chunks
            .iter()
            .map(|c| -> Result<_> { Ok((c.tracer.evaluate()?, c.volume.evaluate()?)) })
            .collect::<Result<Vec<_>>>()?;

        let edges = match &self.edges {
            Some(edges) => edges.clone(),
            None => {
                let tracers = fields.iter().map(|(tracer, _)| &**tracer);
                BinEdges::spanning(tracers, self.bin_count)?
            }
        };
        debug!(
            chunks = fields.len(),
            bins = edges.num_bins(),
            "computing volumetric histogram"
        );

        let mut merged: Option<VolumeHistogram> = None;
        for (tracer, volume) in &fields {
            let partial = VolumeHistogram::accumulate(tracer, volume, &edges)?;
            match merged.as_mut() {
                Some(acc) => acc.merge(&partial)?,
                None => merged = Some(partial),
            }
        }
        let hist = merged.ok_or_else(|| Error::invalid("histogram plan has no chunks"))?;

        Ok(Cow::Owned(if self.normalize {
            hist.into_normalized()
        } else {
            hist
        }))
    }
}

/// Volumetric histogram of `tracer` weighted by `volume`
///
/// Sums, for every timestep, the volume of all cells whose tracer value falls
/// in each bin, over every non-time dimension. Bins are half-open except the
/// last, which also holds values equal to the final edge. With `normalize`,
/// each bin is divided by its width. Returns the histogram together with the
/// bin widths so callers can recover true volumes.
///
/// # Errors
///
/// [`Error::InvalidInput`] if the tracer has no `time` dimension, the volume
/// dimensions are not compatible with the tracer, volumes are negative, or
/// edges cannot be derived.
///
/// # Example
///
/// ```
/// use ndarray::Array;
/// use tracer_percentile::{compute_histogram, BinEdges, Field};
///
/// let o2 = Array::from_shape_vec((1, 4), vec![0.5, 1.5, 1.7, 3.2]).unwrap().into_dyn();
/// let tracer = Field::new("o2", &["time", "x"], o2).unwrap();
/// let cells = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0]).into_dyn();
/// let volume = Field::new("volcello", &["x"], cells).unwrap();
/// let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 4.0]).unwrap();
///
/// let (hist, widths) = compute_histogram(&tracer, &volume, Some(&edges), false).unwrap();
/// assert_eq!(hist.values().row(0).to_vec(), vec![1.0, 5.0, 4.0]);
/// assert_eq!(widths.to_vec(), vec![1.0, 1.0, 2.0]);
/// ```
pub fn compute_histogram(
    tracer: &Field,
    volume: &Field,
    edges: Option<&BinEdges>,
    normalize: bool,
) -> Result<(VolumeHistogram, Array1<f64>)> {
    let hist = HistogramPlan::new(tracer, volume)
        .bin_edges(edges.cloned())
        .normalize(normalize)
        .evaluate()?
        .into_owned();
    let widths = hist.bin_widths();
    Ok((hist, widths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Deferred;
    use approx::assert_relative_eq;
    use ndarray::{Array, Array3};

    fn tracer(values: Vec<f64>, times: usize) -> Field {
        let n = values.len() / times;
        let data = Array::from_shape_vec((times, n), values).unwrap().into_dyn();
        Field::new("o2", &["time", "x"], data)
            .unwrap()
            .with_units("molm-3")
    }

    fn volume(values: Vec<f64>) -> Field {
        Field::new("volcello", &["x"], Array::from_vec(values).into_dyn()).unwrap()
    }

    #[test]
    fn test_basic_binning() {
        let t = tracer(vec![0.5, 1.5, 1.7, 3.2], 1);
        let v = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 4.0]).unwrap();

        let (hist, widths) = compute_histogram(&t, &v, Some(&edges), false).unwrap();
        assert_eq!(hist.values().row(0).to_vec(), vec![1.0, 5.0, 4.0]);
        assert_eq!(widths.to_vec(), vec![1.0, 1.0, 2.0]);
        assert_eq!(hist.bin_coords(), &[1.0, 2.0, 4.0]);
        assert_eq!(hist.bin_dim(), "o2_bin");
        assert_eq!(hist.units(), Some("molm-3"));
        assert!(!hist.is_normalized());
    }

    #[test]
    fn test_normalized_divides_by_width() {
        let t = tracer(vec![0.5, 1.5, 1.7, 3.2], 1);
        let v = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 4.0]).unwrap();

        let (hist, _) = compute_histogram(&t, &v, Some(&edges), true).unwrap();
        assert!(hist.is_normalized());
        assert_eq!(hist.values().row(0).to_vec(), vec![1.0, 5.0, 2.0]);
        assert_eq!(hist.volumes().row(0).to_vec(), vec![1.0, 5.0, 4.0]);
        assert_relative_eq!(hist.total_volume()[0], 10.0);
    }

    #[test]
    fn test_each_timestep_independent() {
        let t = tracer(vec![0.5, 0.5, 0.5, 2.5, 2.5, 2.5], 2);
        let v = volume(vec![1.0, 1.0, 2.0]);
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();

        let (hist, _) = compute_histogram(&t, &v, Some(&edges), false).unwrap();
        assert_eq!(hist.num_times(), 2);
        assert_eq!(hist.values().row(0).to_vec(), vec![4.0, 0.0, 0.0]);
        assert_eq!(hist.values().row(1).to_vec(), vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_skips_out_of_range_and_nan() {
        let t = tracer(vec![-1.0, f64::NAN, 0.5, 3.0, 3.5], 1);
        let v = volume(vec![1.0, 2.0, 4.0, 8.0, 16.0]);
        let edges = BinEdges::new(vec![0.0, 1.0, 3.0]).unwrap();

        let (hist, _) = compute_histogram(&t, &v, Some(&edges), false).unwrap();
        // -1 and 3.5 outside, NaN masked, 3.0 on the closed last edge
        assert_eq!(hist.values().row(0).to_vec(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_nan_volume_skipped_negative_rejected() {
        let t = tracer(vec![0.5, 0.5], 1);
        let edges = BinEdges::new(vec![0.0, 1.0]).unwrap();

        let masked = volume(vec![f64::NAN, 2.0]);
        let (hist, _) = compute_histogram(&t, &masked, Some(&edges), false).unwrap();
        assert_eq!(hist.values()[[0, 0]], 2.0);

        let err = compute_histogram(&t, &volume(vec![-1.0, 2.0]), Some(&edges), false).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_requires_time_dim() {
        let data = Array::from_vec(vec![0.5, 1.5]).into_dyn();
        let t = Field::new("o2", &["x"], data).unwrap();
        let err = compute_histogram(&t, &volume(vec![1.0, 1.0]), None, true).unwrap_err();
        assert!(err.to_string().contains("time"));
    }

    #[test]
    fn test_incompatible_volume() {
        let t = tracer(vec![0.5, 1.5, 2.5], 1);
        let err = compute_histogram(&t, &volume(vec![1.0, 1.0]), None, true).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_default_edges_span_tracer() {
        let t = tracer(vec![1.0, 2.0, 3.0, 4.0], 1);
        let v = volume(vec![1.0; 4]);
        let (hist, widths) = compute_histogram(&t, &v, None, false).unwrap();
        assert_eq!(hist.edges().len(), BinEdges::DEFAULT_COUNT);
        assert_eq!(hist.edges().first(), 1.0);
        assert_eq!(hist.edges().last(), 4.0);
        assert!(widths.iter().all(|&w| w > 0.0));
        // the maximum lands in the closed last bin
        assert_relative_eq!(hist.total_volume()[0], 4.0);
        assert_eq!(hist.values()[[0, hist.num_bins() - 1]], 1.0);
    }

    #[test]
    fn test_time_varying_volume() {
        let data = Array3::from_shape_fn((2, 2, 2), |(t, _, _)| t as f64 + 0.5).into_dyn();
        let t = Field::new("o2", &["time", "y", "x"], data).unwrap();
        let vdata = Array3::from_shape_fn((2, 2, 2), |(t, _, _)| (t + 1) as f64).into_dyn();
        let v = Field::new("volcello", &["time", "y", "x"], vdata).unwrap();
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();

        let (hist, _) = compute_histogram(&t, &v, Some(&edges), false).unwrap();
        assert_eq!(hist.values().row(0).to_vec(), vec![4.0, 0.0]);
        assert_eq!(hist.values().row(1).to_vec(), vec![0.0, 8.0]);
    }

    #[test]
    fn test_chunked_plan_matches_whole() {
        let whole_t = tracer(vec![0.5, 1.5, 2.5, 3.5], 1);
        let whole_v = volume(vec![1.0, 2.0, 3.0, 4.0]);
        let left_t = tracer(vec![0.5, 1.5], 1);
        let left_v = volume(vec![1.0, 2.0]);
        let right_t = tracer(vec![2.5, 3.5], 1);
        let right_v = volume(vec![3.0, 4.0]);
        let edges = BinEdges::linspace(0.0, 4.0, 5).unwrap();

        let whole = HistogramPlan::new(&whole_t, &whole_v)
            .bin_edges(Some(edges.clone()))
            .evaluate()
            .unwrap()
            .into_owned();
        let plan = HistogramPlan::new(&left_t, &left_v)
            .with_chunk(&right_t, &right_v)
            .bin_edges(Some(edges));
        assert_eq!(plan.num_chunks(), 2);
        let chunked = plan.evaluate().unwrap().into_owned();

        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_chunked_default_edges_use_global_range() {
        let left_t = tracer(vec![0.0, 1.0], 1);
        let right_t = tracer(vec![5.0, 9.0], 1);
        let v = volume(vec![1.0, 1.0]);

        let hist = HistogramPlan::new(&left_t, &v)
            .with_chunk(&right_t, &v)
            .bin_count(10)
            .evaluate()
            .unwrap()
            .into_owned();
        assert_eq!(hist.edges().first(), 0.0);
        assert_eq!(hist.edges().last(), 9.0);
        assert_eq!(hist.edges().len(), 10);
    }

    #[test]
    fn test_merge_rejects_mismatched_grids() {
        let t = tracer(vec![0.5, 1.5], 1);
        let v = volume(vec![1.0, 1.0]);
        let narrow = BinEdges::linspace(0.0, 2.0, 3).unwrap();
        let wide = BinEdges::linspace(0.0, 4.0, 3).unwrap();
        let (mut a, _) = compute_histogram(&t, &v, Some(&narrow), false).unwrap();
        let (b, _) = compute_histogram(&t, &v, Some(&wide), false).unwrap();
        assert!(a.merge(&b).is_err());

        let (c, _) = compute_histogram(&t, &v, Some(&narrow), true).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn test_deferred_chunk_evaluated_lazily() {
        let v = volume(vec![1.0, 1.0]);
        let deferred = Deferred::new(|| Ok(tracer(vec![0.5, 1.5], 1)));
        let plan = HistogramPlan::new(&deferred, &v).normalize(false);
        let hist = plan.evaluate().unwrap();
        assert_relative_eq!(hist.total_volume()[0], 2.0);
    }
}
