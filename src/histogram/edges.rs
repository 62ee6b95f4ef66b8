//! Validated bin edges

use crate::error::{Error, Result};
use crate::field::Field;
use ndarray::Array1;

/// Strictly increasing, finite bin boundaries
///
/// `n` edges define `n - 1` bins `[e[i], e[i+1])`, the last one closed on
/// the right so values equal to the final edge are binned. A bin is
/// identified by its upper edge.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<f64>", into = "Vec<f64>")
)]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Number of edges used when none are supplied
    pub const DEFAULT_COUNT: usize = 100;

    /// Validate a sequence of edges
    ///
    /// Requires at least two finite, strictly increasing values.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::invalid(format!(
                "bin edges need at least 2 values, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(Error::invalid(format!("bin edge {} is not finite", bad)));
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::invalid(format!(
                "bin edges must be strictly increasing: edge {} ({}) does not exceed edge {} ({})",
                i + 1,
                edges[i + 1],
                i,
                edges[i]
            )));
        }
        Ok(Self { edges })
    }

    /// `count` evenly spaced edges from `start` to `stop` inclusive
    pub fn linspace(start: f64, stop: f64, count: usize) -> Result<Self> {
        if count < 2 {
            return Err(Error::invalid(format!(
                "need at least 2 edges, got {}",
                count
            )));
        }
        if !(stop > start) {
            return Err(Error::invalid(format!(
                "edge range [{}, {}] has no extent",
                start, stop
            )));
        }
        let step = (stop - start) / (count - 1) as f64;
        let mut edges: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
        edges[count - 1] = stop;
        Self::new(edges)
    }

    /// `count` evenly spaced edges over the finite range of one or more fields
    ///
    /// The range is the global minimum and maximum across every field. Fails
    /// when no field has a finite value or all finite values are equal, since
    /// the resulting bins would have zero width.
    pub fn spanning<'a>(
        fields: impl IntoIterator<Item = &'a Field>,
        count: usize,
    ) -> Result<Self> {
        let (lo, hi) = fields
            .into_iter()
            .filter_map(Field::finite_range)
            .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
            .ok_or_else(|| Error::invalid("tracer has no finite values to derive bin edges"))?;
        Self::linspace(lo, hi, count)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.edges
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Always false: edges hold at least two values
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of bins (`len() - 1`)
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn first(&self) -> f64 {
        self.edges[0]
    }

    pub fn last(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Upper edge of each bin, used as the bin coordinate
    pub fn upper_edges(&self) -> &[f64] {
        &self.edges[1..]
    }

    /// Width of each bin
    pub fn widths(&self) -> Array1<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Bin holding `value`, or `None` outside `[first, last]` or for NaN
    #[inline]
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !(value >= self.first() && value <= self.last()) {
            return None;
        }
        let bin = self.edges.partition_point(|&e| e <= value) - 1;
        Some(bin.min(self.num_bins() - 1))
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.edges
    }
}
