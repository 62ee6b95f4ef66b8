//! Volumetric histograms
//!
//! Bins a tracer field by value, weighting each grid cell by its volume,
//! giving one histogram per timestep along a tracer-value axis.
//!
//! # Types
//!
//! - [`BinEdges`]: validated, strictly increasing bin boundaries
//! - [`VolumeHistogram`]: the `(time, bin)` result, optionally normalized by bin width
//! - [`HistogramPlan`]: deferred histogram over one or more spatial chunks
//!
//! # Example
//!
//! ```
//! use ndarray::Array;
//! use tracer_percentile::histogram::{BinEdges, HistogramPlan};
//! use tracer_percentile::traits::Evaluate;
//! use tracer_percentile::Field;
//!
//! let o2 = Array::from_shape_vec((1, 3), vec![0.1, 0.2, 0.3]).unwrap().into_dyn();
//! let tracer = Field::new("o2", &["time", "x"], o2).unwrap();
//! let volume = Field::new("volcello", &["x"], Array::from_elem(3, 2.0).into_dyn()).unwrap();
//!
//! let plan = HistogramPlan::new(&tracer, &volume)
//!     .bin_edges(Some(BinEdges::linspace(0.0, 0.4, 5).unwrap()))
//!     .normalize(false);
//!
//! // Nothing is computed until the plan is evaluated
//! let hist = plan.evaluate().unwrap();
//! assert_eq!(hist.total_volume()[0], 6.0);
//! ```

mod edges;
mod volumetric;

pub use edges::BinEdges;
pub use volumetric::{compute_histogram, Chunk, HistogramPlan, VolumeHistogram};
