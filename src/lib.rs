//! # Tracer Percentile
//!
//! Volume-weighted tracer percentiles for gridded ocean model output.
//!
//! Given a tracer field (temperature, dissolved oxygen, ...) and the volume of
//! every grid cell, this crate computes, per timestep, the tracer value below
//! which a given percentage of the ocean volume lies, and the associated
//! extensive quantity (heat content, oxygen inventory) accumulated along the
//! percentile axis.
//!
//! ## Features
//!
//! - **Volumetric histograms**: bin a tracer by value, weighting each cell by its volume
//! - **Percentile inversion**: map the cumulative volume curve back onto a uniform percentile grid
//! - **Extensive quantities**: integrate tracer percentiles over the percentile axis
//! - **Deferred evaluation**: describe computations over lazily loaded or chunked fields,
//!   materialize once
//! - **Explicit failures**: empty distributions and unusable curves are errors, never silent NaNs
//!
//! ## Quick Start
//!
//! ```rust
//! use ndarray::Array;
//! use tracer_percentile::prelude::*;
//!
//! // two timesteps, four cells
//! let o2 = Array::from_shape_vec((2, 4), vec![0.05, 0.12, 0.21, 0.33, 0.06, 0.14, 0.22, 0.31])
//!     .unwrap()
//!     .into_dyn();
//! let tracer = Field::new("o2", &["time", "x"], o2).unwrap().with_units("molm-3");
//! let volume = Field::new("volcello", &["x"], Array::from_elem(4, 1.0e9).into_dyn()).unwrap();
//!
//! let options = PercentileOptions::default()
//!     .with_bin_edges(BinEdges::linspace(0.0, 0.4, 41).unwrap());
//! let result = compute_tracer_percentile(&tracer, &volume, &options).unwrap();
//!
//! assert_eq!(result.tp().shape(), &[100, 2]);
//! assert!(result.extensive().is_some());
//! ```
//!
//! ## Feature Flags
//!
//! - `config` (default): typed tracer/dataset catalog loaded from TOML
//! - `serde`: serialization of bin edges, histograms and results
//! - `parallel`: invert timesteps in parallel with rayon
//! - `full`: enable everything

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod field;
pub mod histogram;
pub mod percentile;
pub mod traits;

#[cfg(feature = "config")]
#[cfg_attr(docsrs, doc(cfg(feature = "config")))]
pub mod config;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::field::{Deferred, Field, TIME_DIM};
    pub use crate::histogram::{compute_histogram, BinEdges, HistogramPlan, VolumeHistogram};
    pub use crate::percentile::{
        compute_tracer_percentile, extensive_quantity, CumulativeCurve, Order,
        PercentileOptions, TracerPercentile,
    };
    pub use crate::traits::*;

    #[cfg(feature = "config")]
    pub use crate::config::Catalog;
}

pub use error::{Error, Result};
pub use field::{Deferred, Field};
pub use histogram::{compute_histogram, BinEdges, VolumeHistogram};
pub use percentile::{
    compute_tracer_percentile, extensive_quantity, Order, PercentileOptions, TracerPercentile,
};
