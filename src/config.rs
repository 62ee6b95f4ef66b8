//! Tracer and dataset catalog
//!
//! Static per-tracer metadata (bin range, units) and per-dataset metadata
//! (display color, model configuration identifiers), resolved once at
//! startup. Loaded from TOML or taken from the built-in defaults:
//!
//! ```toml
//! output_dir = "../data/tracerpercentiles/"
//!
//! [tracers.o2]
//! bins = { start = 0.0, stop = 0.4, count = 400 }
//! units = "molm-3"
//!
//! [datasets.esm4]
//! color = "tab:blue"
//! config_id = "ESM4_historical_D1"
//! ppname = "ocean_annual_z"
//! ```

use crate::histogram::BinEdges;
use crate::percentile::Order;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading or querying a [`Catalog`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown tracer '{0}'")]
    UnknownTracer(String),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("invalid bins for tracer '{tracer}': {source}")]
    InvalidBins {
        tracer: String,
        #[source]
        source: crate::Error,
    },
}

/// Evenly spaced bin edges, `count` edges from `start` to `stop`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: f64,
    pub stop: f64,
    #[serde(default = "BinRange::default_count")]
    pub count: usize,
}

impl BinRange {
    fn default_count() -> usize {
        BinEdges::DEFAULT_COUNT
    }

    pub fn edges(&self) -> crate::Result<BinEdges> {
        BinEdges::linspace(self.start, self.stop, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerSpec {
    pub bins: BinRange,
    #[serde(default)]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Display color for plots
    #[serde(default)]
    pub color: Option<String>,
    /// Model configuration identifier
    #[serde(default)]
    pub config_id: Option<String>,
    /// Post-processing component name
    #[serde(default)]
    pub ppname: Option<String>,
}

/// Resolved lookup tables keyed by tracer and dataset name
///
/// A `[tracers]` table in the file replaces the built-in tracers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "Catalog::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "Catalog::default_tracers")]
    pub tracers: BTreeMap<String, TracerSpec>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetSpec>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("../data/tracerpercentiles/")
    }

    fn default_tracers() -> BTreeMap<String, TracerSpec> {
        let oxygen = TracerSpec {
            bins: BinRange {
                start: 0.0,
                stop: 0.4,
                count: 400,
            },
            units: Some("molm-3".to_string()),
        };
        BTreeMap::from([
            ("o2".to_string(), oxygen.clone()),
            ("o2sat".to_string(), oxygen),
        ])
    }

    /// Built-in oxygen tracers, no datasets
    pub fn builtin() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            tracers: Self::default_tracers(),
            datasets: BTreeMap::new(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `path` if it exists, otherwise or on failure use the built-ins
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::builtin();
        }
        match Self::load(path) {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "using built-in catalog");
                Self::builtin()
            }
        }
    }

    pub fn tracer(&self, name: &str) -> Result<&TracerSpec, ConfigError> {
        self.tracers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTracer(name.to_string()))
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetSpec, ConfigError> {
        self.datasets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDataset(name.to_string()))
    }

    /// Resolved bin edges for a tracer
    pub fn bin_edges(&self, tracer: &str) -> Result<BinEdges, ConfigError> {
        self.tracer(tracer)?
            .bins
            .edges()
            .map_err(|source| ConfigError::InvalidBins {
                tracer: tracer.to_string(),
                source,
            })
    }

    /// `<output_dir>/<tracer>.<dataset>.<ascending|descending>[.upper2k].nc`
    pub fn output_path(&self, tracer: &str, dataset: &str, order: Order, upper2k: bool) -> PathBuf {
        let mut parts = vec![tracer, dataset, order.direction_name()];
        if upper2k {
            parts.push("upper2k");
        }
        parts.push("nc");
        self.output_dir.join(parts.join("."))
    }
}
