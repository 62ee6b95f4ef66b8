//! Labeled N-dimensional fields
//!
//! A [`Field`] is a named array of `f64` values whose axes carry dimension
//! names (`"time"`, `"z"`, `"y"`, `"x"`, ...) and optional coordinate values.
//! Tracer fields must carry a [`TIME_DIM`] axis; volume fields carry any
//! subset of the tracer's dimensions and are broadcast over the rest.

use crate::error::{Error, Result};
use crate::traits::Evaluate;
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Name of the time dimension every tracer field must carry
pub const TIME_DIM: &str = "time";

/// Named array with labeled dimensions and coordinates
///
/// # Example
///
/// ```
/// use ndarray::Array;
/// use tracer_percentile::Field;
///
/// let data = Array::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
///     .unwrap()
///     .into_dyn();
/// let field = Field::new("o2", &["time", "x"], data)
///     .unwrap()
///     .with_units("molm-3")
///     .with_coord("time", vec![0.5, 1.5])
///     .unwrap();
///
/// assert_eq!(field.len_of("x"), Some(3));
/// assert_eq!(field.finite_range(), Some((1.0, 6.0)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    units: Option<String>,
    dims: Vec<String>,
    coords: BTreeMap<String, Array1<f64>>,
    data: ArrayD<f64>,
}

impl Field {
    /// Create a field from dimension names and data
    ///
    /// The number of names must match the array rank and names must be unique.
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        dims: &[S],
        data: ArrayD<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(Error::invalid(format!(
                "field '{}' has {} dimension names for an array of rank {}",
                name,
                dims.len(),
                data.ndim()
            )));
        }
        let dims: Vec<String> = dims.iter().map(|d| d.as_ref().to_string()).collect();
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(Error::invalid(format!(
                    "field '{}' repeats dimension '{}'",
                    name, dim
                )));
            }
        }
        Ok(Self {
            name,
            units: None,
            dims,
            coords: BTreeMap::new(),
            data,
        })
    }

    /// Attach physical units
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Attach coordinate values along a dimension
    pub fn with_coord(mut self, dim: &str, values: impl Into<Array1<f64>>) -> Result<Self> {
        let values = values.into();
        let len = self.len_of(dim).ok_or_else(|| {
            Error::invalid(format!("field '{}' has no dimension '{}'", self.name, dim))
        })?;
        if values.len() != len {
            return Err(Error::invalid(format!(
                "coordinate '{}' has {} values but dimension has length {}",
                dim,
                values.len(),
                len
            )));
        }
        self.coords.insert(dim.to_string(), values);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Axis index of a named dimension
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Length of a named dimension
    pub fn len_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|ax| self.data.len_of(Axis(ax)))
    }

    /// Coordinate values along a dimension
    ///
    /// Falls back to index positions `0, 1, 2, ...` when no explicit
    /// coordinate was attached.
    pub fn coord(&self, dim: &str) -> Option<Array1<f64>> {
        if let Some(values) = self.coords.get(dim) {
            return Some(values.clone());
        }
        self.len_of(dim)
            .map(|len| Array1::from_iter((0..len).map(|i| i as f64)))
    }

    /// Global minimum and maximum over finite values
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Keep only positions along `dim` whose coordinate lies in `[lower, upper]`
    ///
    /// Used to restrict a field to a sub-domain, e.g. the upper 2000 m of
    /// the water column.
    pub fn select_range(&self, dim: &str, lower: f64, upper: f64) -> Result<Self> {
        let ax = self.axis_of(dim).ok_or_else(|| {
            Error::invalid(format!("field '{}' has no dimension '{}'", self.name, dim))
        })?;
        let coord = self.coord(dim).unwrap_or_default();
        let keep: Vec<usize> = coord
            .iter()
            .enumerate()
            .filter(|(_, &c)| c >= lower && c <= upper)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(Error::invalid(format!(
                "no '{}' coordinate of field '{}' lies in [{}, {}]",
                dim, self.name, lower, upper
            )));
        }

        let mut coords = self.coords.clone();
        coords.insert(
            dim.to_string(),
            keep.iter().map(|&i| coord[i]).collect::<Array1<f64>>(),
        );
        Ok(Self {
            name: self.name.clone(),
            units: self.units.clone(),
            dims: self.dims.clone(),
            coords,
            data: self.data.select(Axis(ax), &keep),
        })
    }

    /// Run `f` on a view of this field broadcast to the shape of `target`
    ///
    /// Every dimension of `self` must exist on `target` with the same length.
    /// Dimensions may appear in a different order; dimensions missing from
    /// `self` are broadcast.
    pub(crate) fn with_broadcast<R>(
        &self,
        target: &Field,
        f: impl FnOnce(ArrayViewD<'_, f64>) -> R,
    ) -> Result<R> {
        let mut placement = Vec::with_capacity(self.ndim());
        for (ax, dim) in self.dims.iter().enumerate() {
            let target_ax = target.axis_of(dim).ok_or_else(|| {
                Error::invalid(format!(
                    "'{}' has dimension '{}' which '{}' lacks",
                    self.name, dim, target.name
                ))
            })?;
            let len = self.data.len_of(Axis(ax));
            let target_len = target.data.len_of(Axis(target_ax));
            if len != target_len {
                return Err(Error::invalid(format!(
                    "dimension '{}' has length {} on '{}' but {} on '{}'",
                    dim, len, self.name, target_len, target.name
                )));
            }
            placement.push((target_ax, ax));
        }
        placement.sort_unstable();
        let order: Vec<usize> = placement.iter().map(|&(_, ax)| ax).collect();

        let mut view = self.data.view().permuted_axes(IxDyn(&order));
        for (target_ax, dim) in target.dims.iter().enumerate() {
            if !self.dims.contains(dim) {
                view.insert_axis_inplace(Axis(target_ax));
            }
        }
        let broadcast = view.broadcast(target.data.raw_dim()).ok_or_else(|| {
            Error::invalid(format!(
                "cannot broadcast '{}' to the shape of '{}'",
                self.name, target.name
            ))
        })?;
        Ok(f(broadcast))
    }
}

impl Evaluate for Field {
    type Output = Field;

    fn evaluate(&self) -> Result<Cow<'_, Field>> {
        Ok(Cow::Borrowed(self))
    }
}

/// A field produced on demand
///
/// Wraps any loader (chunked reader, remote fetch, derived computation) so it
/// is only run when a computation actually needs concrete values.
pub struct Deferred<F> {
    load: F,
}

impl<F> Deferred<F>
where
    F: Fn() -> Result<Field>,
{
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

impl<F> Evaluate for Deferred<F>
where
    F: Fn() -> Result<Field>,
{
    type Output = Field;

    fn evaluate(&self) -> Result<Cow<'_, Field>> {
        (self.load)().map(Cow::Owned)
    }
}

impl<F> core::fmt::Debug for Deferred<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
