//! Core traits
//!
//! [`Evaluate`] separates describing a computation from materializing it, so
//! inputs and intermediate results can come from any backend (in-memory,
//! chunked, loaded on demand). [`Merge`] combines partial results computed
//! over disjoint pieces of the same domain.

use crate::error::Result;
use std::borrow::Cow;

/// A value that can be materialized on request
///
/// Eager values hand out a borrow of themselves; deferred values run their
/// computation and hand out an owned result. Callers decide when evaluation
/// happens and should evaluate once, then work on the concrete value.
pub trait Evaluate {
    /// Concrete type produced by evaluation
    type Output: Clone;

    /// Materialize the value
    fn evaluate(&self) -> Result<Cow<'_, Self::Output>>;
}

impl<T: Evaluate + ?Sized> Evaluate for &T {
    type Output = T::Output;

    fn evaluate(&self) -> Result<Cow<'_, Self::Output>> {
        (**self).evaluate()
    }
}

/// Partial results that can be combined
///
/// Merging must be equivalent to computing over the union of both inputs.
pub trait Merge {
    /// Merge another partial result into this one
    ///
    /// Returns an error if the two are not computed on the same grid.
    fn merge(&mut self, other: &Self) -> Result<()>;
}
