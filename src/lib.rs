//! Robust polynomial reference-surface fitting for repeat-track altimetry.
//!
//! Elevation samples gathered over nominally the same ground location at
//! different times are separated into a smooth static surface and per-sample
//! residuals: a monomial basis is evaluated at the sample coordinates, a
//! weighted least-squares problem is solved on the currently trusted rows,
//! and a robust re-weighting loop rejects outliers until the reduced
//! chi-square stabilizes.

#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod data;
pub mod fit;
pub mod model;
pub mod solve;

pub use basis::{BasisError, PolyBasis};
pub use data::{DataError, SampleSet};
pub use fit::{FitContext, FitError, FitOptions, FitResult, FitStatus};
pub use model::{FittedSurface, ModelError};
