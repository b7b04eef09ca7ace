//! # Sample Validation Module
//!
//! This module is the exclusive entry point for user-provided elevation
//! samples. Callers hand over parallel coordinate, elevation and uncertainty
//! arrays; this module validates them against the engine's preconditions and
//! wraps them in a [`SampleSet`] the fitting core can trust.
//!
//! - Failures are assumed to be caller errors. The `DataError` enum is
//!   designed to provide clear, actionable feedback.
//! - Degenerate *content* (e.g. an all-false initial mask) is deliberately
//!   not rejected here: the fit loop reports those cases as valid terminal
//!   states rather than errors.

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// A comprehensive error type for sample validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Column '{column}' has {found} entries, but the x column has {expected}.")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Non-finite values (NaN or infinity) were found in column '{0}'.")]
    NonFiniteValuesFound(&'static str),

    #[error("Per-sample uncertainties must be finite and strictly positive.")]
    NonPositiveSigma,

    #[error("Initial mask has {found} entries, but the sample set has {expected}.")]
    MaskLengthMismatch { expected: usize, found: usize },
}

/// A validated set of elevation samples for one reference location.
///
/// Holds parallel arrays of planar coordinates `x`/`y`, elevations `z` and
/// per-sample uncertainties `sigma`, optionally paired with an initial
/// active-row mask. All arrays are guaranteed to have the same length,
/// `sigma` is guaranteed strictly positive, and every value is finite.
#[derive(Debug, Clone)]
pub struct SampleSet {
    x: Array1<f64>,
    y: Array1<f64>,
    z: Array1<f64>,
    sigma: Array1<f64>,
    initial_mask: Option<Array1<bool>>,
}

impl SampleSet {
    /// Validates and wraps one set of samples.
    pub fn new(
        x: Array1<f64>,
        y: Array1<f64>,
        z: Array1<f64>,
        sigma: Array1<f64>,
    ) -> Result<Self, DataError> {
        let n = x.len();
        for (column, values) in [("y", &y), ("z", &z), ("sigma", &sigma)] {
            if values.len() != n {
                return Err(DataError::LengthMismatch {
                    column,
                    expected: n,
                    found: values.len(),
                });
            }
        }
        for (column, values) in [("x", &x), ("y", &y), ("z", &z)] {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(DataError::NonFiniteValuesFound(column));
            }
        }
        if sigma.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(DataError::NonPositiveSigma);
        }

        Ok(Self {
            x,
            y,
            z,
            sigma,
            initial_mask: None,
        })
    }

    /// Convenience constructor for equally trusted samples: every sigma is 1,
    /// so the fit reduces to ordinary least squares with unscaled residuals.
    pub fn with_unit_sigma(
        x: Array1<f64>,
        y: Array1<f64>,
        z: Array1<f64>,
    ) -> Result<Self, DataError> {
        let sigma = Array1::ones(x.len());
        Self::new(x, y, z, sigma)
    }

    /// Attaches an initial active-row mask, consumed by the first fit
    /// iteration in place of the all-true default.
    pub fn with_initial_mask(mut self, mask: Array1<bool>) -> Result<Self, DataError> {
        if mask.len() != self.len() {
            return Err(DataError::MaskLengthMismatch {
                expected: self.len(),
                found: mask.len(),
            });
        }
        self.initial_mask = Some(mask);
        Ok(self)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when the set holds no samples. An empty set is accepted and
    /// terminates a fit in the no-active-rows state.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Sample x coordinates.
    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    /// Sample y coordinates.
    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    /// Sample elevations.
    pub fn z(&self) -> ArrayView1<'_, f64> {
        self.z.view()
    }

    /// Per-sample uncertainties.
    pub fn sigma(&self) -> ArrayView1<'_, f64> {
        self.sigma.view()
    }

    /// The caller-supplied initial active mask, if any.
    pub fn initial_mask(&self) -> Option<&Array1<bool>> {
        self.initial_mask.as_ref()
    }
}
