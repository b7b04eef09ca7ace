//! # Polynomial Basis Construction
//!
//! This module defines the monomial basis used as the predictor set for
//! reference-surface fitting, together with the evaluation of that basis at
//! sample coordinates (the design matrix).
//!
//! A basis is an ordered list of `(exponent_x, exponent_y)` pairs plus a
//! coordinate center and scale. Centering and scaling are applied before
//! exponentiation so that fits over ground coordinates spanning hundreds of
//! meters stay well conditioned.

use itertools::iproduct;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comprehensive error type for basis construction and evaluation.
#[derive(Error, Debug)]
pub enum BasisError {
    #[error("Basis has zero terms; at least one exponent pair is required.")]
    EmptyBasis,

    #[error("Coordinate scale must be finite and strictly positive, but was {0}.")]
    InvalidScale(f64),

    #[error("Coordinate arrays have mismatched lengths: x has {x_len}, y has {y_len}.")]
    CoordinateLengthMismatch { x_len: usize, y_len: usize },
}

/// An immutable two-dimensional monomial basis.
///
/// Each term k contributes the predictor
/// `((x - x0)/scale)^p_k * ((y - y0)/scale)^q_k` where `(p_k, q_k)` is the
/// k-th exponent pair. Once constructed, the basis never changes; the fit
/// context that owns it caches the evaluated design matrix for its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyBasis {
    exponents: Vec<(u32, u32)>,
    center: (f64, f64),
    scale: f64,
    skip_constant: bool,
}

impl PolyBasis {
    /// Builds the triangular basis implied by per-axis maximum degrees.
    ///
    /// All pairs `(i, j)` with `i <= degree_x`, `j <= degree_y` and
    /// `i + j <= max(degree_x, degree_y)` are enumerated. This is a
    /// triangular truncation, not a full tensor product: a (2, 2) request
    /// yields the six terms of a full quadratic surface, not nine.
    ///
    /// The result is sorted by `exponent_x` ascending, ties broken by
    /// `exponent_y` ascending, so the basis is deterministic regardless of
    /// enumeration order. When `skip_constant` is set the `(0, 0)` term is
    /// dropped, which is how a caller fits a correction surface on top of an
    /// already-known mean height.
    pub fn from_degrees(
        degree_x: u32,
        degree_y: u32,
        center: (f64, f64),
        scale: f64,
        skip_constant: bool,
    ) -> Result<Self, BasisError> {
        let max_degree = degree_x.max(degree_y);
        let mut exponents: Vec<(u32, u32)> = iproduct!(0..=degree_x, 0..=degree_y)
            .filter(|&(i, j)| i + j <= max_degree)
            .filter(|&(i, j)| !(skip_constant && i == 0 && j == 0))
            .collect();
        exponents.sort_unstable();

        Self::from_exponents(exponents, center, scale, skip_constant)
    }

    /// Builds a basis from an explicit, caller-supplied exponent list.
    ///
    /// The pairs are used verbatim: no sorting, no degree truncation. This
    /// supports rebuilding the exact basis of a previously fitted surface,
    /// e.g. one loaded from a saved [`FittedSurface`](crate::model::FittedSurface).
    pub fn from_exponents(
        exponents: Vec<(u32, u32)>,
        center: (f64, f64),
        scale: f64,
        skip_constant: bool,
    ) -> Result<Self, BasisError> {
        if exponents.is_empty() {
            return Err(BasisError::EmptyBasis);
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(BasisError::InvalidScale(scale));
        }

        Ok(Self {
            exponents,
            center,
            scale,
            skip_constant,
        })
    }

    /// The ordered exponent pairs of this basis.
    pub fn exponents(&self) -> &[(u32, u32)] {
        &self.exponents
    }

    /// Number of basis terms.
    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    /// True when the basis holds no terms. Unreachable through the public
    /// constructors; present for completeness of the container API.
    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    /// The coordinate center `(x0, y0)`.
    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// The per-axis coordinate scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Whether the basis was constructed without a constant term.
    pub fn skip_constant(&self) -> bool {
        self.skip_constant
    }

    /// Position of the `(0, 0)` constant term, if the basis contains one.
    pub fn constant_index(&self) -> Option<usize> {
        self.exponents.iter().position(|&(p, q)| p == 0 && q == 0)
    }

    /// Evaluates the basis at the given coordinates, producing the design
    /// matrix.
    ///
    /// Entry `(i, k)` is `((x_i - x0)/scale)^p_k * ((y_i - y0)/scale)^q_k`.
    /// The matrix must be rebuilt whenever the coordinate set changes;
    /// mixing design matrices from different coordinate sets into one fit is
    /// a caller error this function cannot detect.
    pub fn design_matrix(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array2<f64>, BasisError> {
        if x.len() != y.len() {
            return Err(BasisError::CoordinateLengthMismatch {
                x_len: x.len(),
                y_len: y.len(),
            });
        }

        let mut matrix = Array2::zeros((x.len(), self.exponents.len()));
        for (k, &(p, q)) in self.exponents.iter().enumerate() {
            for (i, (&xi, &yi)) in x.iter().zip(y.iter()).enumerate() {
                let u = (xi - self.center.0) / self.scale;
                let v = (yi - self.center.1) / self.scale;
                matrix[[i, k]] = u.powi(p as i32) * v.powi(q as i32);
            }
        }
        Ok(matrix)
    }
}
