//! # Fitted Surface Artifacts
//!
//! A [`FittedSurface`] is the self-contained, persistable outcome of a fit:
//! the polynomial basis plus its coefficient vector. It is what downstream
//! stages carry around to evaluate the reference surface away from the
//! fitting coordinates — at crossing-track locations, on display grids, or
//! in a later run after reloading from disk.
//!
//! Surfaces serialize to a human-readable TOML document.

use crate::basis::{BasisError, PolyBasis};
use crate::fit::{FitContext, FitResult};
use ndarray::{Array, Array1, ArrayView, ArrayView1, Dimension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Custom error type for surface persistence and evaluation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write surface file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML surface file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize surface to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Coefficient vector has {found} entries, but the basis has {expected} terms.")]
    CoefficientLengthMismatch { expected: usize, found: usize },

    #[error("Coefficient mask has {found} entries, but the basis has {expected} terms.")]
    CoefficientMaskMismatch { expected: usize, found: usize },

    #[error("x and y coordinate arrays have different shapes.")]
    CoordinateShapeMismatch,

    #[error(transparent)]
    Basis(#[from] BasisError),
}

/// A fitted reference surface: basis plus coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedSurface {
    basis: PolyBasis,
    coefficients: Array1<f64>,
}

impl FittedSurface {
    /// Pairs a basis with a coefficient vector of matching length.
    pub fn new(basis: PolyBasis, coefficients: Array1<f64>) -> Result<Self, ModelError> {
        if coefficients.len() != basis.len() {
            return Err(ModelError::CoefficientLengthMismatch {
                expected: basis.len(),
                found: coefficients.len(),
            });
        }
        Ok(Self {
            basis,
            coefficients,
        })
    }

    /// Captures the surface fitted by `context`, cloning its basis and the
    /// result's coefficients.
    pub fn from_fit(context: &FitContext, result: &FitResult) -> Self {
        Self {
            basis: context.basis().clone(),
            coefficients: result.coefficients.clone(),
        }
    }

    /// The basis of this surface.
    pub fn basis(&self) -> &PolyBasis {
        &self.basis
    }

    /// The fitted coefficients, one per basis term.
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Evaluates the surface at fresh coordinates of any dimensionality.
    ///
    /// `x` and `y` must share a shape; the returned values carry the same
    /// shape, so a grid of coordinates yields a grid of heights. With
    /// `coeff_mask` supplied, terms whose entry is false are zeroed before
    /// evaluation.
    pub fn evaluate<D>(
        &self,
        x: ArrayView<'_, f64, D>,
        y: ArrayView<'_, f64, D>,
        coeff_mask: Option<&[bool]>,
    ) -> Result<Array<f64, D>, ModelError>
    where
        D: Dimension,
    {
        if x.shape() != y.shape() {
            return Err(ModelError::CoordinateShapeMismatch);
        }
        let coefficients = match coeff_mask {
            None => self.coefficients.clone(),
            Some(mask) => {
                if mask.len() != self.basis.len() {
                    return Err(ModelError::CoefficientMaskMismatch {
                        expected: self.basis.len(),
                        found: mask.len(),
                    });
                }
                Array1::from_iter(
                    self.coefficients
                        .iter()
                        .zip(mask.iter())
                        .map(|(&c, &keep)| if keep { c } else { 0.0 }),
                )
            }
        };

        let flat_x = Array1::from_iter(x.iter().copied());
        let flat_y = Array1::from_iter(y.iter().copied());
        let design = self.basis.design_matrix(flat_x.view(), flat_y.view())?;
        let values = design.dot(&coefficients);
        Ok(Array::from_shape_vec(x.raw_dim(), values.to_vec())
            .expect("value count matches coordinate count"))
    }

    /// Saves the surface to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        log::info!("Saved fitted surface with {} terms to {path}", self.basis.len());
        Ok(())
    }

    /// Loads a surface from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let surface: Self = toml::from_str(&toml_string)?;
        if surface.coefficients.len() != surface.basis.len() {
            return Err(ModelError::CoefficientLengthMismatch {
                expected: surface.basis.len(),
                found: surface.coefficients.len(),
            });
        }
        Ok(surface)
    }
}
