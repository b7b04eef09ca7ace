//! # Iterative Robust Surface Fitting
//!
//! This module owns the fit loop: repeated weighted least-squares solves,
//! outlier masking driven by a caller-supplied robust scale estimator, and
//! convergence tracking via reduced chi-square.
//!
//! The loop's state transitions (active-row mask, previous chi-square) are
//! explicit local variables of [`FitContext::fit`]; the context itself is
//! immutable after construction, so independent reference points can be
//! fitted on independent threads without shared mutable state.

use crate::basis::{BasisError, PolyBasis};
use crate::data::SampleSet;
use crate::solve;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// The terminal state of a fit.
///
/// Degenerate terminations are not errors: they signal "this sample cloud
/// could not be refined further", which callers detect and skip without
/// exception machinery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStatus {
    /// The reduced chi-square stabilized, or dropped below the acceptance
    /// threshold.
    Converged,
    /// The active-row mask emptied out; the reduced chi-square is NaN.
    NoActiveRows,
    /// Active rows no longer outnumber active columns; the result is frozen
    /// at the last computed coefficients.
    InsufficientDegreesOfFreedom,
    /// The iteration budget ran out before the chi-square stabilized.
    MaxIterationsReached,
}

/// Named fitting parameters.
///
/// The defaults reproduce the classical repeat-track configuration: a single
/// solve with no outlier editing, a 3-sigma rejection threshold, and the
/// 0.01 / 1.0 chi-square stopping rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Upper bound on solve iterations.
    pub max_iterations: usize,
    /// Floor for the robust scale estimate when recomputing the outlier
    /// threshold; with a degenerate scale estimate the threshold collapses
    /// to `outlier_multiplier * min_sigma`.
    pub min_sigma: f64,
    /// Multiplier applied to the robust scale when rejecting outliers.
    pub outlier_multiplier: f64,
    /// Convergence tolerance on the change in reduced chi-square between
    /// iterations.
    pub chi2_tolerance: f64,
    /// Reduced chi-square below which the fit is accepted outright.
    pub chi2_acceptable: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1,
            min_sigma: 0.0,
            outlier_multiplier: 3.0,
            chi2_tolerance: 0.01,
            chi2_acceptable: 1.0,
        }
    }
}

/// The immutable outcome of one fit invocation.
///
/// # Fields
///
/// * `coefficients`: one entry per basis term; entries for columns that were
///   inactive in the final solve are exactly zero.
/// * `residuals`: `z - fitted` over **all** samples, masked or not. NaN when
///   no solve ever ran.
/// * `reduced_chi2`: weighted sum of squared residuals over the active rows
///   divided by the degrees of freedom; NaN when undefined (no active rows,
///   or termination before the first complete iteration).
/// * `mask`: the active-row set used in the final solve, full sample length.
/// * `degrees_of_freedom`: active rows minus active columns in the final
///   solve; zero until a solve has run, and may be non-positive when the
///   fit terminated for lack of redundancy.
/// * `status`: why the loop stopped.
/// * `iterations`: number of solves performed.
#[derive(Clone, Debug)]
pub struct FitResult {
    pub coefficients: Array1<f64>,
    pub residuals: Array1<f64>,
    pub reduced_chi2: f64,
    pub mask: Array1<bool>,
    pub degrees_of_freedom: i64,
    pub status: FitStatus,
    pub iterations: usize,
}

/// A comprehensive error type for fit and evaluation failures.
///
/// Everything here is a caller contract violation except [`FitError::SolveFailed`],
/// which indicates the column-activity filter let a truly singular system
/// through — an internal defect, not a recoverable data condition.
#[derive(Error, Debug)]
pub enum FitError {
    #[error("Sample set has {found} samples, but the design matrix was built for {expected}.")]
    SampleCountMismatch { expected: usize, found: usize },

    #[error("Coefficient vector has {found} entries, but the basis has {expected} terms.")]
    CoefficientLengthMismatch { expected: usize, found: usize },

    #[error("Coefficient mask has {found} entries, but the basis has {expected} terms.")]
    CoefficientMaskMismatch { expected: usize, found: usize },

    #[error("Weighted least-squares solve failed on the column-filtered system: {0}")]
    SolveFailed(#[from] ndarray_linalg::error::LinalgError),

    #[error(transparent)]
    Basis(#[from] BasisError),
}

/// An immutable fit context: a polynomial basis plus the design matrix
/// evaluated at one fixed set of sample coordinates.
///
/// The context is built once per reference location and reused across the
/// fit and any number of evaluation calls on the same coordinates. Fitting
/// samples gathered at different coordinates requires a new context.
#[derive(Debug, Clone)]
pub struct FitContext {
    basis: PolyBasis,
    design: Array2<f64>,
}

impl FitContext {
    /// Builds and caches the design matrix for the sample coordinates.
    pub fn new(basis: PolyBasis, samples: &SampleSet) -> Result<Self, FitError> {
        let design = basis.design_matrix(samples.x(), samples.y())?;
        Ok(Self { basis, design })
    }

    /// The basis this context was built with.
    pub fn basis(&self) -> &PolyBasis {
        &self.basis
    }

    /// The cached design matrix, one row per sample, one column per term.
    pub fn design(&self) -> ArrayView2<'_, f64> {
        self.design.view()
    }

    /// Fits the reference surface to `samples` with iterative outlier
    /// rejection.
    ///
    /// `scale_estimator` supplies the robust spread statistic used to set
    /// the rejection threshold; it receives the scaled residuals of the
    /// currently active rows and must return a non-finite value (rather
    /// than panic) on degenerate input, which this loop maps to zero.
    ///
    /// Per iteration:
    /// 1. terminate in [`FitStatus::NoActiveRows`] if the mask is empty;
    /// 2. keep the columns that vary across the active rows, always forcing
    ///    the constant column when the basis carries one;
    /// 3. solve the weighted system on the active rows and columns with
    ///    weights `1/sigma`, backfilling zeros for inactive columns;
    /// 4. recompute residuals over all samples and the reduced chi-square
    ///    over the active rows, terminating in
    ///    [`FitStatus::InsufficientDegreesOfFreedom`] when the system has no
    ///    redundancy left;
    /// 5. stop once the chi-square stabilizes or is already acceptable,
    ///    otherwise re-mask every sample against
    ///    `outlier_multiplier * max(robust_scale, min_sigma)` and continue.
    pub fn fit<F>(
        &self,
        samples: &SampleSet,
        options: &FitOptions,
        scale_estimator: F,
    ) -> Result<FitResult, FitError>
    where
        F: Fn(ArrayView1<f64>) -> f64,
    {
        let n = samples.len();
        if n != self.design.nrows() {
            return Err(FitError::SampleCountMismatch {
                expected: self.design.nrows(),
                found: n,
            });
        }

        let timer = Instant::now();
        let z = samples.z();
        let sigma_inv = samples.sigma().mapv(|s| 1.0 / s);
        let constant_index = if self.basis.skip_constant() {
            None
        } else {
            self.basis.constant_index()
        };

        let mut mask = match samples.initial_mask() {
            Some(m) => m.clone(),
            None => Array1::from_elem(n, true),
        };
        // The mask actually used in the most recent solve; returned as-is.
        let mut rows = mask.clone();
        let mut coefficients = Array1::zeros(self.basis.len());
        let mut residuals = Array1::from_elem(n, f64::NAN);
        let mut reduced_chi2 = f64::NAN;
        // Sentinel large enough that the first iteration cannot satisfy the
        // chi-square-delta stopping rule.
        let mut previous_chi2 = 2.0 * n as f64;
        let mut degrees_of_freedom: i64 = 0;
        let mut iterations = 0usize;
        let mut status = FitStatus::MaxIterationsReached;

        for iteration in 0..options.max_iterations {
            rows.assign(&mask);
            let active_rows: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter_map(|(i, &keep)| keep.then_some(i))
                .collect();
            if active_rows.is_empty() {
                reduced_chi2 = f64::NAN;
                status = FitStatus::NoActiveRows;
                break;
            }

            let col_mask = internal::active_columns(&self.design, &rows, constant_index);
            let active_cols: Vec<usize> = col_mask
                .iter()
                .enumerate()
                .filter_map(|(j, &keep)| keep.then_some(j))
                .collect();

            let sub_design = self
                .design
                .select(Axis(0), &active_rows)
                .select(Axis(1), &active_cols);
            let sub_target = z.select(Axis(0), &active_rows);
            let sub_weights = sigma_inv.select(Axis(0), &active_rows);
            let solution = solve::weighted_least_squares(
                sub_design.view(),
                sub_target.view(),
                sub_weights.view(),
            )?;
            iterations = iteration + 1;

            coefficients.fill(0.0);
            for (k, &j) in active_cols.iter().enumerate() {
                coefficients[j] = solution[k];
            }
            residuals = &z - &self.design.dot(&coefficients);
            let scaled = &residuals * &sigma_inv;

            degrees_of_freedom = active_rows.len() as i64 - active_cols.len() as i64;
            if degrees_of_freedom <= 0 {
                // Even-determined or worse; no further improvement is
                // expected. The chi-square keeps its previous value.
                status = FitStatus::InsufficientDegreesOfFreedom;
                break;
            }

            let weighted_ss: f64 = active_rows.iter().map(|&i| scaled[i] * scaled[i]).sum();
            let chi2 = weighted_ss / degrees_of_freedom as f64;
            let delta = (previous_chi2 - chi2).abs();
            reduced_chi2 = chi2;
            previous_chi2 = chi2;
            log::debug!(
                "iteration {iteration}: {}/{} active rows, {}/{} active columns, reduced chi2 {chi2:.6}",
                active_rows.len(),
                n,
                active_cols.len(),
                self.basis.len()
            );

            if delta < options.chi2_tolerance || chi2 < options.chi2_acceptable {
                status = FitStatus::Converged;
                break;
            }

            let active_scaled = scaled.select(Axis(0), &active_rows);
            let mut spread = scale_estimator(active_scaled.view());
            if !spread.is_finite() {
                spread = 0.0;
            }
            let threshold = options.outlier_multiplier * spread.max(options.min_sigma);
            mask = scaled.mapv(|r| r.abs() < threshold);
        }

        log::debug!(
            "fit finished: {status:?} after {iterations} iteration(s) [{:.2?}]",
            timer.elapsed()
        );

        Ok(FitResult {
            coefficients,
            residuals,
            reduced_chi2,
            mask: rows,
            degrees_of_freedom,
            status,
            iterations,
        })
    }

    /// Evaluates the surface on the cached design matrix.
    ///
    /// With `coeff_mask` supplied, terms whose mask entry is false are
    /// zeroed before the product, e.g. to report only the constant part of
    /// the trend with the slope terms excluded. Without a mask, the result
    /// is exactly `design . coefficients`.
    pub fn evaluate(
        &self,
        coefficients: ArrayView1<f64>,
        coeff_mask: Option<&[bool]>,
    ) -> Result<Array1<f64>, FitError> {
        if coefficients.len() != self.basis.len() {
            return Err(FitError::CoefficientLengthMismatch {
                expected: self.basis.len(),
                found: coefficients.len(),
            });
        }
        match coeff_mask {
            None => Ok(self.design.dot(&coefficients)),
            Some(mask) => {
                if mask.len() != self.basis.len() {
                    return Err(FitError::CoefficientMaskMismatch {
                        expected: self.basis.len(),
                        found: mask.len(),
                    });
                }
                let masked = Array1::from_iter(
                    coefficients
                        .iter()
                        .zip(mask.iter())
                        .map(|(&c, &keep)| if keep { c } else { 0.0 }),
                );
                Ok(self.design.dot(&masked))
            }
        }
    }
}

/// Internal module for the column-activity heuristic.
mod internal {
    use ndarray::{Array1, Array2};

    /// Marks the columns that vary across the active rows.
    ///
    /// A column whose max-min spread over the active subset is zero is
    /// either collinear with the constant term or uninformative for this
    /// subset, and would make the reduced system singular. The constant
    /// column itself is exempt: it never varies, yet it stays meaningful,
    /// so it is forced active whenever the basis carries one.
    ///
    /// This is a runtime degeneracy heuristic, not a rank computation; see
    /// DESIGN.md for the trade-off.
    pub(super) fn active_columns(
        design: &Array2<f64>,
        row_mask: &Array1<bool>,
        constant_index: Option<usize>,
    ) -> Vec<bool> {
        let mut active = vec![false; design.ncols()];
        for (j, column) in design.columns().into_iter().enumerate() {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for (i, &value) in column.iter().enumerate() {
                if row_mask[i] {
                    min = min.min(value);
                    max = max.max(value);
                }
            }
            active[j] = max - min > 0.0;
        }
        if let Some(j) = constant_index {
            active[j] = true;
        }
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn quad_samples() -> SampleSet {
        // z = 1 + 2x + 3y on the unit square corners.
        SampleSet::with_unit_sigma(
            array![0.0, 1.0, 0.0, 1.0],
            array![0.0, 0.0, 1.0, 1.0],
            array![1.0, 3.0, 4.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn active_columns_follow_row_subset() {
        let design = array![
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
        ];
        // Restricted to the first two rows, column 1 no longer varies.
        let rows = array![true, true, false, false];
        let active = internal::active_columns(&design, &rows, Some(0));
        assert_eq!(active, vec![true, false, true]);
    }

    #[test]
    fn constant_column_is_forced_only_when_present() {
        let design = array![[1.0, 0.0], [1.0, 0.0]];
        let rows = array![true, true];
        assert_eq!(
            internal::active_columns(&design, &rows, Some(0)),
            vec![true, false]
        );
        // Without a constant index nothing is forced.
        assert_eq!(
            internal::active_columns(&design, &rows, None),
            vec![false, false]
        );
    }

    #[test]
    fn context_rejects_foreign_sample_counts() {
        let basis = PolyBasis::from_degrees(1, 1, (0.0, 0.0), 1.0, false).unwrap();
        let ctx = FitContext::new(basis, &quad_samples()).unwrap();
        let other =
            SampleSet::with_unit_sigma(array![0.0], array![0.0], array![1.0]).unwrap();
        match ctx
            .fit(&other, &FitOptions::default(), |_| f64::NAN)
            .unwrap_err()
        {
            FitError::SampleCountMismatch { expected, found } => {
                assert_eq!(expected, 4);
                assert_eq!(found, 1);
            }
            other => panic!("Expected SampleCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn evaluate_checks_lengths() {
        let basis = PolyBasis::from_degrees(1, 1, (0.0, 0.0), 1.0, false).unwrap();
        let ctx = FitContext::new(basis, &quad_samples()).unwrap();
        assert!(matches!(
            ctx.evaluate(array![1.0, 2.0].view(), None).unwrap_err(),
            FitError::CoefficientLengthMismatch { expected: 3, found: 2 }
        ));
        assert!(matches!(
            ctx.evaluate(array![1.0, 2.0, 3.0].view(), Some(&[true, false]))
                .unwrap_err(),
            FitError::CoefficientMaskMismatch { expected: 3, found: 2 }
        ));
    }

    #[test]
    fn zero_iterations_returns_the_initial_state() {
        let basis = PolyBasis::from_degrees(1, 1, (0.0, 0.0), 1.0, false).unwrap();
        let samples = quad_samples();
        let ctx = FitContext::new(basis, &samples).unwrap();
        let options = FitOptions {
            max_iterations: 0,
            ..FitOptions::default()
        };
        let result = ctx.fit(&samples, &options, |_| f64::NAN).unwrap();
        assert_eq!(result.status, FitStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 0);
        assert!(result.reduced_chi2.is_nan());
        assert!(result.residuals.iter().all(|r| r.is_nan()));
        assert!(result.coefficients.iter().all(|&c| c == 0.0));
    }
}
