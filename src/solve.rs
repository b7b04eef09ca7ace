//! # Weighted Least-Squares Solving
//!
//! One numerical concern lives here: solving the weighted linear
//! least-squares problem for a column-reduced design matrix. The weight
//! vector is applied as a diagonal scaling of both the design matrix and the
//! target, so the solve minimizes `sum_i (w_i * (row_i . coef - target_i))^2`.
//!
//! The solve goes through an SVD-backed least-squares routine rather than
//! forming and inverting the normal equations: after row masking, surviving
//! columns can still be close to collinear, and the normal-equations route
//! squares the condition number.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::LeastSquaresSvd;
use ndarray_linalg::error::LinalgError;

/// Solves the weighted least-squares problem for the active submatrix.
///
/// `design`, `target` and `weights` must already be restricted to the active
/// rows (and `design` to the active columns); the caller backfills zeros for
/// inactive columns afterwards. Weights are multiplicative (typically
/// `1/sigma`), not variances.
///
/// A failure here is an internal-consistency defect: degenerate columns are
/// filtered out before the solve, so the reduced system is expected to be
/// solvable for any real sample distribution.
pub fn weighted_least_squares(
    design: ArrayView2<f64>,
    target: ArrayView1<f64>,
    weights: ArrayView1<f64>,
) -> Result<Array1<f64>, LinalgError> {
    let weighted_design = &design * &weights.insert_axis(Axis(1));
    let weighted_target = &target * &weights;
    let result = weighted_design.least_squares(&weighted_target)?;
    Ok(result.solution)
}
