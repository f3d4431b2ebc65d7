//! Linear least squares via SVD.
//!
//! Each Levenberg–Marquardt iteration solves a small, tall linear problem
//!
//! ```text
//! minimize || [J; sqrt(λ) D] δ - [-r; 0] ||^2
//! ```
//!
//! which is the damped normal-equation step written without forming `JᵀJ`.
//! The parameter dimension is 3, so SVD cost is negligible and it copes with
//! the rank-deficient Jacobians of a vanishing line (amplitude → 0 makes the
//! center and width columns zero).
//!
//! Note: nalgebra's `QR::solve` is for square systems and panics on tall ones.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser singular-value cutoffs if the strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
