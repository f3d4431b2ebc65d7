//! Numerical utilities: linear least squares and the Levenberg–Marquardt solver.

pub mod levmar;
pub mod ols;

pub use levmar::*;
pub use ols::*;
