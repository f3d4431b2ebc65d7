//! ThAr line fitting.
//!
//! Responsibilities:
//!
//! - cut a pixel window around the expected line position (`window`)
//! - re-center on the empirical peak and fit a Gaussian (`fitter`)
//! - express the fit relative to the reference profile (`compare_to_reference`)

pub mod fitter;
pub mod window;

pub use fitter::*;
pub use window::*;
