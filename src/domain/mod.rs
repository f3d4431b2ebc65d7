//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the line model and fit outputs (`GaussianProfile`, `FitResult`, `Comparison`)
//! - detector data (`Frame`, `SpectralWindow`, `Chip`, `Dither`)
//! - exposure metadata and the reference set (`ExposureHeader`, `ReferenceSet`)
//! - Modified Julian Date helpers (`mjd`)

pub mod mjd;
pub mod types;

pub use mjd::*;
pub use types::*;
