//! `apogee-thar` library crate.
//!
//! The binary (`thar`) is a thin wrapper around this library so that:
//!
//! - the line fitter is testable without spawning processes
//! - the fitter can be driven from other monitors (e.g. a quick-reduction daemon)

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
