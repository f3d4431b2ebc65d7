//! Input/output helpers.
//!
//! - exposure discovery + JSON container read/write (`exposure`)
//! - reference profiles and environment configuration (`references`)
//! - drift CSV export and read-back (`export`)

pub mod export;
pub mod exposure;
pub mod references;

pub use export::*;
pub use exposure::*;
pub use references::*;
