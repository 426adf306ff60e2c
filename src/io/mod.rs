//! Input/output helpers.
//!
//! - YAML eligibility and vendor profiles (`config`)
//! - plan JSON read/write (`plan`)

pub mod config;
pub mod plan;

pub use config::*;
pub use plan::*;
