//! Solver boundary: model description plus pluggable backends.

pub mod backend;
pub mod model;

pub use backend::*;
pub use model::*;
