//! Reporting utilities: formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the optimization code stays free of presentation concerns
//! - output changes are localized

pub mod format;

pub use format::*;
