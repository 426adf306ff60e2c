//! `vendor-routing` library crate.
//!
//! The binary (`vroute`) is a thin wrapper around this library so that:
//!
//! - the optimization and routing core is testable without spawning processes
//! - a long-running service can embed the router directly
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod io;
pub mod optimize;
pub mod report;
pub mod router;
pub mod solver;
