//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the closed catalogs (`PacketType`, `Vendor`)
//! - vendor pricing configuration (`PriceTier`, `VendorProfile`)
//! - optimization outputs (`VendorTarget`, `Allocation`)

pub mod catalog;
pub mod types;

pub use catalog::*;
pub use types::*;
