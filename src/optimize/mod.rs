//! Offline optimization stages.
//!
//! Responsibilities:
//!
//! - split total volume across vendor price tiers (`tiers`)
//! - split each packet type's demand across eligible vendors (`routing`)

pub mod routing;
pub mod tiers;

pub use routing::{RoutingPlan, route, route_with};
pub use tiers::{TierAllocation, allocate, allocate_with};
