//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - built from configuration files at load time
//! - passed between the two optimization stages
//! - exported to a plan file and reloaded by the router

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{PacketType, Vendor};
use crate::error::RoutingError;

/// Tolerance within which an allocation's fractions must sum to 1.
pub const ALLOCATION_TOLERANCE: f64 = 1e-9;

/// Expected demand volume per packet type.
pub type Demand = BTreeMap<PacketType, f64>;

/// One band of a vendor's volume pricing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceTier {
    pub minimum_volume: u64,
    pub cost_per_unit: f64,
}

/// Pricing schedule and volume bounds of one vendor.
///
/// Constructed through [`VendorProfile::new`], which enforces:
/// - at least one tier
/// - strictly increasing tier `minimum_volume`
/// - finite, positive `cost_per_unit`
/// - `minimum_volume <= maximum_volume` when both are set
/// - a maximum that leaves room for the first tier's floor
#[derive(Debug, Clone, PartialEq)]
pub struct VendorProfile {
    vendor: Vendor,
    minimum_volume: Option<u64>,
    maximum_volume: Option<u64>,
    price_tiers: Vec<PriceTier>,
}

impl VendorProfile {
    pub fn new(
        vendor: Vendor,
        minimum_volume: Option<u64>,
        maximum_volume: Option<u64>,
        price_tiers: Vec<PriceTier>,
    ) -> Result<Self, RoutingError> {
        let Some(first) = price_tiers.first() else {
            return Err(RoutingError::config(format!("{vendor}: price_tiers must not be empty")));
        };

        for (idx, tier) in price_tiers.iter().enumerate() {
            if !(tier.cost_per_unit.is_finite() && tier.cost_per_unit > 0.0) {
                return Err(RoutingError::config(format!(
                    "{vendor}: tier {idx} cost_per_unit must be finite and > 0, got {}",
                    tier.cost_per_unit
                )));
            }
        }

        for (idx, pair) in price_tiers.windows(2).enumerate() {
            if pair[1].minimum_volume <= pair[0].minimum_volume {
                return Err(RoutingError::config(format!(
                    "{vendor}: tier minimum_volume must be strictly increasing (tier {} has {}, tier {} has {})",
                    idx,
                    pair[0].minimum_volume,
                    idx + 1,
                    pair[1].minimum_volume
                )));
            }
        }

        if let (Some(min), Some(max)) = (minimum_volume, maximum_volume) {
            if min > max {
                return Err(RoutingError::config(format!(
                    "{vendor}: minimum_volume {min} exceeds maximum_volume {max}"
                )));
            }
        }

        if let Some(max) = maximum_volume {
            if max > 0 && max < first.minimum_volume {
                return Err(RoutingError::config(format!(
                    "{vendor}: maximum_volume {max} is below the first tier floor {}",
                    first.minimum_volume
                )));
            }
        }

        Ok(Self {
            vendor,
            minimum_volume,
            maximum_volume,
            price_tiers,
        })
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn minimum_volume(&self) -> Option<u64> {
        self.minimum_volume
    }

    pub fn maximum_volume(&self) -> Option<u64> {
        self.maximum_volume
    }

    pub fn price_tiers(&self) -> &[PriceTier] {
        &self.price_tiers
    }

    /// Number of units tier `idx` can hold before the next tier starts.
    ///
    /// Tier 0 covers `[0, m1)`, tier `j` covers `[mj, mj+1)`. The last tier is
    /// unbounded and returns `None`.
    pub fn tier_capacity(&self, idx: usize) -> Option<u64> {
        let next = self.price_tiers.get(idx + 1)?;
        if idx == 0 {
            Some(next.minimum_volume)
        } else {
            Some(next.minimum_volume - self.price_tiers[idx].minimum_volume)
        }
    }
}

/// Per-vendor output of the tier allocation stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VendorTarget {
    /// Units allocated to the vendor.
    pub volume: u64,
    /// Volume the vendor must keep receiving for its price to hold.
    pub min_volume: u64,
    /// Blended cost of the allocated volume.
    pub cost_per_unit: f64,
}

/// Which vendors may carry each packet type, in configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibilityMap {
    entries: BTreeMap<PacketType, Vec<Vendor>>,
}

impl EligibilityMap {
    pub fn new(entries: BTreeMap<PacketType, Vec<Vendor>>) -> Result<Self, RoutingError> {
        for (packet_type, vendors) in &entries {
            for (idx, vendor) in vendors.iter().enumerate() {
                if vendors[..idx].contains(vendor) {
                    return Err(RoutingError::config(format!(
                        "{packet_type}: vendor {vendor} listed more than once"
                    )));
                }
            }
        }
        Ok(Self { entries })
    }

    /// Eligible vendors for `packet_type` (empty if the type is not configured).
    pub fn vendors(&self, packet_type: PacketType) -> &[Vendor] {
        self.entries.get(&packet_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_eligible(&self, packet_type: PacketType, vendor: Vendor) -> bool {
        self.vendors(packet_type).contains(&vendor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PacketType, &[Vendor])> {
        self.entries.iter().map(|(p, v)| (*p, v.as_slice()))
    }
}

/// Fraction of one packet type routed to one vendor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VendorShare {
    pub vendor: Vendor,
    pub fraction: f64,
}

/// Per-packet-type split of demand across vendors.
///
/// Every packet type carries a non-empty, ordered list of shares with
/// fractions in `(0, 1]` summing to 1 within [`ALLOCATION_TOLERANCE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<PacketType, Vec<VendorShare>>",
    into = "BTreeMap<PacketType, Vec<VendorShare>>"
)]
pub struct Allocation {
    routes: BTreeMap<PacketType, Vec<VendorShare>>,
}

impl Allocation {
    pub fn new(routes: BTreeMap<PacketType, Vec<VendorShare>>) -> Result<Self, RoutingError> {
        for (packet_type, shares) in &routes {
            if shares.is_empty() {
                return Err(RoutingError::config(format!(
                    "{packet_type}: allocation has no vendors"
                )));
            }
            for (idx, share) in shares.iter().enumerate() {
                if !(share.fraction.is_finite() && share.fraction > 0.0 && share.fraction <= 1.0) {
                    return Err(RoutingError::config(format!(
                        "{packet_type}: fraction for {} must be in (0, 1], got {}",
                        share.vendor, share.fraction
                    )));
                }
                if shares[..idx].iter().any(|s| s.vendor == share.vendor) {
                    return Err(RoutingError::config(format!(
                        "{packet_type}: vendor {} appears more than once",
                        share.vendor
                    )));
                }
            }
            let sum: f64 = shares.iter().map(|s| s.fraction).sum();
            if (sum - 1.0).abs() > ALLOCATION_TOLERANCE {
                return Err(RoutingError::AllocationInvariant {
                    packet_type: *packet_type,
                    sum,
                });
            }
        }
        Ok(Self { routes })
    }

    pub fn shares(&self, packet_type: PacketType) -> Option<&[VendorShare]> {
        self.routes.get(&packet_type).map(Vec::as_slice)
    }

    /// Fraction of `packet_type` routed to `vendor` (0 when not routed).
    pub fn fraction(&self, packet_type: PacketType, vendor: Vendor) -> f64 {
        self.shares(packet_type)
            .and_then(|shares| shares.iter().find(|s| s.vendor == vendor))
            .map(|s| s.fraction)
            .unwrap_or(0.0)
    }

    pub fn packet_types(&self) -> impl Iterator<Item = PacketType> + '_ {
        self.routes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PacketType, &[VendorShare])> {
        self.routes.iter().map(|(p, s)| (*p, s.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl TryFrom<BTreeMap<PacketType, Vec<VendorShare>>> for Allocation {
    type Error = RoutingError;

    fn try_from(value: BTreeMap<PacketType, Vec<VendorShare>>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Allocation> for BTreeMap<PacketType, Vec<VendorShare>> {
    fn from(value: Allocation) -> Self {
        value.routes
    }
}
