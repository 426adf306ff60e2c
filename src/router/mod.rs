//! Runtime vendor selection.
//!
//! A [`Router`] is built once per planning period from an [`Allocation`] and
//! then queried per request. For every packet type it keeps the vendors in
//! allocation order together with their cumulative fractions:
//!
//! ```text
//! fractions   0.2   0.5   0.3
//! cumulative  0.2   0.7   1.0
//! sample      [0, 0.2] → v0   (0.2, 0.7] → v1   (0.7, 1.0] → v2
//! ```
//!
//! Feeding uniformly distributed samples reproduces the allocation fractions
//! in the long run. The tables are never mutated after construction; a new
//! allocation means a new router, published through [`RouterHandle`].

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::domain::{Allocation, PacketType, Vendor, VendorShare};
use crate::error::RoutingError;

pub mod simulate;

pub use simulate::{Simulation, simulate};

#[derive(Debug, Clone, PartialEq)]
struct VendorTable {
    vendors: Vec<Vendor>,
    cumulative: Vec<f64>,
}

impl VendorTable {
    fn from_shares(shares: &[VendorShare]) -> Self {
        let mut vendors = Vec::with_capacity(shares.len());
        let mut cumulative = Vec::with_capacity(shares.len());
        let mut running = 0.0;
        for share in shares {
            running += share.fraction;
            vendors.push(share.vendor);
            // Allocation sums may exceed 1 by the tolerance; keep the table
            // non-decreasing and capped at 1.
            cumulative.push(running.min(1.0));
        }
        // Absorb floating-point drift so the table always ends at exactly 1.
        if let Some(last) = cumulative.last_mut() {
            *last = 1.0;
        }
        Self { vendors, cumulative }
    }

    /// Vendor at the smallest index whose cumulative fraction is `>= sample`,
    /// or the last vendor when no such index exists.
    fn pick(&self, sample: f64) -> Vendor {
        let idx = self.cumulative.partition_point(|&c| c < sample);
        match self.vendors.get(idx) {
            Some(vendor) => *vendor,
            None => self.vendors[self.vendors.len() - 1],
        }
    }
}

/// Immutable cumulative-fraction index over an allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Router {
    tables: BTreeMap<PacketType, VendorTable>,
}

impl Router {
    pub fn build(allocation: &Allocation) -> Self {
        let tables: BTreeMap<PacketType, VendorTable> = allocation
            .iter()
            .map(|(p, shares)| (p, VendorTable::from_shares(shares)))
            .collect();
        info!(packet_types = tables.len(), "router built");
        Self { tables }
    }

    /// Choose a vendor for one request of `packet_type`.
    ///
    /// `sample` should be uniform in `[0, 1)`; `1.0` is accepted and maps to
    /// the last vendor. Packet types without a route and samples outside
    /// `[0, 1]` are errors.
    pub fn select(&self, packet_type: PacketType, sample: f64) -> Result<Vendor, RoutingError> {
        let table = self
            .tables
            .get(&packet_type)
            .ok_or(RoutingError::UnknownRoute(packet_type))?;
        if !(0.0..=1.0).contains(&sample) {
            return Err(RoutingError::InvalidSample(sample));
        }
        Ok(table.pick(sample))
    }

    /// Cumulative fractions for `packet_type`, in vendor order.
    pub fn cumulative(&self, packet_type: PacketType) -> Option<&[f64]> {
        self.tables.get(&packet_type).map(|t| t.cumulative.as_slice())
    }

    /// Vendors for `packet_type`, in table order.
    pub fn vendors(&self, packet_type: PacketType) -> Option<&[Vendor]> {
        self.tables.get(&packet_type).map(|t| t.vendors.as_slice())
    }

    pub fn packet_types(&self) -> impl Iterator<Item = PacketType> + '_ {
        self.tables.keys().copied()
    }
}

/// Shared slot holding the router of the current planning period.
///
/// Readers take a cheap `Arc` clone and keep using it even if a new router is
/// published meanwhile. Publishing swaps the pointer; no table is ever edited
/// in place.
#[derive(Debug)]
pub struct RouterHandle {
    current: RwLock<Arc<Router>>,
}

impl RouterHandle {
    pub fn new(router: Router) -> Self {
        Self {
            current: RwLock::new(Arc::new(router)),
        }
    }

    pub fn current(&self) -> Arc<Router> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active router, returning the previous one.
    pub fn publish(&self, router: Router) -> Arc<Router> {
        let next = Arc::new(router);
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(packet_types = next.tables.len(), "publishing router");
        std::mem::replace(&mut *slot, next)
    }

    pub fn select(&self, packet_type: PacketType, sample: f64) -> Result<Vendor, RoutingError> {
        self.current().select(packet_type, sample)
    }
}
