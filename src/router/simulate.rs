//! Monte-Carlo check that a router reproduces its allocation.
//!
//! Draws are split into fixed-size chunks; each chunk gets its own RNG seeded
//! from `(seed, chunk index)`, so the result does not depend on how rayon
//! schedules the chunks.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{PacketType, Vendor};
use crate::error::{Result, RoutingError};

use super::Router;

const CHUNK_DRAWS: u64 = 16_384;

/// Observed selection counts for one packet type.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub packet_type: PacketType,
    pub draws: u64,
    pub counts: BTreeMap<Vendor, u64>,
    /// Fractions implied by the router's cumulative table.
    pub expected: BTreeMap<Vendor, f64>,
}

impl Simulation {
    pub fn observed(&self, vendor: Vendor) -> f64 {
        if self.draws == 0 {
            return 0.0;
        }
        self.counts.get(&vendor).copied().unwrap_or(0) as f64 / self.draws as f64
    }

    /// Largest absolute gap between observed and expected fractions.
    pub fn max_abs_error(&self) -> f64 {
        self.expected
            .iter()
            .map(|(vendor, expected)| (self.observed(*vendor) - expected).abs())
            .fold(0.0, f64::max)
    }
}

fn chunk_seed(seed: u64, chunk: u64) -> u64 {
    seed ^ chunk.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Route `draws` uniform samples for `packet_type` and tally the vendors.
pub fn simulate(router: &Router, packet_type: PacketType, draws: u64, seed: u64) -> Result<Simulation> {
    let (vendors, cumulative) = router
        .vendors(packet_type)
        .zip(router.cumulative(packet_type))
        .ok_or(RoutingError::UnknownRoute(packet_type))?;

    let mut expected = BTreeMap::new();
    let mut previous = 0.0;
    for (vendor, c) in vendors.iter().zip(cumulative) {
        expected.insert(*vendor, c - previous);
        previous = *c;
    }

    let chunks = draws.div_ceil(CHUNK_DRAWS);
    let partials: Vec<BTreeMap<Vendor, u64>> = (0..chunks)
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * CHUNK_DRAWS;
            let len = CHUNK_DRAWS.min(draws - start);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, chunk));
            let mut counts = BTreeMap::new();
            for _ in 0..len {
                let vendor = router.select(packet_type, rng.gen_range(0.0..1.0))?;
                *counts.entry(vendor).or_insert(0u64) += 1;
            }
            Ok::<_, RoutingError>(counts)
        })
        .collect::<Result<_>>()?;

    let mut counts: BTreeMap<Vendor, u64> = vendors.iter().map(|v| (*v, 0)).collect();
    for partial in partials {
        for (vendor, n) in partial {
            *counts.entry(vendor).or_insert(0) += n;
        }
    }

    let simulation = Simulation {
        packet_type,
        draws,
        counts,
        expected,
    };
    debug!(
        packet_type = %packet_type,
        draws,
        max_abs_error = simulation.max_abs_error(),
        "simulation finished"
    );
    Ok(simulation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Allocation, VendorShare};

    fn router() -> Router {
        let mut routes = BTreeMap::new();
        routes.insert(
            PacketType::P3,
            vec![
                VendorShare { vendor: Vendor::V1, fraction: 0.25 },
                VendorShare { vendor: Vendor::V3, fraction: 0.75 },
            ],
        );
        Router::build(&Allocation::new(routes).unwrap())
    }

    #[test]
    fn long_run_frequencies_match_fractions() {
        let sim = simulate(&router(), PacketType::P3, 200_000, 7).unwrap();
        assert_eq!(sim.counts.values().sum::<u64>(), 200_000);
        assert!((sim.expected[&Vendor::V1] - 0.25).abs() < 1e-12);
        assert!(sim.max_abs_error() < 0.01, "error {}", sim.max_abs_error());
        assert!(!sim.counts.contains_key(&Vendor::V2));
    }

    #[test]
    fn same_seed_same_counts() {
        let a = simulate(&router(), PacketType::P3, 50_000, 42).unwrap();
        let b = simulate(&router(), PacketType::P3, 50_000, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_draws_is_empty_tally() {
        let sim = simulate(&router(), PacketType::P3, 0, 1).unwrap();
        assert_eq!(sim.counts.values().sum::<u64>(), 0);
        assert_eq!(sim.observed(Vendor::V1), 0.0);
    }

    #[test]
    fn unknown_packet_type_is_rejected() {
        assert!(matches!(
            simulate(&router(), PacketType::P5, 10, 1),
            Err(RoutingError::UnknownRoute(PacketType::P5))
        ));
    }
}
