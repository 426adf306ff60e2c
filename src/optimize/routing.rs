//! Fractional packet-to-vendor routing.
//!
//! Once every vendor has a target (blended cost + minimum volume), decide what
//! fraction of each packet type goes to each vendor:
//!
//! ```text
//! f[p][v] ∈ [0,1]       (pinned to 0 when v is not eligible for p)
//!
//! minimize  Σ demand[p] · cost[v] · f[p][v]
//!
//! Σ_v f[p][v]            == 1          for every routed packet type
//! Σ_p demand[p] f[p][v]  >= min[v]     for every vendor with a minimum
//! ```
//!
//! The variable table is dense over (packet type × vendor) so the constraint
//! rows line up with the catalog order regardless of eligibility.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::domain::{
    Allocation, Demand, EligibilityMap, PacketType, Vendor, VendorShare, VendorTarget,
};
use crate::error::RoutingError;
use crate::solver::{GoodLpBackend, LinearExpr, LinearModel, Relation, Sense, SolveOutcome, SolverBackend, VarId, VarKind};

/// How far a solver-reported fraction sum may drift from 1 before it is rejected.
pub const SOLVER_SUM_TOLERANCE: f64 = 1e-6;

/// Fractions at or below this are treated as zero.
const FRACTION_FLOOR: f64 = 1e-9;

/// Output of the routing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPlan {
    pub allocation: Allocation,
    /// Demand routed to each vendor (only vendors with targets appear).
    pub vendor_volumes: BTreeMap<Vendor, f64>,
    /// Σ routed volume × vendor cost.
    pub total_cost: f64,
}

/// Route `demand` with the default solver backend.
pub fn route(
    demand: &Demand,
    targets: &BTreeMap<Vendor, VendorTarget>,
    eligibility: &EligibilityMap,
) -> Result<RoutingPlan, RoutingError> {
    route_with(&GoodLpBackend, demand, targets, eligibility)
}

/// Route `demand` using `backend`.
pub fn route_with(
    backend: &dyn SolverBackend,
    demand: &Demand,
    targets: &BTreeMap<Vendor, VendorTarget>,
    eligibility: &EligibilityMap,
) -> Result<RoutingPlan, RoutingError> {
    let routed = routed_packet_types(demand, targets, eligibility)?;

    let total_demand: f64 = routed.iter().map(|p| demand[p]).sum();
    let min_sum: u64 = targets.values().map(|t| t.min_volume).sum();
    if min_sum as f64 > total_demand {
        warn!(min_sum, total_demand, "vendor minimums exceed demand");
        return Err(RoutingError::Infeasible(format!(
            "vendor minimums sum to {min_sum}, above total demand {total_demand}"
        )));
    }

    let vendors: Vec<Vendor> = targets.keys().copied().collect();
    let mut model = LinearModel::new();

    // f[p][v], dense over the vendor universe.
    let mut table: Vec<Vec<VarId>> = Vec::with_capacity(routed.len());
    for &p in &routed {
        let row = vendors
            .iter()
            .map(|&v| {
                let upper = if eligibility.is_eligible(p, v) { 1.0 } else { 0.0 };
                model.add_variable(format!("f_{p}_{v}"), VarKind::Continuous, 0.0, Some(upper))
            })
            .collect();
        table.push(row);
    }

    let mut objective = LinearExpr::new();
    for (row, &p) in table.iter().zip(&routed) {
        for (f, v) in row.iter().zip(&vendors) {
            objective.add_term(*f, demand[&p] * targets[v].cost_per_unit);
        }
    }
    model.set_objective(Sense::Minimize, objective);

    for (row, &p) in table.iter().zip(&routed) {
        model.add_constraint(
            format!("route_all_{p}"),
            LinearExpr::sum(row.iter().copied()),
            Relation::Eq,
            1.0,
        );
    }

    for (col, v) in vendors.iter().enumerate() {
        let target = &targets[v];
        if target.min_volume == 0 {
            continue;
        }
        let mut shipped = LinearExpr::new();
        for (row, &p) in table.iter().zip(&routed) {
            shipped.add_term(row[col], demand[&p]);
        }
        model.add_constraint(format!("min_{v}"), shipped, Relation::Ge, target.min_volume as f64);
    }

    debug!(
        packet_types = routed.len(),
        vendors = vendors.len(),
        constraints = model.constraints().len(),
        "built routing model"
    );

    let solution = match backend.solve(&model) {
        SolveOutcome::Optimal(solution) => solution,
        SolveOutcome::Infeasible => {
            warn!("routing model is infeasible");
            return Err(RoutingError::Infeasible(
                "no routing satisfies vendor minimums with the given eligibility".into(),
            ));
        }
        SolveOutcome::Unbounded => {
            return Err(RoutingError::Solver("routing model reported unbounded".into()));
        }
        SolveOutcome::Failed(message) => return Err(RoutingError::Solver(message)),
    };

    let mut routes = BTreeMap::new();
    for (row, &p) in table.iter().zip(&routed) {
        let raw: Vec<(Vendor, f64)> = eligibility
            .vendors(p)
            .iter()
            .filter_map(|v| {
                let col = vendors.iter().position(|u| u == v)?;
                Some((*v, solution.values[row[col].index()]))
            })
            .collect();
        routes.insert(p, reconcile(p, &raw)?);
    }
    let allocation = Allocation::new(routes)?;

    let mut vendor_volumes: BTreeMap<Vendor, f64> = vendors.iter().map(|v| (*v, 0.0)).collect();
    for (p, shares) in allocation.iter() {
        for share in shares {
            *vendor_volumes.entry(share.vendor).or_default() += demand[&p] * share.fraction;
        }
    }
    let total_cost: f64 = vendor_volumes
        .iter()
        .map(|(v, volume)| volume * targets[v].cost_per_unit)
        .sum();

    info!(
        packet_types = routed.len(),
        total_demand,
        total_cost,
        "routing solved"
    );

    Ok(RoutingPlan {
        allocation,
        vendor_volumes,
        total_cost,
    })
}

/// Packet types that get a route, in catalog order.
///
/// Types with positive demand must have at least one eligible vendor, and every
/// eligible vendor must have a target. Zero-demand types without vendors are
/// skipped.
fn routed_packet_types(
    demand: &Demand,
    targets: &BTreeMap<Vendor, VendorTarget>,
    eligibility: &EligibilityMap,
) -> Result<Vec<PacketType>, RoutingError> {
    let mut routed = Vec::with_capacity(demand.len());
    for (&p, &volume) in demand {
        if !(volume.is_finite() && volume >= 0.0) {
            return Err(RoutingError::config(format!(
                "demand for {p} must be finite and >= 0, got {volume}"
            )));
        }

        let eligible = eligibility.vendors(p);
        if eligible.is_empty() {
            if volume > 0.0 {
                return Err(RoutingError::NoEligibleVendor(p));
            }
            debug!(packet_type = %p, "skipping zero-demand packet type without vendors");
            continue;
        }

        if let Some(missing) = eligible.iter().find(|v| !targets.contains_key(v)) {
            return Err(RoutingError::config(format!(
                "vendor {missing} is eligible for {p} but has no target"
            )));
        }
        routed.push(p);
    }
    Ok(routed)
}

/// Turn raw solver fractions into valid shares for one packet type.
///
/// Clamps to `[0, 1]`, drops near-zero values, checks the sum against
/// [`SOLVER_SUM_TOLERANCE`] and renormalizes so it is exactly 1 up to rounding.
fn reconcile(packet_type: PacketType, raw: &[(Vendor, f64)]) -> Result<Vec<VendorShare>, RoutingError> {
    let kept: Vec<(Vendor, f64)> = raw
        .iter()
        .map(|&(v, f)| (v, f.clamp(0.0, 1.0)))
        .filter(|&(_, f)| f > FRACTION_FLOOR)
        .collect();

    let sum: f64 = kept.iter().map(|(_, f)| f).sum();
    if !sum.is_finite() || (sum - 1.0).abs() > SOLVER_SUM_TOLERANCE {
        return Err(RoutingError::AllocationInvariant { packet_type, sum });
    }

    Ok(kept
        .into_iter()
        .map(|(vendor, f)| VendorShare {
            vendor,
            fraction: (f / sum).min(1.0),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ALLOCATION_TOLERANCE, PriceTier, VendorProfile};
    use crate::optimize::tiers::allocate;

    fn target(min_volume: u64, cost_per_unit: f64) -> VendorTarget {
        VendorTarget {
            volume: 0,
            min_volume,
            cost_per_unit,
        }
    }

    fn eligibility(entries: &[(PacketType, &[Vendor])]) -> EligibilityMap {
        EligibilityMap::new(entries.iter().map(|(p, v)| (*p, v.to_vec())).collect()).unwrap()
    }

    fn demand(entries: &[(PacketType, f64)]) -> Demand {
        entries.iter().copied().collect()
    }

    fn assert_unit_sums(allocation: &Allocation) {
        for (p, shares) in allocation.iter() {
            let sum: f64 = shares.iter().map(|s| s.fraction).sum();
            assert!((sum - 1.0).abs() <= ALLOCATION_TOLERANCE, "{p} sums to {sum}");
        }
    }

    #[test]
    fn two_vendor_scenario_end_to_end() {
        let demand = demand(&[(PacketType::P1, 1000.0), (PacketType::P2, 500.0)]);
        let eligibility = eligibility(&[
            (PacketType::P1, &[Vendor::V1, Vendor::V2]),
            (PacketType::P2, &[Vendor::V1]),
        ]);
        let profiles = vec![
            VendorProfile::new(
                Vendor::V1,
                Some(200),
                None,
                vec![PriceTier { minimum_volume: 0, cost_per_unit: 0.10 }],
            )
            .unwrap(),
            VendorProfile::new(
                Vendor::V2,
                None,
                None,
                vec![PriceTier { minimum_volume: 0, cost_per_unit: 0.08 }],
            )
            .unwrap(),
        ];

        let tiers = allocate(demand.values().sum(), &profiles).unwrap();
        let plan = route(&demand, &tiers.targets, &eligibility).unwrap();

        // P2 alone already keeps V1 above its minimum, so P1 goes entirely to V2.
        assert!((plan.allocation.fraction(PacketType::P1, Vendor::V2) - 1.0).abs() < 1e-9);
        assert!(plan.allocation.fraction(PacketType::P1, Vendor::V1) < 1e-9);
        assert_eq!(plan.allocation.fraction(PacketType::P2, Vendor::V1), 1.0);
        assert_unit_sums(&plan.allocation);

        let expected: f64 = plan
            .vendor_volumes
            .iter()
            .map(|(v, vol)| vol * tiers.targets[v].cost_per_unit)
            .sum();
        assert!((plan.total_cost - expected).abs() < 1e-9);
        assert!((plan.total_cost - (500.0 * 0.10 + 1000.0 * 0.08)).abs() < 1e-6);
    }

    #[test]
    fn minimum_pulls_share_from_cheaper_vendor() {
        let demand = demand(&[(PacketType::P1, 1000.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1, Vendor::V2])]);
        let targets = BTreeMap::from([(Vendor::V1, target(200, 0.10)), (Vendor::V2, target(0, 0.08))]);

        let plan = route(&demand, &targets, &eligibility).unwrap();
        let shares = plan.allocation.shares(PacketType::P1).unwrap();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].vendor, Vendor::V1);
        assert!((shares[0].fraction - 0.2).abs() < 1e-6);
        assert!((shares[1].fraction - 0.8).abs() < 1e-6);
        assert!((plan.vendor_volumes[&Vendor::V1] - 200.0).abs() < 1e-3);
    }

    #[test]
    fn minimums_summing_to_demand_are_met_exactly() {
        let demand = demand(&[(PacketType::P1, 300.0), (PacketType::P2, 200.0)]);
        let eligibility = eligibility(&[
            (PacketType::P1, &[Vendor::V1, Vendor::V2]),
            (PacketType::P2, &[Vendor::V1, Vendor::V2]),
        ]);
        let targets = BTreeMap::from([(Vendor::V1, target(300, 0.05)), (Vendor::V2, target(200, 0.20))]);

        let plan = route(&demand, &targets, &eligibility).unwrap();
        assert!((plan.vendor_volumes[&Vendor::V1] - 300.0).abs() < 1e-3);
        assert!((plan.vendor_volumes[&Vendor::V2] - 200.0).abs() < 1e-3);
        assert_unit_sums(&plan.allocation);
    }

    #[test]
    fn positive_demand_without_vendors_is_an_error() {
        let demand = demand(&[(PacketType::P1, 10.0), (PacketType::P3, 5.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1))]);

        let err = route(&demand, &targets, &eligibility).unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleVendor(PacketType::P3)));
    }

    #[test]
    fn zero_demand_without_vendors_is_skipped() {
        let demand = demand(&[(PacketType::P1, 10.0), (PacketType::P3, 0.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1))]);

        let plan = route(&demand, &targets, &eligibility).unwrap();
        assert!(plan.allocation.shares(PacketType::P3).is_none());
        assert_eq!(plan.allocation.fraction(PacketType::P1, Vendor::V1), 1.0);
    }

    #[test]
    fn minimums_above_demand_are_infeasible() {
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1, Vendor::V2])]);
        let targets = BTreeMap::from([(Vendor::V1, target(80, 0.1)), (Vendor::V2, target(80, 0.1))]);

        assert!(matches!(
            route(&demand, &targets, &eligibility),
            Err(RoutingError::Infeasible(_))
        ));
    }

    #[test]
    fn minimum_unreachable_through_eligibility_is_infeasible() {
        // V2 has a minimum but carries nothing.
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1)), (Vendor::V2, target(10, 0.1))]);

        assert!(matches!(
            route(&demand, &targets, &eligibility),
            Err(RoutingError::Infeasible(_))
        ));
    }

    #[test]
    fn eligible_vendor_without_target_is_a_config_error() {
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1, Vendor::V3])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1))]);

        assert!(matches!(
            route(&demand, &targets, &eligibility),
            Err(RoutingError::ConfigValidation(_))
        ));
    }

    #[test]
    fn shares_follow_eligibility_order() {
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V3, Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(40, 0.2)), (Vendor::V3, target(0, 0.1))]);

        let plan = route(&demand, &targets, &eligibility).unwrap();
        let order: Vec<Vendor> = plan
            .allocation
            .shares(PacketType::P1)
            .unwrap()
            .iter()
            .map(|s| s.vendor)
            .collect();
        assert_eq!(order, vec![Vendor::V3, Vendor::V1]);
    }

    #[test]
    fn identical_inputs_give_bit_identical_allocations() {
        let demand = demand(&[
            (PacketType::P1, 700.0),
            (PacketType::P2, 300.0),
            (PacketType::P3, 250.0),
        ]);
        let eligibility = eligibility(&[
            (PacketType::P1, &[Vendor::V1, Vendor::V2, Vendor::V3]),
            (PacketType::P2, &[Vendor::V2, Vendor::V3]),
            (PacketType::P3, &[Vendor::V1, Vendor::V3]),
        ]);
        let targets = BTreeMap::from([
            (Vendor::V1, target(150, 0.09)),
            (Vendor::V2, target(400, 0.11)),
            (Vendor::V3, target(0, 0.07)),
        ]);

        let first = route(&demand, &targets, &eligibility).unwrap();
        let second = route(&demand, &targets, &eligibility).unwrap();
        assert_eq!(first.allocation, second.allocation);
        assert_unit_sums(&first.allocation);
    }

    /// Returns fixed values for every `f_*` variable, regardless of the model.
    struct FixedBackend(f64);

    impl SolverBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn solve(&self, model: &LinearModel) -> SolveOutcome {
            let values: Vec<f64> = model.variables().iter().map(|v| v.upper.unwrap_or(0.0) * self.0).collect();
            let objective = model.objective().evaluate(&values);
            SolveOutcome::Optimal(crate::solver::Solution { values, objective })
        }
    }

    #[test]
    fn near_unit_sums_are_renormalized() {
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1))]);

        let plan = route_with(&FixedBackend(1.0 - 1e-8), &demand, &targets, &eligibility).unwrap();
        assert_eq!(plan.allocation.fraction(PacketType::P1, Vendor::V1), 1.0);
    }

    #[test]
    fn drifting_sums_violate_the_invariant() {
        let demand = demand(&[(PacketType::P1, 100.0)]);
        let eligibility = eligibility(&[(PacketType::P1, &[Vendor::V1])]);
        let targets = BTreeMap::from([(Vendor::V1, target(0, 0.1))]);

        let err = route_with(&FixedBackend(0.97), &demand, &targets, &eligibility).unwrap_err();
        assert!(matches!(err, RoutingError::AllocationInvariant { packet_type: PacketType::P1, .. }));
    }
}
