//! Tiered-price volume allocation.
//!
//! Given a total volume and every vendor's price schedule, decide how many
//! whole units each vendor carries in each of its tiers so that total cost is
//! minimal.
//!
//! Model, per vendor `i` and tier `j` (tier thresholds `m[j]`):
//!
//! ```text
//! x[i][j] ∈ ℤ≥0        units billed at tier j
//! y[i][j] ∈ {0,1}      tier j is active
//!
//! minimize  Σ c[i][j] x[i][j]
//!
//! Σ x[i][j]                      == total
//! min[i] <= Σ_j x[i][j] <= max[i]
//! x[i][j]   <= cap[j] y[i][j]            cap[0] = m[1], cap[j] = m[j+1] - m[j]
//! y[i][j]   <= y[i][j-1]
//! x[i][j-1] >= cap[j-1] y[i][j]          lower tier saturated before the next one fills
//! x[i][0]   >= m[0] y[i][0]              first-tier floor
//! ```
//!
//! Volume discounts make the cheaper tiers sit *above* the expensive ones, so
//! capacity bounds alone would let the solver skip straight to the cheapest
//! band. The activation indicators forbid that.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::domain::{Vendor, VendorProfile, VendorTarget};
use crate::error::RoutingError;
use crate::solver::{GoodLpBackend, LinearExpr, LinearModel, Relation, Sense, SolveOutcome, SolverBackend, VarId, VarKind};

/// Output of the tier allocation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TierAllocation {
    /// Whole units that were allocated (input volume rounded to units).
    pub total_volume: u64,
    pub targets: BTreeMap<Vendor, VendorTarget>,
    /// Units per tier, in tier order.
    pub tier_volumes: BTreeMap<Vendor, Vec<u64>>,
    /// Objective value: Σ units × tier cost.
    pub total_cost: f64,
}

struct TierVars {
    x: Vec<VarId>,
}

/// Allocate `total_volume` across `vendors` with the default solver backend.
pub fn allocate(total_volume: f64, vendors: &[VendorProfile]) -> Result<TierAllocation, RoutingError> {
    allocate_with(&GoodLpBackend, total_volume, vendors)
}

/// Allocate `total_volume` across `vendors` using `backend`.
pub fn allocate_with(
    backend: &dyn SolverBackend,
    total_volume: f64,
    vendors: &[VendorProfile],
) -> Result<TierAllocation, RoutingError> {
    if !(total_volume.is_finite() && total_volume >= 0.0) {
        return Err(RoutingError::config(format!(
            "total volume must be finite and >= 0, got {total_volume}"
        )));
    }
    let total = total_volume.round() as u64;

    for (idx, profile) in vendors.iter().enumerate() {
        if vendors[..idx].iter().any(|p| p.vendor() == profile.vendor()) {
            return Err(RoutingError::config(format!(
                "vendor {} has more than one profile",
                profile.vendor()
            )));
        }
    }

    check_volume_bounds(total_volume, vendors)?;

    let mut model = LinearModel::new();
    let vars: Vec<TierVars> = vendors
        .iter()
        .map(|profile| add_vendor(&mut model, profile, total))
        .collect();

    model.add_constraint(
        "total_volume",
        LinearExpr::sum(vars.iter().flat_map(|v| v.x.iter().copied())),
        Relation::Eq,
        total as f64,
    );

    let mut objective = LinearExpr::new();
    for (profile, v) in vendors.iter().zip(&vars) {
        for (tier, x) in profile.price_tiers().iter().zip(&v.x) {
            objective.add_term(*x, tier.cost_per_unit);
        }
    }
    model.set_objective(Sense::Minimize, objective);

    debug!(
        total_volume = total,
        vendors = vendors.len(),
        variables = model.variables().len(),
        constraints = model.constraints().len(),
        "built tier allocation model"
    );

    let solution = match backend.solve(&model) {
        SolveOutcome::Optimal(solution) => solution,
        SolveOutcome::Infeasible => {
            warn!(total_volume = total, "tier allocation is infeasible");
            return Err(RoutingError::Infeasible(format!(
                "no tier assignment places {total} units within vendor bounds"
            )));
        }
        SolveOutcome::Unbounded => {
            return Err(RoutingError::Solver("tier allocation reported unbounded".into()));
        }
        SolveOutcome::Failed(message) => return Err(RoutingError::Solver(message)),
    };

    let mut targets = BTreeMap::new();
    let mut tier_volumes = BTreeMap::new();
    let mut allocated = 0u64;
    let mut total_cost = 0.0;

    for (profile, v) in vendors.iter().zip(&vars) {
        let units: Vec<u64> = v
            .x
            .iter()
            .map(|x| solution.values[x.index()].max(0.0) as u64)
            .collect();
        let target = summarize_vendor(profile, &units);
        debug!(
            vendor = %profile.vendor(),
            volume = target.volume,
            min_volume = target.min_volume,
            cost_per_unit = target.cost_per_unit,
            "vendor target"
        );

        allocated += target.volume;
        total_cost += tier_cost(profile, &units);
        targets.insert(profile.vendor(), target);
        tier_volumes.insert(profile.vendor(), units);
    }

    if allocated != total {
        return Err(RoutingError::Solver(format!(
            "solver allocated {allocated} units, expected {total}"
        )));
    }

    info!(total_volume = total, total_cost, vendors = targets.len(), "tier allocation solved");

    Ok(TierAllocation {
        total_volume: total,
        targets,
        tier_volumes,
        total_cost,
    })
}

/// Reject volume bounds that cannot possibly cover `total_volume` before
/// building a model.
///
/// Bounds are compared with the unrounded volume, so a minimum that exceeds
/// real demand by less than one unit is still infeasible. Sums are taken in
/// `u128` so configured bounds near `u64::MAX` cannot overflow.
fn check_volume_bounds(total_volume: f64, vendors: &[VendorProfile]) -> Result<(), RoutingError> {
    if vendors.is_empty() && total_volume > 0.0 {
        return Err(RoutingError::Infeasible(format!("no vendors to carry {total_volume} units")));
    }

    let min_sum: u128 = vendors
        .iter()
        .filter_map(|p| p.minimum_volume())
        .map(u128::from)
        .sum();
    if min_sum as f64 > total_volume {
        return Err(RoutingError::Infeasible(format!(
            "vendor minimums sum to {min_sum}, above total volume {total_volume}"
        )));
    }

    let max_sum: Option<u128> = vendors
        .iter()
        .map(|p| p.maximum_volume().map(u128::from))
        .sum();
    if let Some(max_sum) = max_sum {
        if (max_sum as f64) < total_volume {
            return Err(RoutingError::Infeasible(format!(
                "vendor maximums sum to {max_sum}, below total volume {total_volume}"
            )));
        }
    }

    Ok(())
}

fn add_vendor(model: &mut LinearModel, profile: &VendorProfile, total: u64) -> TierVars {
    let vendor = profile.vendor();
    let tiers = profile.price_tiers();
    let vendor_cap = profile.maximum_volume().map_or(total, |max| max.min(total));

    let mut x = Vec::with_capacity(tiers.len());
    let mut y = Vec::with_capacity(tiers.len());

    for j in 0..tiers.len() {
        let cap = profile.tier_capacity(j).map_or(vendor_cap, |c| c.min(vendor_cap));
        let xj = model.add_variable(format!("x_{vendor}_{j}"), VarKind::Integer, 0.0, Some(cap as f64));
        let yj = model.add_variable(format!("y_{vendor}_{j}"), VarKind::Binary, 0.0, Some(1.0));

        model.add_constraint(
            format!("tier_cap_{vendor}_{j}"),
            LinearExpr::new().term(xj, 1.0).term(yj, -(cap as f64)),
            Relation::Le,
            0.0,
        );

        if j == 0 && tiers[0].minimum_volume > 0 {
            model.add_constraint(
                format!("tier_floor_{vendor}"),
                LinearExpr::new().term(xj, 1.0).term(yj, -(tiers[0].minimum_volume as f64)),
                Relation::Ge,
                0.0,
            );
        }

        if j > 0 {
            let prev_cap = profile.tier_capacity(j - 1).unwrap_or(0) as f64;
            model.add_constraint(
                format!("tier_order_{vendor}_{j}"),
                LinearExpr::new().term(yj, 1.0).term(y[j - 1], -1.0),
                Relation::Le,
                0.0,
            );
            model.add_constraint(
                format!("tier_fill_{vendor}_{j}"),
                LinearExpr::new().term(x[j - 1], 1.0).term(yj, -prev_cap),
                Relation::Ge,
                0.0,
            );
        }

        x.push(xj);
        y.push(yj);
    }

    let vendor_total = LinearExpr::sum(x.iter().copied());
    if let Some(min) = profile.minimum_volume() {
        model.add_constraint(format!("min_{vendor}"), vendor_total.clone(), Relation::Ge, min as f64);
    }
    if let Some(max) = profile.maximum_volume() {
        model.add_constraint(format!("max_{vendor}"), vendor_total, Relation::Le, max as f64);
    }

    TierVars { x }
}

fn tier_cost(profile: &VendorProfile, units: &[u64]) -> f64 {
    profile
        .price_tiers()
        .iter()
        .zip(units)
        .map(|(tier, &n)| n as f64 * tier.cost_per_unit)
        .sum()
}

/// Collapse per-tier units into a [`VendorTarget`].
///
/// `min_volume` is the larger of the vendor's own minimum and the threshold of
/// the highest tier that carries volume; `cost_per_unit` is the blended cost of
/// the allocated units (first-tier cost when nothing is allocated).
fn summarize_vendor(profile: &VendorProfile, units: &[u64]) -> VendorTarget {
    let tiers = profile.price_tiers();
    let volume: u64 = units.iter().sum();

    let tier_floor = units
        .iter()
        .rposition(|&n| n > 0)
        .map_or(0, |j| tiers[j].minimum_volume);
    let min_volume = profile.minimum_volume().unwrap_or(0).max(tier_floor);

    let cost_per_unit = if volume == 0 {
        tiers[0].cost_per_unit
    } else {
        tier_cost(profile, units) / volume as f64
    };

    VendorTarget {
        volume,
        min_volume,
        cost_per_unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceTier;

    fn tier(minimum_volume: u64, cost_per_unit: f64) -> PriceTier {
        PriceTier {
            minimum_volume,
            cost_per_unit,
        }
    }

    fn flat(vendor: Vendor, cost: f64, min: Option<u64>, max: Option<u64>) -> VendorProfile {
        VendorProfile::new(vendor, min, max, vec![tier(0, cost)]).unwrap()
    }

    #[test]
    fn cheapest_vendor_takes_volume_above_minimums() {
        let vendors = vec![
            flat(Vendor::V1, 0.10, Some(200), None),
            flat(Vendor::V2, 0.08, None, None),
        ];
        let out = allocate(1500.0, &vendors).unwrap();

        assert_eq!(out.total_volume, 1500);
        assert_eq!(out.targets[&Vendor::V1].volume, 200);
        assert_eq!(out.targets[&Vendor::V1].min_volume, 200);
        assert_eq!(out.targets[&Vendor::V2].volume, 1300);
        assert!((out.total_cost - (200.0 * 0.10 + 1300.0 * 0.08)).abs() < 1e-9);
    }

    #[test]
    fn minimums_summing_to_total_are_met_exactly() {
        let vendors = vec![
            flat(Vendor::V1, 0.05, Some(300), None),
            flat(Vendor::V2, 0.20, Some(200), None),
        ];
        let out = allocate(500.0, &vendors).unwrap();
        assert_eq!(out.targets[&Vendor::V1].volume, 300);
        assert_eq!(out.targets[&Vendor::V2].volume, 200);
    }

    #[test]
    fn lower_tier_is_saturated_before_discount_tier_fills() {
        let discounted =
            VendorProfile::new(Vendor::V1, None, None, vec![tier(0, 0.10), tier(100, 0.05)]).unwrap();
        let vendors = vec![discounted, flat(Vendor::V2, 0.08, None, None)];

        let out = allocate(300.0, &vendors).unwrap();
        // V1 all: 100 * 0.10 + 200 * 0.05 = 20.0 beats V2 all (24.0).
        assert_eq!(out.tier_volumes[&Vendor::V1], vec![100, 200]);
        assert_eq!(out.targets[&Vendor::V2].volume, 0);
        assert!((out.total_cost - 20.0).abs() < 1e-9);

        let v1 = out.targets[&Vendor::V1];
        assert_eq!(v1.min_volume, 100);
        assert!((v1.cost_per_unit - 20.0 / 300.0).abs() < 1e-12);
    }

    #[test]
    fn discount_not_worth_it_for_small_volume() {
        let discounted =
            VendorProfile::new(Vendor::V1, None, None, vec![tier(0, 0.10), tier(100, 0.05)]).unwrap();
        let vendors = vec![discounted, flat(Vendor::V2, 0.08, None, None)];

        // V1 all: 10 + 2.5 = 12.5, V2 all: 12.0, splits are worse.
        let out = allocate(150.0, &vendors).unwrap();
        assert_eq!(out.targets[&Vendor::V2].volume, 150);
        assert_eq!(out.tier_volumes[&Vendor::V1], vec![0, 0]);
    }

    #[test]
    fn blended_cost_reproduces_objective() {
        let a = VendorProfile::new(
            Vendor::V1,
            None,
            Some(400),
            vec![tier(0, 0.12), tier(50, 0.09), tier(200, 0.07)],
        )
        .unwrap();
        let b = VendorProfile::new(Vendor::V2, Some(100), None, vec![tier(0, 0.11), tier(300, 0.06)]).unwrap();
        let c = flat(Vendor::V3, 0.095, None, Some(150));

        let out = allocate(700.0, &[a, b, c]).unwrap();
        let blended: f64 = out
            .targets
            .values()
            .map(|t| t.volume as f64 * t.cost_per_unit)
            .sum();
        assert!((blended - out.total_cost).abs() < 1e-9);
        assert!(out.targets[&Vendor::V1].volume <= 400);
        assert!(out.targets[&Vendor::V2].volume >= 100);
        assert!(out.targets[&Vendor::V3].volume <= 150);
    }

    #[test]
    fn first_tier_floor_blocks_small_allocations() {
        let floored = VendorProfile::new(Vendor::V1, None, None, vec![tier(50, 0.01)]).unwrap();
        let vendors = vec![floored, flat(Vendor::V2, 0.10, None, None)];

        let out = allocate(30.0, &vendors).unwrap();
        assert_eq!(out.targets[&Vendor::V1].volume, 0);
        assert_eq!(out.targets[&Vendor::V2].volume, 30);
    }

    #[test]
    fn infeasible_bounds_are_terminal() {
        let capped = vec![
            flat(Vendor::V1, 0.1, None, Some(100)),
            flat(Vendor::V2, 0.1, None, Some(100)),
        ];
        assert!(matches!(allocate(300.0, &capped), Err(RoutingError::Infeasible(_))));

        let floors = vec![flat(Vendor::V1, 0.1, Some(400), None)];
        assert!(matches!(allocate(300.0, &floors), Err(RoutingError::Infeasible(_))));
    }

    #[test]
    fn bounds_are_checked_against_unrounded_volume() {
        // 500.5 rounds to 501, but minimums of 501 still exceed real demand.
        let floors = vec![
            flat(Vendor::V1, 0.1, Some(300), None),
            flat(Vendor::V2, 0.1, Some(201), None),
        ];
        assert!(matches!(allocate(500.5, &floors), Err(RoutingError::Infeasible(_))));
        assert!(allocate(501.0, &floors).is_ok());

        // 500.4 rounds to 500, but caps of 500 cannot carry it.
        let capped = vec![
            flat(Vendor::V1, 0.1, None, Some(250)),
            flat(Vendor::V2, 0.1, None, Some(250)),
        ];
        assert!(matches!(allocate(500.4, &capped), Err(RoutingError::Infeasible(_))));
        assert_eq!(allocate(500.0, &capped).unwrap().total_volume, 500);
    }

    #[test]
    fn huge_configured_bounds_do_not_overflow() {
        let floors = vec![
            flat(Vendor::V1, 0.1, Some(u64::MAX - 1), None),
            flat(Vendor::V2, 0.1, Some(u64::MAX - 1), None),
        ];
        assert!(matches!(allocate(10.0, &floors), Err(RoutingError::Infeasible(_))));

        let capped = vec![
            flat(Vendor::V1, 0.1, None, Some(u64::MAX)),
            flat(Vendor::V2, 0.2, None, Some(u64::MAX)),
        ];
        let out = allocate(10.0, &capped).unwrap();
        assert_eq!(out.targets[&Vendor::V1].volume, 10);
    }

    #[test]
    fn duplicate_profiles_are_rejected() {
        let vendors = vec![flat(Vendor::V1, 0.1, None, None), flat(Vendor::V1, 0.2, None, None)];
        assert!(matches!(allocate(10.0, &vendors), Err(RoutingError::ConfigValidation(_))));
    }

    #[test]
    fn invalid_total_volume_is_rejected() {
        let vendors = vec![flat(Vendor::V1, 0.1, None, None)];
        assert!(allocate(-1.0, &vendors).is_err());
        assert!(allocate(f64::NAN, &vendors).is_err());
    }

    #[test]
    fn identical_inputs_give_identical_allocations() {
        let vendors = vec![
            flat(Vendor::V1, 0.10, None, None),
            flat(Vendor::V2, 0.10, None, None),
            VendorProfile::new(Vendor::V3, None, None, vec![tier(0, 0.11), tier(500, 0.09)]).unwrap(),
        ];
        let first = allocate(1234.0, &vendors).unwrap();
        let second = allocate(1234.0, &vendors).unwrap();
        assert_eq!(first, second);
    }

    struct FailingBackend;

    impl SolverBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn solve(&self, _model: &LinearModel) -> SolveOutcome {
            SolveOutcome::Failed("backend unavailable".into())
        }
    }

    #[test]
    fn backend_failures_surface_as_solver_errors() {
        let vendors = vec![flat(Vendor::V1, 0.1, None, None)];
        let err = allocate_with(&FailingBackend, 10.0, &vendors).unwrap_err();
        assert!(matches!(err, RoutingError::Solver(ref m) if m == "backend unavailable"));
    }
}
