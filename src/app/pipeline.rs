//! Shared planning pipeline used by the `plan` command.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! forecast -> demand -> tier targets -> routing fractions -> router
//!
//! The CLI can then focus on presentation and persistence.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::domain::{Demand, EligibilityMap, PacketType, VendorProfile};
use crate::error::Result;
use crate::forecast::{Forecast, load_forecast};
use crate::io::{PlanFile, TOOL_NAME, load_eligibility, load_vendor_profiles};
use crate::optimize::{RoutingPlan, TierAllocation, allocate, route};
use crate::router::Router;

/// Inputs of one planning run.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub vendors_path: PathBuf,
    pub packets_path: PathBuf,
    pub forecast_path: PathBuf,
    pub percentile: Option<f64>,
    pub adjustments: BTreeMap<PacketType, f64>,
    pub planning_date: NaiveDate,
}

/// All computed outputs of a single planning run.
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub planning_date: NaiveDate,
    pub demand: Demand,
    pub tiers: TierAllocation,
    pub routing: RoutingPlan,
    pub router: Router,
}

impl PlanOutput {
    pub fn to_plan_file(&self, generated_at: DateTime<Utc>) -> PlanFile {
        PlanFile {
            tool: TOOL_NAME.to_string(),
            planning_date: self.planning_date,
            generated_at,
            targets: self.tiers.targets.clone(),
            allocation: self.routing.allocation.clone(),
            total_cost: self.routing.total_cost,
        }
    }
}

/// Load every input named in `config` and run the pipeline.
pub fn run_plan(config: &PlanConfig) -> Result<PlanOutput> {
    // Configuration errors surface before any solver runs.
    let profiles = load_vendor_profiles(&config.vendors_path)?;
    let eligibility = load_eligibility(&config.packets_path)?;
    let forecast = load_forecast(&config.forecast_path)?;

    run_plan_with_inputs(
        config.planning_date,
        &forecast,
        config.percentile,
        &config.adjustments,
        &profiles,
        &eligibility,
    )
}

/// Run the pipeline on already-loaded inputs.
pub fn run_plan_with_inputs(
    planning_date: NaiveDate,
    forecast: &Forecast,
    percentile: Option<f64>,
    adjustments: &BTreeMap<PacketType, f64>,
    profiles: &[VendorProfile],
    eligibility: &EligibilityMap,
) -> Result<PlanOutput> {
    let demand = forecast.demand(percentile, adjustments)?;
    plan_demand(planning_date, demand, profiles, eligibility)
}

/// Optimize a planning period for a known demand map.
pub fn plan_demand(
    planning_date: NaiveDate,
    demand: Demand,
    profiles: &[VendorProfile],
    eligibility: &EligibilityMap,
) -> Result<PlanOutput> {
    let total: f64 = demand.values().sum();
    info!(%planning_date, total_demand = total, packet_types = demand.len(), "planning");

    let tiers = allocate(total, profiles)?;
    let routing = route(&demand, &tiers.targets, eligibility)?;
    let router = Router::build(&routing.allocation);

    info!(
        tier_cost = tiers.total_cost,
        routing_cost = routing.total_cost,
        "plan complete"
    );

    Ok(PlanOutput {
        planning_date,
        demand,
        tiers,
        routing,
        router,
    })
}
