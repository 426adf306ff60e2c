//! Read/write plan JSON files.
//!
//! A plan is the portable result of one planning period: vendor targets from
//! the tier stage plus the per-packet-type allocation the router is built
//! from. Reading a plan re-validates the allocation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Allocation, Vendor, VendorTarget};
use crate::error::{Result, RoutingError};

pub const TOOL_NAME: &str = "vroute";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub tool: String,
    pub planning_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub targets: BTreeMap<Vendor, VendorTarget>,
    pub allocation: Allocation,
    /// Routing objective: Σ routed volume × vendor cost.
    pub total_cost: f64,
}

/// Write a plan JSON file.
pub fn write_plan_json(path: &Path, plan: &PlanFile) -> Result<()> {
    let file = File::create(path).map_err(|e| RoutingError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), plan).map_err(|e| RoutingError::parse(path, e))?;
    info!(path = %path.display(), planning_date = %plan.planning_date, "wrote plan");
    Ok(())
}

/// Read a plan JSON file.
pub fn read_plan_json(path: &Path) -> Result<PlanFile> {
    let file = File::open(path).map_err(|e| RoutingError::io(path, e))?;
    let plan: PlanFile = serde_json::from_reader(file).map_err(|e| RoutingError::parse(path, e))?;
    info!(
        path = %path.display(),
        planning_date = %plan.planning_date,
        packet_types = plan.allocation.packet_types().count(),
        "read plan"
    );
    Ok(plan)
}
