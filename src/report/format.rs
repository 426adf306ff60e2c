//! Plain-text tables for plans, allocations and simulations.

use std::collections::BTreeMap;

use crate::app::pipeline::PlanOutput;
use crate::domain::{Allocation, Demand, Vendor, VendorTarget};
use crate::router::Simulation;

/// Format the full plan summary (demand, tier targets, allocation).
pub fn format_plan_summary(plan: &PlanOutput) -> String {
    let mut out = String::new();

    out.push_str("=== vroute - vendor routing plan ===\n");
    out.push_str(&format!("Planning date: {}\n", plan.planning_date));
    out.push_str(&format!(
        "Demand: total={} | packet types={}\n",
        plan.tiers.total_volume,
        plan.demand.len()
    ));
    out.push_str(&format!(
        "Cost: tiers={:.4} | routing={:.4}\n",
        plan.tiers.total_cost, plan.routing.total_cost
    ));

    out.push_str("\nVendor targets:\n");
    out.push_str(&format_targets(&plan.tiers.targets, &plan.tiers.tier_volumes));

    out.push_str("\nAllocation:\n");
    out.push_str(&format_allocation(&plan.routing.allocation, Some(&plan.demand)));

    out
}

/// Format vendor targets, with per-tier units when available.
pub fn format_targets(targets: &BTreeMap<Vendor, VendorTarget>, tier_volumes: &BTreeMap<Vendor, Vec<u64>>) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:<12} {:>12} {:>12} {:>12}  {}", "vendor", "volume", "min_volume", "cost/unit", "tiers"),
    );
    push_row(&mut out, format!("{:-<12} {:-<12} {:-<12} {:-<12}  {:-<5}", "", "", "", "", ""));

    for (vendor, target) in targets {
        let tiers = tier_volumes
            .get(vendor)
            .map(|units| fmt_units(units))
            .unwrap_or_default();
        push_row(
            &mut out,
            format!(
                "{:<12} {:>12} {:>12} {:>12.6}  {}",
                vendor.as_str(),
                target.volume,
                target.min_volume,
                target.cost_per_unit,
                tiers
            ),
        );
    }
    out
}

/// Format per-packet-type fractions, with routed volume when demand is known.
pub fn format_allocation(allocation: &Allocation, demand: Option<&Demand>) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:<16} {:<12} {:>10} {:>12}", "packet_type", "vendor", "fraction", "volume"),
    );
    push_row(&mut out, format!("{:-<16} {:-<12} {:-<10} {:-<12}", "", "", "", ""));

    for (packet_type, shares) in allocation.iter() {
        let total = demand.and_then(|d| d.get(&packet_type)).copied();
        for share in shares {
            let volume = total
                .map(|t| format!("{:.2}", t * share.fraction))
                .unwrap_or_else(|| "-".to_string());
            push_row(
                &mut out,
                format!(
                    "{:<16} {:<12} {:>10.6} {:>12}",
                    packet_type.as_str(),
                    share.vendor.as_str(),
                    share.fraction,
                    volume
                ),
            );
        }
    }
    out
}

/// Format observed vs expected selection frequencies.
pub fn format_simulation(sim: &Simulation) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} (draws={}, max |error|={:.5})\n",
        sim.packet_type,
        sim.draws,
        sim.max_abs_error()
    ));
    push_row(
        &mut out,
        format!("{:<12} {:>12} {:>10} {:>10}", "vendor", "count", "observed", "expected"),
    );
    for (vendor, expected) in &sim.expected {
        push_row(
            &mut out,
            format!(
                "{:<12} {:>12} {:>10.5} {:>10.5}",
                vendor.as_str(),
                sim.counts.get(vendor).copied().unwrap_or(0),
                sim.observed(*vendor),
                expected
            ),
        );
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_units(units: &[u64]) -> String {
    let parts: Vec<String> = units.iter().map(u64::to_string).collect();
    format!("[{}]", parts.join(", "))
}
