//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - runs the planning pipeline or replays a saved plan
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, PlanArgs, SelectArgs, SimulateArgs};
use crate::error::RoutingError;
use crate::router::{Router, simulate};

pub mod pipeline;

const DEFAULT_LOG_FILTER: &str = "vendor_routing=info";

/// Entry point for the `vroute` binary.
pub fn run() -> Result<(), RoutingError> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Plan(args) => handle_plan(args),
        Command::Select(args) => handle_select(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Logs go to stderr so stdout stays pipeable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn plan_config_from_args(args: &PlanArgs) -> pipeline::PlanConfig {
    pipeline::PlanConfig {
        vendors_path: args.vendors.clone(),
        packets_path: args.packets.clone(),
        forecast_path: args.forecast.clone(),
        percentile: args.percentile,
        adjustments: args.adjustments.iter().copied().collect(),
        planning_date: args.date.unwrap_or_else(|| chrono::Utc::now().date_naive()),
    }
}

fn handle_plan(args: PlanArgs) -> Result<(), RoutingError> {
    let config = plan_config_from_args(&args);
    let plan = pipeline::run_plan(&config)?;

    println!("{}", crate::report::format_plan_summary(&plan));

    if let Some(path) = &args.export {
        let file = plan.to_plan_file(chrono::Utc::now());
        crate::io::write_plan_json(path, &file)?;
    }
    Ok(())
}

fn handle_select(args: SelectArgs) -> Result<(), RoutingError> {
    let plan = crate::io::read_plan_json(&args.plan)?;
    let router = Router::build(&plan.allocation);
    let vendor = router.select(args.packet_type, args.sample)?;
    println!("{vendor}");
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), RoutingError> {
    let plan = crate::io::read_plan_json(&args.plan)?;
    let router = Router::build(&plan.allocation);

    let packet_types: Vec<_> = match args.packet_type {
        Some(p) => vec![p],
        None => router.packet_types().collect(),
    };
    for packet_type in packet_types {
        let sim = simulate(&router, packet_type, args.draws, args.seed)?;
        println!("{}", crate::report::format_simulation(&sim));
    }
    Ok(())
}
