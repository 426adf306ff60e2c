//! Command-line parsing for the vendor routing planner.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! optimization code. Input paths can also come from the environment (or a
//! `.env` file), which keeps scheduled runs short.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::domain::PacketType;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "vroute", version, about = "Tiered-price vendor allocation and routing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Optimize a planning period: tier targets, then per-packet-type fractions.
    Plan(PlanArgs),
    /// Route a single request using a saved plan.
    Select(SelectArgs),
    /// Replay uniform samples through a saved plan and compare frequencies.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct PlanArgs {
    /// Vendor profile YAML.
    #[arg(long, env = "VROUTE_VENDORS", value_name = "YAML")]
    pub vendors: PathBuf,

    /// Packet eligibility YAML.
    #[arg(long, env = "VROUTE_PACKETS", value_name = "YAML")]
    pub packets: PathBuf,

    /// Forecast CSV (`packet_type,mean[,std_dev]`).
    #[arg(long, env = "VROUTE_FORECAST", value_name = "CSV")]
    pub forecast: PathBuf,

    /// Plan every packet type at this percentile of its forecast.
    #[arg(long, value_name = "P")]
    pub percentile: Option<f64>,

    /// Per packet type percentile, e.g. `packet_type_1=0.9` (repeatable).
    #[arg(long = "adjust", value_name = "TAG=P", value_parser = parse_adjustment)]
    pub adjustments: Vec<(PacketType, f64)>,

    /// Planning date (defaults to today, UTC).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// Write the plan to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SelectArgs {
    /// Plan JSON produced by `vroute plan --export`.
    #[arg(long, env = "VROUTE_PLAN", value_name = "JSON")]
    pub plan: PathBuf,

    #[arg(long, value_parser = parse_packet_type)]
    pub packet_type: PacketType,

    /// Uniform sample in [0, 1).
    #[arg(long)]
    pub sample: f64,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Plan JSON produced by `vroute plan --export`.
    #[arg(long, env = "VROUTE_PLAN", value_name = "JSON")]
    pub plan: PathBuf,

    /// Only simulate this packet type (default: all in the plan).
    #[arg(long, value_parser = parse_packet_type)]
    pub packet_type: Option<PacketType>,

    #[arg(long, default_value_t = 100_000)]
    pub draws: u64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

fn parse_packet_type(s: &str) -> Result<PacketType, String> {
    s.parse().map_err(|e: crate::error::RoutingError| e.to_string())
}

fn parse_adjustment(s: &str) -> Result<(PacketType, f64), String> {
    let (tag, p) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TAG=PERCENTILE, got '{s}'"))?;
    let packet_type = parse_packet_type(tag.trim())?;
    let percentile: f64 = p
        .trim()
        .parse()
        .map_err(|_| format!("invalid percentile '{p}'"))?;
    Ok((packet_type, percentile))
}
