//! Demand forecasts and percentile adjustment.
//!
//! Input is a small CSV with one row per packet type:
//!
//! ```text
//! packet_type,mean,std_dev
//! packet_type_1,1000,120
//! packet_type_2,500,
//! ```
//!
//! `std_dev` is optional. A forecast can be pushed up or down its normal
//! distribution with [`adjust`] to plan more or less conservatively.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info};

use crate::domain::{Demand, PacketType};
use crate::error::{Result, RoutingError};

/// Forecast for one packet type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRecord {
    pub mean: f64,
    pub std_dev: Option<f64>,
}

/// Per packet type forecasts, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    records: BTreeMap<PacketType, ForecastRecord>,
}

impl Forecast {
    pub fn new(records: BTreeMap<PacketType, ForecastRecord>) -> Result<Self> {
        for (packet_type, record) in &records {
            validate_record(*packet_type, record).map_err(RoutingError::config)?;
        }
        Ok(Self { records })
    }

    pub fn record(&self, packet_type: PacketType) -> Option<&ForecastRecord> {
        self.records.get(&packet_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PacketType, &ForecastRecord)> {
        self.records.iter().map(|(p, r)| (*p, r))
    }

    /// Resolve forecasts into planning demand.
    ///
    /// Each packet type uses its entry in `overrides` if present, else
    /// `default_percentile`, else its plain mean. Overrides for packet types
    /// without a forecast are rejected.
    pub fn demand(&self, default_percentile: Option<f64>, overrides: &BTreeMap<PacketType, f64>) -> Result<Demand> {
        if let Some(missing) = overrides.keys().find(|p| !self.records.contains_key(p)) {
            return Err(RoutingError::config(format!(
                "percentile override for {missing}, which has no forecast"
            )));
        }

        let mut demand = Demand::new();
        for (packet_type, record) in &self.records {
            let percentile = overrides.get(packet_type).copied().or(default_percentile);
            let value = match percentile {
                None => record.mean,
                Some(p) => {
                    let std_dev = record.std_dev.ok_or_else(|| {
                        RoutingError::config(format!(
                            "cannot adjust {packet_type} to percentile {p}: forecast has no std_dev"
                        ))
                    })?;
                    let adjusted = adjust(record.mean, std_dev, p)?;
                    debug!(packet_type = %packet_type, mean = record.mean, percentile = p, adjusted, "adjusted forecast");
                    adjusted
                }
            };
            demand.insert(*packet_type, value);
        }
        Ok(demand)
    }
}

/// `mean + z(percentile) · std_dev`, floored at zero.
pub fn adjust(mean: f64, std_dev: f64, percentile: f64) -> Result<f64> {
    if !(percentile > 0.0 && percentile < 1.0) {
        return Err(RoutingError::config(format!(
            "percentile must be in (0, 1), got {percentile}"
        )));
    }
    if !std_dev.is_finite() || std_dev < 0.0 {
        return Err(RoutingError::config(format!(
            "std_dev must be finite and >= 0, got {std_dev}"
        )));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| RoutingError::config(e.to_string()))?;
    let z = normal.inverse_cdf(percentile);
    Ok((mean + z * std_dev).max(0.0))
}

fn validate_record(packet_type: PacketType, record: &ForecastRecord) -> std::result::Result<(), String> {
    if !record.mean.is_finite() || record.mean < 0.0 {
        return Err(format!("forecast mean for {packet_type} must be finite and >= 0, got {}", record.mean));
    }
    match record.std_dev {
        Some(sd) if !sd.is_finite() || sd < 0.0 => {
            Err(format!("forecast std_dev for {packet_type} must be finite and >= 0, got {sd}"))
        }
        _ => Ok(()),
    }
}

/// Load a forecast CSV from disk.
pub fn load_forecast(path: &Path) -> Result<Forecast> {
    let file = File::open(path).map_err(|e| RoutingError::io(path, e))?;
    let forecast = read_forecast(file).map_err(|message| RoutingError::parse(path, message))?;
    info!(path = %path.display(), packet_types = forecast.records.len(), "loaded forecast");
    Ok(forecast)
}

/// Parse forecast CSV from any reader. Errors carry the offending line.
pub fn read_forecast<R: Read>(reader: R) -> std::result::Result<Forecast, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| format!("failed to read CSV headers: {e}"))?
        .clone();
    let columns = header_map(&headers);
    let tag_col = *columns.get("packet_type").ok_or("missing required column 'packet_type'")?;
    let mean_col = *columns.get("mean").ok_or("missing required column 'mean'")?;
    let std_col = columns.get("std_dev").copied();

    let mut records = BTreeMap::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = result.map_err(|e| format!("line {line}: {e}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let tag = record.get(tag_col).unwrap_or_default();
        let packet_type: PacketType = tag.parse().map_err(|e| format!("line {line}: {e}"))?;
        let mean = parse_number(&record, mean_col, "mean").map_err(|e| format!("line {line}: {e}"))?;
        let mean = mean.ok_or_else(|| format!("line {line}: missing mean"))?;
        let std_dev = match std_col {
            Some(col) => parse_number(&record, col, "std_dev").map_err(|e| format!("line {line}: {e}"))?,
            None => None,
        };

        let entry = ForecastRecord { mean, std_dev };
        validate_record(packet_type, &entry).map_err(|e| format!("line {line}: {e}"))?;
        if records.insert(packet_type, entry).is_some() {
            return Err(format!("line {line}: duplicate forecast for {packet_type}"));
        }
    }

    Ok(Forecast { records })
}

fn header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn parse_number(record: &StringRecord, col: usize, field: &str) -> std::result::Result<Option<f64>, String> {
    match record.get(col).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("invalid {field} '{raw}'")),
    }
}
