//! YAML configuration: packet eligibility and vendor profiles.
//!
//! Both files are top-level mappings keyed by catalog tag:
//!
//! ```yaml
//! # packets.yaml
//! packet_type_1: [vendor_1, vendor_2]
//! packet_type_2: [vendor_1]
//!
//! # vendors.yaml
//! vendor_1:
//!   minimum_volume: 200
//!   price_tiers:
//!     - { minimum_volume: 0, cost_per_unit: 0.10 }
//!     - { minimum_volume: 1000, cost_per_unit: 0.08 }
//! ```
//!
//! Document order is kept: vendor lists stay in the order written and vendor
//! profiles are returned in file order. Unknown tags and unknown profile
//! fields are rejected before any optimization runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::domain::{EligibilityMap, PacketType, PriceTier, Vendor, VendorProfile};
use crate::error::{Result, RoutingError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVendorProfile {
    #[serde(default)]
    minimum_volume: Option<u64>,
    #[serde(default)]
    maximum_volume: Option<u64>,
    #[serde(default)]
    price_tiers: Option<Vec<PriceTier>>,
}

/// Parse an eligibility document.
pub fn parse_eligibility(text: &str) -> Result<EligibilityMap> {
    let doc = parse_mapping(text).map_err(|e| RoutingError::config(format!("invalid eligibility YAML: {e}")))?;
    eligibility_from_mapping(&doc)
}

/// Load the packet eligibility file at `path`.
pub fn load_eligibility(path: &Path) -> Result<EligibilityMap> {
    let text = fs::read_to_string(path).map_err(|e| RoutingError::io(path, e))?;
    let doc = parse_mapping(&text).map_err(|e| RoutingError::parse(path, e))?;
    let eligibility = eligibility_from_mapping(&doc)?;
    info!(path = %path.display(), packet_types = eligibility.iter().count(), "loaded eligibility");
    Ok(eligibility)
}

/// Parse a vendor profile document. Profiles come back in document order.
pub fn parse_vendor_profiles(text: &str) -> Result<Vec<VendorProfile>> {
    let doc = parse_mapping(text).map_err(|e| RoutingError::config(format!("invalid vendor YAML: {e}")))?;
    profiles_from_mapping(&doc)
}

/// Load the vendor profile file at `path`.
pub fn load_vendor_profiles(path: &Path) -> Result<Vec<VendorProfile>> {
    let text = fs::read_to_string(path).map_err(|e| RoutingError::io(path, e))?;
    let doc = parse_mapping(&text).map_err(|e| RoutingError::parse(path, e))?;
    let profiles = profiles_from_mapping(&doc)?;
    info!(path = %path.display(), vendors = profiles.len(), "loaded vendor profiles");
    Ok(profiles)
}

fn parse_mapping(text: &str) -> std::result::Result<Mapping, serde_yaml::Error> {
    // An empty file is an empty mapping, not a null document.
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    serde_yaml::from_str(text)
}

fn key_str<'a>(key: &'a Value, kind: &str) -> Result<&'a str> {
    key.as_str()
        .ok_or_else(|| RoutingError::config(format!("{kind} keys must be strings, got {key:?}")))
}

fn eligibility_from_mapping(doc: &Mapping) -> Result<EligibilityMap> {
    let mut entries = BTreeMap::new();
    for (key, value) in doc {
        let packet_type: PacketType = key_str(key, "packet type")?.parse()?;
        let tags: Vec<String> = serde_yaml::from_value(value.clone()).map_err(|e| {
            RoutingError::config(format!("{packet_type}: expected a list of vendor tags ({e})"))
        })?;
        let vendors = tags
            .iter()
            .map(|tag| tag.parse::<Vendor>())
            .collect::<Result<Vec<_>>>()?;
        entries.insert(packet_type, vendors);
    }
    EligibilityMap::new(entries)
}

fn profiles_from_mapping(doc: &Mapping) -> Result<Vec<VendorProfile>> {
    let mut profiles: Vec<VendorProfile> = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let vendor: Vendor = key_str(key, "vendor")?.parse()?;
        if profiles.iter().any(|p| p.vendor() == vendor) {
            return Err(RoutingError::config(format!("{vendor} configured more than once")));
        }
        let raw: RawVendorProfile = serde_yaml::from_value(value.clone())
            .map_err(|e| RoutingError::config(format!("{vendor}: {e}")))?;
        let tiers = raw
            .price_tiers
            .ok_or_else(|| RoutingError::config(format!("{vendor}: missing price_tiers")))?;
        profiles.push(VendorProfile::new(vendor, raw.minimum_volume, raw.maximum_volume, tiers)?);
    }
    Ok(profiles)
}
