//! Closed catalogs of packet types and vendors.
//!
//! Both catalogs are fixed enumerations with a stable external tag. Parsing a
//! tag goes through a table built once on first use, so lookups stay O(1) as
//! the catalogs grow. Unknown tags are always an error; there is no fallback
//! variant.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// A class of traffic to be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PacketType {
    P1,
    P2,
    P3,
    P4,
    P5,
}

/// A routing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Vendor {
    V1,
    V2,
    V3,
}

static PACKET_TYPES_BY_TAG: LazyLock<HashMap<&'static str, PacketType>> =
    LazyLock::new(|| PacketType::ALL.iter().map(|p| (p.as_str(), *p)).collect());

static VENDORS_BY_TAG: LazyLock<HashMap<&'static str, Vendor>> =
    LazyLock::new(|| Vendor::ALL.iter().map(|v| (v.as_str(), *v)).collect());

impl PacketType {
    /// Every packet type, in catalog order.
    pub const ALL: [PacketType; 5] = [
        PacketType::P1,
        PacketType::P2,
        PacketType::P3,
        PacketType::P4,
        PacketType::P5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::P1 => "packet_type_1",
            PacketType::P2 => "packet_type_2",
            PacketType::P3 => "packet_type_3",
            PacketType::P4 => "packet_type_4",
            PacketType::P5 => "packet_type_5",
        }
    }

    /// Resolve an external tag.
    pub fn from_tag(tag: &str) -> Result<Self, RoutingError> {
        PACKET_TYPES_BY_TAG
            .get(tag)
            .copied()
            .ok_or_else(|| RoutingError::UnknownCategory {
                kind: "packet type",
                tag: tag.to_string(),
            })
    }
}

impl Vendor {
    /// Every vendor, in catalog order.
    pub const ALL: [Vendor; 3] = [Vendor::V1, Vendor::V2, Vendor::V3];

    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::V1 => "vendor_1",
            Vendor::V2 => "vendor_2",
            Vendor::V3 => "vendor_3",
        }
    }

    /// Resolve an external tag.
    pub fn from_tag(tag: &str) -> Result<Self, RoutingError> {
        VENDORS_BY_TAG
            .get(tag)
            .copied()
            .ok_or_else(|| RoutingError::UnknownCategory {
                kind: "vendor",
                tag: tag.to_string(),
            })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketType {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl FromStr for Vendor {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl TryFrom<String> for PacketType {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_tag(&value)
    }
}

impl TryFrom<String> for Vendor {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_tag(&value)
    }
}

impl From<PacketType> for &'static str {
    fn from(value: PacketType) -> Self {
        value.as_str()
    }
}

impl From<Vendor> for &'static str {
    fn from(value: Vendor) -> Self {
        value.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_lookup_table() {
        for p in PacketType::ALL {
            assert_eq!(PacketType::from_tag(p.as_str()).unwrap(), p);
        }
        for v in Vendor::ALL {
            assert_eq!(v.as_str().parse::<Vendor>().unwrap(), v);
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let err = PacketType::from_tag("packet_type_42").unwrap_err();
        assert!(matches!(err, RoutingError::UnknownCategory { kind: "packet type", .. }));

        // Tags are case sensitive.
        assert!(Vendor::from_tag("VENDOR_1").is_err());
    }

    #[test]
    fn serde_uses_tags() {
        let json = serde_json::to_string(&Vendor::V2).unwrap();
        assert_eq!(json, "\"vendor_2\"");

        let parsed: PacketType = serde_json::from_str("\"packet_type_3\"").unwrap();
        assert_eq!(parsed, PacketType::P3);

        assert!(serde_json::from_str::<Vendor>("\"vendor_0\"").is_err());
    }

    #[test]
    fn catalog_order_is_declaration_order() {
        let mut sorted = Vendor::ALL;
        sorted.sort();
        assert_eq!(sorted, Vendor::ALL);
    }
}
