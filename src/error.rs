use std::path::PathBuf;

use thiserror::Error;

use crate::domain::PacketType;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Everything that can go wrong between loading configuration and routing a request.
///
/// Each variant maps to a process exit code via [`RoutingError::exit_code`]:
///
/// - `2`: bad input (configuration, tags, files, runtime misuse)
/// - `3`: the optimization has no feasible solution
/// - `4`: the solver or its output misbehaved
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("unknown {kind} tag '{tag}'")]
    UnknownCategory { kind: &'static str, tag: String },

    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("packet type {0} has positive demand but no eligible vendor")]
    NoEligibleVendor(PacketType),

    #[error("no route configured for packet type {0}")]
    UnknownRoute(PacketType),

    #[error("routing sample {0} is outside [0, 1]")]
    InvalidSample(f64),

    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("fractions for packet type {packet_type} sum to {sum}, expected 1")]
    AllocationInvariant { packet_type: PacketType, sum: f64 },

    #[error("solver failure: {0}")]
    Solver(String),
}

impl RoutingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownCategory { .. }
            | Self::ConfigValidation(_)
            | Self::Io { .. }
            | Self::Parse { .. }
            | Self::NoEligibleVendor(_)
            | Self::UnknownRoute(_)
            | Self::InvalidSample(_) => 2,
            Self::Infeasible(_) => 3,
            Self::AllocationInvariant { .. } | Self::Solver(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_severity() {
        assert_eq!(RoutingError::config("bad tiers").exit_code(), 2);
        assert_eq!(RoutingError::Infeasible("min > demand".into()).exit_code(), 3);
        assert_eq!(
            RoutingError::AllocationInvariant {
                packet_type: PacketType::P1,
                sum: 0.9
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn messages_name_the_offending_tag() {
        let err = RoutingError::UnknownCategory {
            kind: "vendor",
            tag: "vendor_9".into(),
        };
        assert_eq!(err.to_string(), "unknown vendor tag 'vendor_9'");
    }
}
