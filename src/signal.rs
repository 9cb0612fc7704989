//! Telemetry signal kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error raised when a string is not a known signal kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid signal type '{0}'")]
pub struct SignalTypeError(pub String);

/// The kind of telemetry carried on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Traces,
    Metrics,
    Logs,
}

impl SignalType {
    pub const ALL: [SignalType; 3] = [SignalType::Traces, SignalType::Metrics, SignalType::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Traces => "traces",
            SignalType::Metrics => "metrics",
            SignalType::Logs => "logs",
        }
    }

    /// Detect the signal kind from the trailing segment of a channel name,
    /// for deployments that follow the `-traces`/`-metrics`/`-logs` suffix
    /// convention.
    pub fn from_suffix(component: &str) -> Option<SignalType> {
        SignalType::ALL
            .into_iter()
            .find(|signal| component.ends_with(signal.as_str()))
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = SignalTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traces" => Ok(SignalType::Traces),
            "metrics" => Ok(SignalType::Metrics),
            "logs" => Ok(SignalType::Logs),
            other => Err(SignalTypeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        for signal in SignalType::ALL {
            assert_eq!(signal.as_str().parse::<SignalType>().unwrap(), signal);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "spans".parse::<SignalType>().unwrap_err();
        assert!(err.to_string().contains("invalid signal type"));
    }

    #[test]
    fn suffix_detection() {
        assert_eq!(
            SignalType::from_suffix("telemetry-traces"),
            Some(SignalType::Traces)
        );
        assert_eq!(
            SignalType::from_suffix("telemetry-metrics"),
            Some(SignalType::Metrics)
        );
        assert_eq!(SignalType::from_suffix("logs"), Some(SignalType::Logs));
        assert_eq!(SignalType::from_suffix("telemetry"), None);
    }
}
