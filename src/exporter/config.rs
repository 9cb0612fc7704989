//! Exporter configuration.

use serde::Deserialize;

use crate::signal::SignalType;

/// Default fabric endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:46357";

/// Configuration for the fabric exporter, one instance per signal kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Fabric endpoint to connect to.
    pub endpoint: String,

    /// Local identity per signal kind.
    pub exporter_names: SignalNames,

    /// Shared secret for identity provider and verifier.
    pub shared_secret: String,

    /// Channels to create at startup.
    pub channels: Vec<ChannelConfig>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            exporter_names: SignalNames::default(),
            shared_secret: String::new(),
            channels: Vec::new(),
        }
    }
}

/// Identity per signal kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalNames {
    pub traces: String,
    pub metrics: String,
    pub logs: String,
}

impl Default for SignalNames {
    fn default() -> Self {
        Self {
            traces: "agntcy/otel/exporter-traces".to_string(),
            metrics: "agntcy/otel/exporter-metrics".to_string(),
            logs: "agntcy/otel/exporter-logs".to_string(),
        }
    }
}

impl SignalNames {
    pub fn name_for(&self, signal: SignalType) -> &str {
        match signal {
            SignalType::Traces => &self.traces,
            SignalType::Metrics => &self.metrics,
            SignalType::Logs => &self.logs,
        }
    }
}

/// One outbound channel. An entry names exactly one signal; pipelines that
/// carry several signals use multiple entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel name in organization/namespace/channel form.
    pub channel_name: String,

    /// Signal carried on this channel: traces, metrics or logs.
    pub signal: String,

    /// Participants to invite at session creation.
    pub participants: Vec<String>,

    /// End-to-end group encryption for this channel.
    pub mls_enabled: bool,
}

impl ChannelConfig {
    pub fn signal_type(&self) -> Result<SignalType, crate::signal::SignalTypeError> {
        self.signal.parse()
    }

    /// True when this entry feeds an exporter of the given kind.
    pub fn matches(&self, signal: SignalType) -> bool {
        self.signal == signal.as_str()
    }
}

impl ExporterConfig {
    /// Check the configuration. The channel list may be empty; every listed
    /// channel needs a name, a known signal and at least one participant.
    pub fn validate(&self) -> Result<(), String> {
        if self.shared_secret.is_empty() {
            return Err("missing shared secret".to_string());
        }

        for (index, channel) in self.channels.iter().enumerate() {
            if channel.channel_name.is_empty() {
                return Err(format!("channel name is required for channel {index}"));
            }
            if channel.signal.is_empty() {
                return Err(format!("signal type is required for channel {index}"));
            }
            if channel.signal_type().is_err() {
                return Err(format!(
                    "invalid signal type '{}' for channel {index}",
                    channel.signal
                ));
            }
            if channel.participants.is_empty() {
                return Err(format!(
                    "at least one participant must be specified for channel {index}"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, signal: &str, participants: &[&str]) -> ChannelConfig {
        ChannelConfig {
            channel_name: name.to_string(),
            signal: signal.to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            mls_enabled: false,
        }
    }

    #[test]
    fn empty_channel_list_is_valid() {
        let config = ExporterConfig {
            shared_secret: "x".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:46357");
        assert_eq!(config.exporter_names.traces, "agntcy/otel/exporter-traces");
        assert_eq!(
            config.exporter_names.metrics,
            "agntcy/otel/exporter-metrics"
        );
        assert_eq!(config.exporter_names.logs, "agntcy/otel/exporter-logs");
    }

    #[test]
    fn missing_shared_secret_rejected() {
        let config = ExporterConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains("missing shared secret"));
    }

    #[test]
    fn invalid_signal_rejected() {
        let config = ExporterConfig {
            shared_secret: "x".to_string(),
            channels: vec![channel("agntcy/test/c", "invalid-signal", &["p"])],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("invalid signal type"));
    }

    #[test]
    fn empty_participants_rejected() {
        let config = ExporterConfig {
            shared_secret: "x".to_string(),
            channels: vec![channel("agntcy/test/c", "traces", &[])],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("at least one participant"));
    }

    #[test]
    fn missing_channel_name_rejected() {
        let config = ExporterConfig {
            shared_secret: "x".to_string(),
            channels: vec![channel("", "traces", &["agntcy/test/p"])],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("channel name is required"));
    }

    #[test]
    fn multiple_valid_channels_accepted() {
        let config = ExporterConfig {
            shared_secret: "x".to_string(),
            channels: vec![
                channel("agntcy/test/c1", "traces", &["agntcy/test/p1"]),
                channel("agntcy/test/c2", "metrics", &["agntcy/test/p2", "agntcy/test/p3"]),
                channel("agntcy/test/c2", "logs", &["agntcy/test/p2"]),
            ],
            ..Default::default()
        };
        config.validate().unwrap();
    }
}
