//! Channel manager configuration.
//!
//! Loaded from a YAML file with `FABRIC_OTEL`-prefixed environment
//! overrides layered on top.

use std::path::Path;

use serde::Deserialize;

use crate::exporter::DEFAULT_ENDPOINT;

/// Default control service listen address.
pub const DEFAULT_CONTROL_ADDRESS: &str = "localhost:46358";

/// Channel manager daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub manager: ManagerSettings,
    pub channels: Vec<ManagedChannel>,
}

/// Settings of the manager itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Fabric endpoint to connect to.
    pub endpoint: String,

    /// Listen address for the control service.
    pub control_address: String,

    /// The manager's own fabric identity.
    pub local_name: String,

    /// Shared secret for identity provider and verifier.
    pub shared_secret: String,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            control_address: DEFAULT_CONTROL_ADDRESS.to_string(),
            local_name: "agntcy/otel/channel-manager".to_string(),
            shared_secret: String::new(),
        }
    }
}

/// A channel created at daemon startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagedChannel {
    /// Channel name in organization/namespace/channel form.
    pub name: String,

    /// Participants to invite at creation.
    pub participants: Vec<String>,

    /// End-to-end group encryption for this channel.
    pub mls_enabled: bool,
}

impl ManagerConfig {
    /// Load configuration, layering (later overrides earlier):
    /// 1. the given YAML file (or `config.yaml` when absent),
    /// 2. environment variables with the `FABRIC_OTEL` prefix.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder();
        builder = match path {
            Some(path) => builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Yaml).required(true),
            ),
            None => builder.add_source(File::new("config.yaml", FileFormat::Yaml).required(false)),
        };

        let loaded = builder
            .add_source(
                Environment::with_prefix("FABRIC_OTEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ManagerConfig = loaded.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.manager.endpoint.is_empty() {
            return Err("fabric endpoint cannot be empty".to_string());
        }
        if self.manager.local_name.is_empty() {
            return Err("local name cannot be empty".to_string());
        }
        if self.manager.shared_secret.is_empty() {
            return Err("shared secret cannot be empty".to_string());
        }

        for (index, channel) in self.channels.iter().enumerate() {
            if channel.name.is_empty() {
                return Err(format!("channel name is required for channel {index}"));
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
