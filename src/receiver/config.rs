//! Receiver configuration.

use serde::Deserialize;

use crate::exporter::DEFAULT_ENDPOINT;
use crate::fabric::AuthConfig;

/// Configuration for the fabric receiver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Fabric endpoint to connect to.
    pub endpoint: String,

    /// Local identity accepting inbound sessions.
    pub receiver_name: String,

    /// Authentication for the receiver app.
    pub auth: AuthConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            receiver_name: "agntcy/otel/receiver".to_string(),
            auth: AuthConfig::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.receiver_name.is_empty() {
            return Err("receiver name cannot be empty".to_string());
        }
        self.auth.validate().map_err(|err| err.to_string())
    }
}
