//! Channel manager: authoritative creator of telemetry channels.
//!
//! The manager owns a bidirectional fabric app and a session registry
//! shared with the control service. At bootstrap it creates the channels
//! listed in its configuration the same way the exporter does: create a
//! group session, route and invite every participant, register the session.

mod config;
pub mod service;

pub use config::{ManagedChannel, ManagerConfig, ManagerSettings, DEFAULT_CONTROL_ADDRESS};
pub use service::ControlService;

use std::sync::Arc;

use tracing::info;

use crate::fabric::{
    ConnectorError, Direction, FabricApp, FabricConnector, FabricError, SessionOptions,
};
use crate::name::{Name, NameError};
use crate::registry::{RegistryError, SessionRegistry};

/// Errors surfaced while bootstrapping the manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("failed to create fabric app: {0}")]
    Setup(#[from] ConnectorError),

    #[error(transparent)]
    Identity(#[from] NameError),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The channel manager daemon state.
pub struct ChannelManager {
    app: Arc<dyn FabricApp>,
    connection_id: u64,
    channels: Arc<SessionRegistry>,
}

impl ChannelManager {
    /// Connect, create the manager app and create every configured channel.
    pub async fn bootstrap(
        config: &ManagerConfig,
        connector: &FabricConnector,
    ) -> Result<Self, ManagerError> {
        let auth =
            crate::fabric::AuthConfig::with_shared_secret(config.manager.shared_secret.clone());
        let (app, connection_id) = connector
            .create_app(
                &config.manager.local_name,
                &config.manager.endpoint,
                &auth,
                Direction::Bidirectional,
            )
            .await?;

        let manager = Self {
            app,
            connection_id,
            channels: Arc::new(SessionRegistry::new(None)),
        };

        manager.create_configured_channels(config).await?;
        Ok(manager)
    }

    pub fn channels(&self) -> &Arc<SessionRegistry> {
        &self.channels
    }

    pub(crate) fn app(&self) -> &Arc<dyn FabricApp> {
        &self.app
    }

    pub(crate) fn connection_id(&self) -> u64 {
        self.connection_id
    }

    async fn create_configured_channels(&self, config: &ManagerConfig) -> Result<(), ManagerError> {
        for channel in &config.channels {
            let destination = Name::parse(&channel.name)?;

            let session = self
                .app
                .create_session_and_wait(SessionOptions::group(channel.mls_enabled), &destination)
                .await?;

            for participant in &channel.participants {
                let participant_name = Name::parse(participant)?;
                self.app
                    .set_route(&participant_name, self.connection_id)
                    .await?;
                session.invite_and_wait(&participant_name).await?;
            }

            self.channels.add(session).await?;

            info!(
                channel = %destination,
                participants = channel.participants.len(),
                "created session and invited participants"
            );
        }

        Ok(())
    }

    /// Delete every channel session and release the app.
    pub async fn shutdown(&self) {
        info!("shutting down channel manager");
        self.channels.delete_all(Some(&self.app)).await;
        self.app.destroy().await;
    }
}
