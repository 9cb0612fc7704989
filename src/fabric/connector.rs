//! Shared fabric connection handle.
//!
//! One connection to the fabric is opened per process and its id reused by
//! every app. The connector owns that init-once state explicitly so callers
//! (and tests) can hold separate fabrics side by side instead of going
//! through a process global.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::auth::AuthConfig;
use super::{ClientConfig, Direction, Fabric, FabricApp, FabricError};
use crate::name::{Name, NameError};

/// Errors raised while establishing an app on the fabric.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Identity(#[from] NameError),

    #[error(transparent)]
    Auth(#[from] super::auth::AuthError),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

/// Process-wide fabric connection, established once and shared.
pub struct FabricConnector {
    fabric: Arc<dyn Fabric>,
    // Single-flight guard: held across the first connect so concurrent
    // callers observe either no connection or the final id.
    connection: Mutex<Option<u64>>,
}

impl FabricConnector {
    pub fn new(fabric: Arc<dyn Fabric>) -> Arc<Self> {
        Arc::new(Self {
            fabric,
            connection: Mutex::new(None),
        })
    }

    pub fn fabric(&self) -> &Arc<dyn Fabric> {
        &self.fabric
    }

    /// Connect to the fabric endpoint if not already connected; returns the
    /// process-wide connection id either way.
    pub async fn connect(&self, endpoint: &str) -> Result<u64, FabricError> {
        let mut connection = self.connection.lock().await;
        if let Some(id) = *connection {
            return Ok(id);
        }

        self.fabric.initialize();
        let id = self
            .fabric
            .connect(&ClientConfig::insecure(endpoint))
            .await?;
        info!(endpoint, connection_id = id, "connected to fabric");

        *connection = Some(id);
        Ok(id)
    }

    /// Create an app under `local_id`, subscribe it to its own identity and
    /// return it together with the connection id.
    pub async fn create_app(
        &self,
        local_id: &str,
        endpoint: &str,
        auth: &AuthConfig,
        direction: Direction,
    ) -> Result<(Arc<dyn FabricApp>, u64), ConnectorError> {
        let connection_id = self.connect(endpoint).await?;

        let app_name = Name::parse(local_id)?;
        let provider = auth.to_provider(local_id)?;
        let verifier = auth.to_verifier(local_id)?;

        let app = self
            .fabric
            .create_app(&app_name, provider, verifier, direction)
            .await?;

        if let Err(err) = app.subscribe(&app_name, connection_id).await {
            app.destroy().await;
            return Err(err.into());
        }

        info!(app_name = %app_name, "created fabric app");
        Ok((app, connection_id))
    }
}
