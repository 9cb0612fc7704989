//! fabric-channeld: channel manager daemon
//!
//! Administers telemetry channels on the fabric out of band. Creates the
//! channels listed in its configuration at startup and serves the control
//! protocol for runtime changes.
//!
//! ## Configuration
//! - First positional argument: path to the YAML configuration file
//!   (default: `config.yaml` in the current directory)
//! - Environment variables with the `FABRIC_OTEL__` prefix override file
//!   values
//! - FABRIC_OTEL_LOG: tracing filter (default: `info`)

use std::path::PathBuf;
use std::sync::Arc;

use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fabric_otel::fabric::{FabricConnector, MemoryFabric};
use fabric_otel::manager::{ChannelManager, ControlService, ManagerConfig};
use fabric_otel::proto::channel_manager_service_server::ChannelManagerServiceServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("FABRIC_OTEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting fabric-channeld");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ManagerConfig::load(config_path.as_deref())?;
    config.validate().map_err(|err| format!("invalid configuration: {err}"))?;

    // In-process fabric backend. Deployments on a multi-node substrate
    // bootstrap the manager against their own `Fabric` implementation.
    let connector = FabricConnector::new(MemoryFabric::new());
    let manager = Arc::new(ChannelManager::bootstrap(&config, &connector).await?);

    let addr = config
        .manager
        .control_address
        .replace("localhost", "127.0.0.1")
        .parse()?;

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    info!(
        address = %addr,
        local_name = %config.manager.local_name,
        "control service listening"
    );

    let service = ControlService::new(manager.clone());
    Server::builder()
        .add_service(health_service)
        .add_service(ChannelManagerServiceServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    manager.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
