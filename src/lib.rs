//! fabric-otel - Telemetry over a secure group-messaging fabric.
//!
//! An OpenTelemetry exporter/receiver pair that carries traces, metrics and
//! logs between collector instances over group sessions of a secure
//! messaging fabric, plus the channel manager daemon that administers those
//! groups out of band.

pub mod codec;
pub mod exporter;
pub mod fabric;
pub mod manager;
pub mod name;
pub mod receiver;
pub mod registry;
pub mod signal;

// Generated control-protocol types
pub mod proto {
    tonic::include_proto!("fabric.control.v1");
}

// Re-export common types for library usage
pub use fabric::{Fabric, FabricApp, FabricError, FabricSession};
pub use name::{Name, NameError};
pub use registry::{PublishReport, RegistryError, SessionRegistry};
pub use signal::SignalType;
