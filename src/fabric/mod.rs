//! Fabric adapter: the interface the bridge uses to talk to the secure
//! group-messaging substrate.
//!
//! This module contains:
//! - `Fabric`, `FabricApp`, `FabricSession` traits: the operations the
//!   exporter, receiver and channel manager need
//! - `FabricError`: structured error variants, including first-class
//!   closed-session and receive-timeout conditions
//! - Session and client configuration types
//! - Implementations: in-process memory backend
//!
//! External substrates plug in by implementing the three traits; everything
//! above this module is transport-agnostic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::name::Name;

pub mod auth;
pub mod connector;
pub mod memory;

pub use auth::{AuthConfig, AuthError, IdentityProviderConfig, IdentityVerifierConfig};
pub use connector::{ConnectorError, FabricConnector};
pub use memory::MemoryFabric;

/// Result type for fabric operations.
pub type Result<T> = std::result::Result<T, FabricError>;

/// Default retry budget for session-level wait operations.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default interval between session-level retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur during fabric operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FabricError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("app creation failed: {0}")]
    CreateApp(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("route update failed: {0}")]
    Route(String),

    #[error("session creation failed: {0}")]
    CreateSession(String),

    #[error("session deletion failed: {0}")]
    DeleteSession(String),

    #[error("invite failed: {0}")]
    Invite(String),

    #[error("participant removal failed: {0}")]
    Remove(String),

    #[error("participant query failed: {0}")]
    Query(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("receive failed: {0}")]
    Receive(String),

    /// The session was closed or dropped by a peer. Publish paths collect
    /// this condition for pruning; receive paths end their read loop on it.
    #[error("session already closed or dropped")]
    SessionClosed,

    /// No message or session arrived within the requested timeout. Benign;
    /// accept and read loops simply retry.
    #[error("receive timeout waiting for message")]
    Timeout,

    #[error("session id is not set")]
    MissingSessionId,

    #[error("session destination is not set")]
    MissingDestination,
}

impl FabricError {
    /// True when the error reports a session terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, FabricError::SessionClosed)
    }

    /// True for the benign wait-expired condition.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FabricError::Timeout)
    }
}

/// Direction intent of a fabric app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
    Bidirectional,
}

/// Client-side connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub tls_insecure: bool,
}

impl ClientConfig {
    /// Plaintext connection to the given endpoint.
    pub fn insecure(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tls_insecure: true,
        }
    }
}

/// Kind of session to establish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Group,
}

/// Settings for a new session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub kind: SessionKind,
    pub mls_enabled: bool,
    pub max_retries: u32,
    pub retry_interval: Duration,
    pub metadata: HashMap<String, String>,
}

impl SessionOptions {
    /// Group session with the standard retry budget.
    pub fn group(mls_enabled: bool) -> Self {
        Self {
            kind: SessionKind::Group,
            mls_enabled,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            metadata: HashMap::new(),
        }
    }
}

/// The fabric service: entry point for connections and apps.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Idempotent crypto/runtime warm-up.
    fn initialize(&self);

    /// Open a connection to the fabric. Reference-counted by the substrate;
    /// callers normally go through `FabricConnector` so one connection is
    /// shared per process.
    async fn connect(&self, config: &ClientConfig) -> Result<u64>;

    /// Create an app bound to a local identity and a direction intent.
    async fn create_app(
        &self,
        name: &Name,
        provider: IdentityProviderConfig,
        verifier: IdentityVerifierConfig,
        direction: Direction,
    ) -> Result<Arc<dyn FabricApp>>;
}

/// A connected endpoint bound to one local identity.
#[async_trait]
pub trait FabricApp: Send + Sync {
    /// Receive traffic addressed to `name` on the given connection.
    async fn subscribe(&self, name: &Name, connection_id: u64) -> Result<()>;

    /// Route traffic for `name` through the given connection.
    async fn set_route(&self, name: &Name, connection_id: u64) -> Result<()>;

    /// Create a session and wait for the fabric to acknowledge it.
    async fn create_session_and_wait(
        &self,
        options: SessionOptions,
        destination: &Name,
    ) -> Result<Arc<dyn FabricSession>>;

    /// Block until a peer-initiated session arrives or the timeout expires
    /// (`FabricError::Timeout`).
    async fn listen_for_session(&self, timeout: Duration) -> Result<Arc<dyn FabricSession>>;

    /// Tear down a session and wait for completion. Idempotent.
    async fn delete_session_and_wait(&self, session: &Arc<dyn FabricSession>) -> Result<()>;

    /// Release the app and its subscriptions.
    async fn destroy(&self);
}

/// A group-messaging context between this app and the channel's members.
///
/// Sessions created locally (we invite) and remotely (we accepted an
/// invitation) behave identically. Once a session reports
/// `FabricError::SessionClosed` it never recovers.
#[async_trait]
pub trait FabricSession: Send + Sync + std::fmt::Debug {
    /// Process-local numeric id, unique while the session is live.
    fn session_id(&self) -> Result<u32>;

    /// The channel this session belongs to.
    fn destination(&self) -> Result<Name>;

    /// Invite a participant and wait for the membership change.
    async fn invite_and_wait(&self, participant: &Name) -> Result<()>;

    /// Remove a participant and wait for the membership change.
    async fn remove_and_wait(&self, participant: &Name) -> Result<()>;

    /// Current channel membership.
    async fn participants(&self) -> Result<Vec<Name>>;

    /// Publish a payload to the channel and wait for the fabric ack.
    async fn publish_and_wait(&self, payload: &[u8]) -> Result<()>;

    /// Block until a payload arrives, the timeout expires
    /// (`FabricError::Timeout`) or the session is closed
    /// (`FabricError::SessionClosed`).
    async fn get_message(&self, timeout: Duration) -> Result<Vec<u8>>;
}
