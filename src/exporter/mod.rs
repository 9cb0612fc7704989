//! Fabric exporter: publishes telemetry of one signal kind to its channels.
//!
//! On start the exporter creates a group session per configured channel of
//! its signal, invites the configured participants, and spawns an acceptor
//! that registers sessions initiated by peers. Each push marshals the batch
//! once and broadcasts it through the session registry; sessions that the
//! fabric reports closed are pruned on the way out.

mod config;

pub use config::{ChannelConfig, ExporterConfig, SignalNames, DEFAULT_ENDPOINT};

use std::sync::Arc;
use std::time::Duration;

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::codec;
use crate::fabric::{
    AuthConfig, ConnectorError, Direction, FabricApp, FabricConnector, FabricError, SessionOptions,
};
use crate::name::{Name, NameError};
use crate::registry::{RegistryError, SessionRegistry};
use crate::signal::SignalType;

const SESSION_ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors surfaced by the exporter.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("failed to create fabric app: {0}")]
    Setup(#[from] ConnectorError),

    #[error(transparent)]
    Identity(#[from] NameError),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Exporter for one signal kind.
pub struct FabricExporter {
    config: ExporterConfig,
    signal: SignalType,
    app: Arc<dyn FabricApp>,
    connection_id: u64,
    sessions: Arc<SessionRegistry>,
    // Owns the acceptor lifetime; start contexts are short-lived.
    acceptor: Mutex<Option<CancellationToken>>,
}

impl FabricExporter {
    /// Connect to the fabric and create this signal's app.
    pub async fn new(
        config: ExporterConfig,
        signal: SignalType,
        connector: &FabricConnector,
    ) -> Result<Self, ExporterError> {
        let auth = AuthConfig::with_shared_secret(config.shared_secret.clone());
        let local_id = config.exporter_names.name_for(signal).to_string();
        let (app, connection_id) = connector
            .create_app(&local_id, &config.endpoint, &auth, Direction::Send)
            .await?;

        Ok(Self {
            config,
            signal,
            app,
            connection_id,
            sessions: Arc::new(SessionRegistry::new(Some(signal))),
            acceptor: Mutex::new(None),
        })
    }

    pub fn signal(&self) -> SignalType {
        self.signal
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Create the configured outbound sessions and begin accepting inbound
    /// ones. Any failure while creating or inviting fails startup.
    pub async fn start(&self) -> Result<(), ExporterError> {
        info!(signal = %self.signal, "starting fabric exporter");

        self.create_sessions_and_invite().await?;

        let token = CancellationToken::new();
        let mut acceptor = self.acceptor.lock().await;
        if acceptor.is_none() {
            info!(signal = %self.signal, "start to listen for new sessions");
            tokio::spawn(accept_sessions(
                self.app.clone(),
                self.sessions.clone(),
                self.signal,
                token.clone(),
            ));
            *acceptor = Some(token);
        }

        Ok(())
    }

    async fn create_sessions_and_invite(&self) -> Result<(), ExporterError> {
        for channel in &self.config.channels {
            if !channel.matches(self.signal) {
                continue;
            }

            let destination = Name::parse(&channel.channel_name)?;
            let session = self
                .app
                .create_session_and_wait(SessionOptions::group(channel.mls_enabled), &destination)
                .await?;

            info!(
                signal = %self.signal,
                channel = %destination,
                "created session for channel"
            );

            for participant in &channel.participants {
                let participant_name = Name::parse(participant)?;
                self.app
                    .set_route(&participant_name, self.connection_id)
                    .await?;
                session.invite_and_wait(&participant_name).await?;
            }

            self.sessions.add(session).await?;

            info!(
                signal = %self.signal,
                channel = %destination,
                participants = channel.participants.len(),
                "created session and invited participants"
            );
        }

        Ok(())
    }

    /// Export a traces batch to every live session.
    pub async fn push_traces(
        &self,
        request: &ExportTraceServiceRequest,
    ) -> Result<(), ExporterError> {
        info!(
            signal = "traces",
            spans = codec::span_count(request),
            "exporting traces"
        );
        self.publish(codec::encode_traces(request)).await
    }

    /// Export a metrics batch to every live session.
    pub async fn push_metrics(
        &self,
        request: &ExportMetricsServiceRequest,
    ) -> Result<(), ExporterError> {
        info!(
            signal = "metrics",
            data_points = codec::data_point_count(request),
            "exporting metrics"
        );
        self.publish(codec::encode_metrics(request)).await
    }

    /// Export a logs batch to every live session.
    pub async fn push_logs(&self, request: &ExportLogsServiceRequest) -> Result<(), ExporterError> {
        info!(
            signal = "logs",
            log_records = codec::log_record_count(request),
            "exporting logs"
        );
        self.publish(codec::encode_logs(request)).await
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), ExporterError> {
        let report = self.sessions.publish_to_all(&payload).await?;

        for id in report.closed {
            info!(session_id = id, "removing closed session");
            match self.sessions.remove_by_id(id).await {
                Ok(_) => {}
                // A concurrent prune may have won the race.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }

        match report.failure {
            Some(err) => {
                error!(signal = %self.signal, error = %err, "error sending message");
                Err(err.into())
            }
            None => Ok(()),
        }
    }

    /// Stop the acceptor, delete every session and release the app.
    pub async fn shutdown(&self) {
        info!(signal = %self.signal, "shutting down fabric exporter");

        if let Some(token) = self.acceptor.lock().await.take() {
            token.cancel();
        }

        self.sessions.delete_all(Some(&self.app)).await;
        self.app.destroy().await;
    }
}

/// Accept peer-initiated sessions until cancelled. Listen timeouts are the
/// idle path.
async fn accept_sessions(
    app: Arc<dyn FabricApp>,
    sessions: Arc<SessionRegistry>,
    signal: SignalType,
    token: CancellationToken,
) {
    info!(signal = %signal, "listener started, waiting for incoming sessions");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(signal = %signal, "shutting down listener");
                return;
            }
            accepted = app.listen_for_session(SESSION_ACCEPT_TIMEOUT) => {
                match accepted {
                    Ok(session) => {
                        info!(signal = %signal, "new session received");
                        if let Err(err) = sessions.add(session).await {
                            error!(signal = %signal, error = %err, "failed to add session");
                        }
                    }
                    Err(err) if err.is_timeout() => {}
                    Err(err) => {
                        error!(signal = %signal, error = %err, "error waiting for session");
                    }
                }
            }
        }
    }
}
