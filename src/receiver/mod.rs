//! Fabric receiver: accepts inbound sessions and feeds telemetry to the
//! wired consumers.
//!
//! A single receiver identity accepts sessions for every signal kind. Each
//! accepted session gets its own reader task; the wire carries no signal
//! tag, so payloads are classified by attempting an OTLP decode per wired
//! consumer, traces first, then metrics, then logs.

mod config;

pub use config::ReceiverConfig;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec;
use crate::fabric::{ConnectorError, Direction, FabricApp, FabricConnector, FabricSession};
use crate::registry::SessionRegistry;

const SESSION_ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Error reported by a downstream consumer.
#[derive(Debug, thiserror::Error)]
#[error("consumer failed: {0}")]
pub struct ConsumerError(pub String);

/// Downstream consumer of trace batches.
#[async_trait]
pub trait TracesConsumer: Send + Sync {
    async fn consume_traces(&self, traces: ExportTraceServiceRequest) -> Result<(), ConsumerError>;
}

/// Downstream consumer of metric batches.
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    async fn consume_metrics(
        &self,
        metrics: ExportMetricsServiceRequest,
    ) -> Result<(), ConsumerError>;
}

/// Downstream consumer of log batches.
#[async_trait]
pub trait LogsConsumer: Send + Sync {
    async fn consume_logs(&self, logs: ExportLogsServiceRequest) -> Result<(), ConsumerError>;
}

/// The consumers wired into a receiver. At least one should be present for
/// the receiver to be useful.
#[derive(Default, Clone)]
pub struct Consumers {
    pub traces: Option<Arc<dyn TracesConsumer>>,
    pub metrics: Option<Arc<dyn MetricsConsumer>>,
    pub logs: Option<Arc<dyn LogsConsumer>>,
}

/// Errors surfaced by the receiver.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("failed to create fabric app: {0}")]
    Setup(#[from] ConnectorError),
}

/// Receiver over one fabric identity.
pub struct FabricReceiver {
    app: Arc<dyn FabricApp>,
    sessions: Arc<SessionRegistry>,
    consumers: Consumers,
    started: AtomicBool,
    acceptor: Mutex<Option<CancellationToken>>,
}

impl FabricReceiver {
    /// Connect to the fabric and create the receiver app.
    pub async fn new(
        config: &ReceiverConfig,
        connector: &FabricConnector,
        consumers: Consumers,
    ) -> Result<Self, ReceiverError> {
        let (app, _connection_id) = connector
            .create_app(
                &config.receiver_name,
                &config.endpoint,
                &config.auth,
                Direction::Receive,
            )
            .await?;

        Ok(Self {
            app,
            sessions: Arc::new(SessionRegistry::new(None)),
            consumers,
            started: AtomicBool::new(false),
            acceptor: Mutex::new(None),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Begin accepting sessions. Idempotent; only the first call starts the
    /// acceptor.
    pub async fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!("starting fabric receiver");

        let token = CancellationToken::new();
        tokio::spawn(accept_sessions(
            self.app.clone(),
            self.sessions.clone(),
            self.consumers.clone(),
            token.clone(),
        ));
        *self.acceptor.lock().await = Some(token);
    }

    /// Stop the acceptor and readers, delete every session and release the
    /// app. Idempotent.
    pub async fn shutdown(&self) {
        if self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!("shutting down fabric receiver");

        if let Some(token) = self.acceptor.lock().await.take() {
            token.cancel();
        }

        self.sessions.delete_all(Some(&self.app)).await;
        self.app.destroy().await;
    }
}

/// Accept inbound sessions until cancelled, spawning a reader per session.
async fn accept_sessions(
    app: Arc<dyn FabricApp>,
    sessions: Arc<SessionRegistry>,
    consumers: Consumers,
    token: CancellationToken,
) {
    info!("listener started, waiting for incoming sessions");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("shutting down listener");
                return;
            }
            accepted = app.listen_for_session(SESSION_ACCEPT_TIMEOUT) => {
                match accepted {
                    Ok(session) => {
                        info!("new session received");
                        if let Err(err) = sessions.add(session.clone()).await {
                            error!(error = %err, "failed to add new session");
                            continue;
                        }
                        tokio::spawn(read_session(
                            app.clone(),
                            sessions.clone(),
                            consumers.clone(),
                            session,
                            token.child_token(),
                        ));
                    }
                    Err(err) if err.is_timeout() => {}
                    Err(err) => {
                        error!(error = %err, "error waiting for session");
                    }
                }
            }
        }
    }
}

/// Read one session until it closes or the receiver shuts down, dispatching
/// each payload to the matching consumer.
async fn read_session(
    app: Arc<dyn FabricApp>,
    sessions: Arc<SessionRegistry>,
    consumers: Consumers,
    session: Arc<dyn FabricSession>,
    token: CancellationToken,
) {
    let id = match session.session_id() {
        Ok(id) => id,
        Err(err) => {
            error!(error = %err, "failed to get session id");
            return;
        }
    };
    let session_name = match session.destination() {
        Ok(name) => name.to_string(),
        Err(err) => {
            error!(error = %err, "failed to get session destination");
            return;
        }
    };

    info!(session_id = id, session_name = %session_name, "handling new session");

    let mut message_count: u64 = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(
                    session_id = id,
                    session_name = %session_name,
                    total_messages = message_count,
                    "shutting down session"
                );
                break;
            }
            message = session.get_message(MESSAGE_TIMEOUT) => {
                match message {
                    Ok(payload) => {
                        message_count += 1;
                        dispatch_payload(&consumers, id, &payload).await;
                    }
                    Err(err) if err.is_timeout() => {}
                    Err(err) if err.is_closed() => break,
                    Err(err) => {
                        error!(
                            session_id = id,
                            session_name = %session_name,
                            error = %err,
                            "error getting message"
                        );
                    }
                }
            }
        }
    }

    // The session may already be gone after a shutdown-driven delete_all.
    let _ = sessions.remove_by_id(id).await;
    if let Err(err) = app.delete_session_and_wait(&session).await {
        warn!(session_id = id, error = %err, "failed to delete session");
    }
    info!(session_id = id, session_name = %session_name, "session closed");
}

/// Classify a payload by attempting an OTLP decode per wired consumer and
/// hand it to the first kind that parses. Payloads nothing claims are
/// logged and dropped; they never fail the session.
pub(crate) async fn dispatch_payload(consumers: &Consumers, session_id: u32, payload: &[u8]) {
    if let Some(consumer) = &consumers.traces {
        if let Ok(traces) = codec::decode_traces(payload) {
            info!(
                session_id,
                message_size = payload.len(),
                spans = codec::span_count(&traces),
                "received trace message"
            );
            if let Err(err) = consumer.consume_traces(traces).await {
                error!(session_id, error = %err, "failed to consume traces");
            }
            return;
        }
    }

    if let Some(consumer) = &consumers.metrics {
        if let Ok(metrics) = codec::decode_metrics(payload) {
            info!(
                session_id,
                message_size = payload.len(),
                data_points = codec::data_point_count(&metrics),
                "received metrics message"
            );
            if let Err(err) = consumer.consume_metrics(metrics).await {
                error!(session_id, error = %err, "failed to consume metrics");
            }
            return;
        }
    }

    if let Some(consumer) = &consumers.logs {
        if let Ok(logs) = codec::decode_logs(payload) {
            info!(
                session_id,
                message_size = payload.len(),
                log_records = codec::log_record_count(&logs),
                "received logs message"
            );
            if let Err(err) = consumer.consume_logs(logs).await {
                error!(session_id, error = %err, "failed to consume logs");
            }
            return;
        }
    }

    warn!(
        session_id,
        payload_size = payload.len(),
        "unable to determine signal type for message"
    );
}
