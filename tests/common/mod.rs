//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use fabric_otel::fabric::{AuthConfig, Direction, Fabric, FabricApp, MemoryFabric};
use fabric_otel::name::Name;
use fabric_otel::receiver::{
    ConsumerError, Consumers, LogsConsumer, MetricsConsumer, TracesConsumer,
};

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::{
    Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics,
};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};

pub const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Create an app subscribed to its own identity, bypassing the components.
pub async fn raw_app(
    fabric: &Arc<MemoryFabric>,
    id: &str,
    direction: Direction,
) -> Arc<dyn FabricApp> {
    let name = Name::parse(id).unwrap();
    let auth = AuthConfig::with_shared_secret(TEST_SECRET);
    let app = fabric
        .create_app(
            &name,
            auth.to_provider(id).unwrap(),
            auth.to_verifier(id).unwrap(),
            direction,
        )
        .await
        .unwrap();
    app.subscribe(&name, 1).await.unwrap();
    app
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Recording consumer for all three signal kinds.
#[derive(Default)]
pub struct RecordingSink {
    pub traces: Mutex<Vec<ExportTraceServiceRequest>>,
    pub metrics: Mutex<Vec<ExportMetricsServiceRequest>>,
    pub logs: Mutex<Vec<ExportLogsServiceRequest>>,
}

#[async_trait]
impl TracesConsumer for RecordingSink {
    async fn consume_traces(&self, traces: ExportTraceServiceRequest) -> Result<(), ConsumerError> {
        self.traces.lock().await.push(traces);
        Ok(())
    }
}

#[async_trait]
impl MetricsConsumer for RecordingSink {
    async fn consume_metrics(
        &self,
        metrics: ExportMetricsServiceRequest,
    ) -> Result<(), ConsumerError> {
        self.metrics.lock().await.push(metrics);
        Ok(())
    }
}

#[async_trait]
impl LogsConsumer for RecordingSink {
    async fn consume_logs(&self, logs: ExportLogsServiceRequest) -> Result<(), ConsumerError> {
        self.logs.lock().await.push(logs);
        Ok(())
    }
}

pub fn all_signals(sink: &Arc<RecordingSink>) -> Consumers {
    Consumers {
        traces: Some(sink.clone()),
        metrics: Some(sink.clone()),
        logs: Some(sink.clone()),
    }
}

pub fn traces_request(spans: usize) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: (0..spans)
                    .map(|i| Span {
                        name: format!("span-{i}"),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn metrics_request(points: usize) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            scope_metrics: vec![ScopeMetrics {
                metrics: vec![Metric {
                    name: "test-metric".to_string(),
                    data: Some(Data::Gauge(Gauge {
                        data_points: (0..points).map(|_| NumberDataPoint::default()).collect(),
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn logs_request(records: usize) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            scope_logs: vec![ScopeLogs {
                log_records: (0..records)
                    .map(|_| LogRecord {
                        severity_text: "INFO".to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}
