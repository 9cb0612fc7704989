//! Exporter lifecycle against the in-process fabric.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{raw_app, traces_request, wait_until, TEST_SECRET};
use fabric_otel::exporter::{ChannelConfig, ExporterConfig, FabricExporter};
use fabric_otel::fabric::{Direction, FabricConnector, MemoryFabric, SessionOptions};
use fabric_otel::name::Name;
use fabric_otel::registry::RegistryError;
use fabric_otel::signal::SignalType;

fn channel(name: &str, signal: &str, participants: &[&str]) -> ChannelConfig {
    ChannelConfig {
        channel_name: name.to_string(),
        signal: signal.to_string(),
        participants: participants.iter().map(|p| p.to_string()).collect(),
        mls_enabled: true,
    }
}

fn config(channels: Vec<ChannelConfig>) -> ExporterConfig {
    ExporterConfig {
        shared_secret: TEST_SECRET.to_string(),
        channels,
        ..Default::default()
    }
}

#[tokio::test]
async fn start_creates_sessions_for_matching_channels_only() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    let exporter = FabricExporter::new(
        config(vec![
            channel("agntcy/ns/telemetry-traces", "traces", &["agntcy/ns/peer"]),
            channel("agntcy/ns/telemetry-metrics", "metrics", &["agntcy/ns/peer"]),
        ]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();
    exporter.start().await.unwrap();

    let names = exporter.sessions().list_names().await;
    assert_eq!(names, vec!["agntcy/ns/telemetry-traces"]);
}

#[tokio::test]
async fn start_invites_participants_into_the_channel() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    // Participant subscribed before the exporter starts, so the invite
    // lands a session in its accept queue.
    let peer = raw_app(&fabric, "agntcy/ns/peer", Direction::Receive).await;

    let exporter = FabricExporter::new(
        config(vec![channel(
            "agntcy/ns/telemetry-traces",
            "traces",
            &["agntcy/ns/peer"],
        )]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();
    exporter.start().await.unwrap();

    let accepted = peer.listen_for_session(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        accepted.destination().unwrap(),
        Name::parse("agntcy/ns/telemetry-traces").unwrap()
    );
}

#[tokio::test]
async fn start_fails_when_a_channel_name_is_invalid() {
    let connector = FabricConnector::new(MemoryFabric::new());

    let exporter = FabricExporter::new(
        config(vec![channel("not-a-channel", "traces", &["agntcy/ns/peer"])]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();

    assert!(exporter.start().await.is_err());
}

#[tokio::test]
async fn acceptor_registers_peer_initiated_sessions() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    let exporter = FabricExporter::new(config(vec![]), SignalType::Traces, &connector)
        .await
        .unwrap();
    exporter.start().await.unwrap();

    // A peer opens a session toward this exporter's identity.
    let peer = raw_app(&fabric, "agntcy/ns/peer", Direction::Bidirectional).await;
    let session = peer
        .create_session_and_wait(
            SessionOptions::group(false),
            &Name::parse("agntcy/ns/inbound").unwrap(),
        )
        .await
        .unwrap();
    session
        .invite_and_wait(&Name::parse("agntcy/otel/exporter-traces").unwrap())
        .await
        .unwrap();

    let sessions = exporter.sessions().clone();
    wait_until("inbound session registration", || {
        let sessions = sessions.clone();
        async move { sessions.list_names().await.contains(&"agntcy/ns/inbound".to_string()) }
    })
    .await;

    exporter.shutdown().await;
}

#[tokio::test]
async fn push_prunes_sessions_closed_by_peers() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    let exporter = FabricExporter::new(
        config(vec![
            channel("agntcy/ns/closing", "traces", &["agntcy/ns/peer"]),
            channel("agntcy/ns/healthy", "traces", &["agntcy/ns/peer"]),
        ]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();
    exporter.start().await.unwrap();
    assert_eq!(exporter.sessions().len().await, 2);

    fabric
        .close_channel(&Name::parse("agntcy/ns/closing").unwrap())
        .await;

    exporter.push_traces(&traces_request(1)).await.unwrap();

    assert_eq!(exporter.sessions().len().await, 1);
    assert!(exporter
        .sessions()
        .get_by_name("agntcy/ns/healthy")
        .await
        .is_ok());
    assert!(matches!(
        exporter.sessions().get_by_name("agntcy/ns/closing").await,
        Err(RegistryError::NameNotFound(_))
    ));
}

#[tokio::test]
async fn push_delivers_payload_to_participant_sessions() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    let peer = raw_app(&fabric, "agntcy/ns/peer", Direction::Receive).await;

    let exporter = FabricExporter::new(
        config(vec![channel(
            "agntcy/ns/telemetry-traces",
            "traces",
            &["agntcy/ns/peer"],
        )]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();
    exporter.start().await.unwrap();

    let accepted = peer.listen_for_session(Duration::from_secs(1)).await.unwrap();

    let request = traces_request(2);
    exporter.push_traces(&request).await.unwrap();

    let payload = accepted.get_message(Duration::from_secs(1)).await.unwrap();
    let decoded = fabric_otel::codec::decode_traces(&payload).unwrap();
    assert_eq!(decoded, request);
}

#[tokio::test]
async fn shutdown_empties_the_registry() {
    let fabric = MemoryFabric::new();
    let connector = FabricConnector::new(fabric.clone());

    let exporter = FabricExporter::new(
        config(vec![channel(
            "agntcy/ns/telemetry-traces",
            "traces",
            &["agntcy/ns/peer"],
        )]),
        SignalType::Traces,
        &connector,
    )
    .await
    .unwrap();
    exporter.start().await.unwrap();

    exporter.shutdown().await;

    let sessions = Arc::clone(exporter.sessions());
    assert!(matches!(
        sessions.get_by_name("agntcy/ns/telemetry-traces").await,
        Err(RegistryError::Uninitialized)
    ));
}
