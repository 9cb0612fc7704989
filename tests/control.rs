//! Control service verbs against a bootstrapped channel manager.

mod common;

use std::sync::Arc;

use tonic::Request;

use fabric_otel::fabric::{FabricConnector, MemoryFabric};
use fabric_otel::manager::{ChannelManager, ControlService, ManagerConfig, ManagerSettings};
use fabric_otel::proto::channel_manager_service_server::ChannelManagerService;
use fabric_otel::proto::control_message::Payload;
use fabric_otel::proto::{
    AddParticipantRequest, ControlMessage, CreateChannelRequest, DeleteChannelRequest,
    ListChannelsRequest, ListParticipantsRequest, RemoveParticipantRequest,
};

use common::TEST_SECRET;

async fn service() -> (ControlService, Arc<ChannelManager>) {
    let connector = FabricConnector::new(MemoryFabric::new());
    let config = ManagerConfig {
        manager: ManagerSettings {
            shared_secret: TEST_SECRET.to_string(),
            ..Default::default()
        },
        channels: Vec::new(),
    };
    let manager = Arc::new(ChannelManager::bootstrap(&config, &connector).await.unwrap());
    (ControlService::new(manager.clone()), manager)
}

async fn send(service: &ControlService, msg_id: u64, payload: Payload) -> ControlMessage {
    service
        .command(Request::new(ControlMessage {
            msg_id,
            payload: Some(payload),
        }))
        .await
        .unwrap()
        .into_inner()
}

fn command_result(message: &ControlMessage) -> (bool, Option<String>) {
    match &message.payload {
        Some(Payload::CommandResponse(response)) => {
            (response.success, response.error_msg.clone())
        }
        other => panic!("expected a command response, got {other:?}"),
    }
}

fn create_channel(channel: &str, mls_enabled: bool) -> Payload {
    Payload::CreateChannelRequest(CreateChannelRequest {
        channel_name: channel.to_string(),
        mls_enabled,
    })
}

#[tokio::test]
async fn create_channel_succeeds_and_echoes_msg_id() {
    let (service, manager) = service().await;

    let response = send(&service, 17, create_channel("agntcy/ns/c", true)).await;
    assert_eq!(response.msg_id, 17);
    let (success, error) = command_result(&response);
    assert!(success, "unexpected failure: {error:?}");

    assert_eq!(manager.channels().list_names().await, vec!["agntcy/ns/c"]);
}

#[tokio::test]
async fn duplicate_create_is_rejected_without_mutation() {
    let (service, manager) = service().await;

    let first = send(&service, 1, create_channel("agntcy/ns/c", true)).await;
    assert!(command_result(&first).0);

    let second = send(&service, 2, create_channel("agntcy/ns/c", false)).await;
    let (success, error) = command_result(&second);
    assert!(!success);
    assert!(error.unwrap().contains("already exists"));

    assert_eq!(manager.channels().len().await, 1);
}

#[tokio::test]
async fn create_with_invalid_name_fails() {
    let (service, _manager) = service().await;

    let response = send(&service, 3, create_channel("not-a-channel", true)).await;
    let (success, error) = command_result(&response);
    assert!(!success);
    assert!(error.unwrap().contains("invalid channel name"));
}

#[tokio::test]
async fn participants_round_trip_through_add_list_remove() {
    let (service, _manager) = service().await;

    let created = send(&service, 1, create_channel("agntcy/ns/a", true)).await;
    assert!(command_result(&created).0);

    let added = send(
        &service,
        2,
        Payload::AddParticipantRequest(AddParticipantRequest {
            channel_name: "agntcy/ns/a".to_string(),
            participant_name: "agntcy/ns/p1".to_string(),
        }),
    )
    .await;
    assert!(command_result(&added).0);

    let listed = send(
        &service,
        3,
        Payload::ListParticipantsRequest(ListParticipantsRequest {
            channel_name: "agntcy/ns/a".to_string(),
        }),
    )
    .await;
    match &listed.payload {
        Some(Payload::ListParticipantsResponse(list)) => {
            assert!(list.participant_names.contains(&"agntcy/ns/p1".to_string()));
        }
        other => panic!("expected participants, got {other:?}"),
    }

    let removed = send(
        &service,
        4,
        Payload::RemoveParticipantRequest(RemoveParticipantRequest {
            channel_name: "agntcy/ns/a".to_string(),
            participant_name: "agntcy/ns/p1".to_string(),
        }),
    )
    .await;
    assert!(command_result(&removed).0);

    let listed = send(
        &service,
        5,
        Payload::ListParticipantsRequest(ListParticipantsRequest {
            channel_name: "agntcy/ns/a".to_string(),
        }),
    )
    .await;
    match &listed.payload {
        Some(Payload::ListParticipantsResponse(list)) => {
            assert!(!list.participant_names.contains(&"agntcy/ns/p1".to_string()));
        }
        other => panic!("expected participants, got {other:?}"),
    }
}

#[tokio::test]
async fn add_participant_to_unknown_channel_fails() {
    let (service, _manager) = service().await;

    let response = send(
        &service,
        6,
        Payload::AddParticipantRequest(AddParticipantRequest {
            channel_name: "agntcy/ns/none".to_string(),
            participant_name: "agntcy/ns/p1".to_string(),
        }),
    )
    .await;
    let (success, error) = command_result(&response);
    assert!(!success);
    assert!(error.unwrap().contains("failed to get channel"));
}

#[tokio::test]
async fn delete_channel_removes_it_from_listing() {
    let (service, manager) = service().await;

    let created = send(&service, 1, create_channel("agntcy/ns/c", false)).await;
    assert!(command_result(&created).0);

    let deleted = send(
        &service,
        2,
        Payload::DeleteChannelRequest(DeleteChannelRequest {
            channel_name: "agntcy/ns/c".to_string(),
        }),
    )
    .await;
    assert!(command_result(&deleted).0);
    assert!(manager.channels().list_names().await.is_empty());

    // Deleting again reports the missing channel.
    let again = send(
        &service,
        3,
        Payload::DeleteChannelRequest(DeleteChannelRequest {
            channel_name: "agntcy/ns/c".to_string(),
        }),
    )
    .await;
    let (success, error) = command_result(&again);
    assert!(!success);
    assert!(error.unwrap().contains("failed to delete channel"));
}

#[tokio::test]
async fn list_channels_snapshots_the_registry() {
    let (service, _manager) = service().await;

    for (id, name) in [(1, "agntcy/ns/one"), (2, "agntcy/ns/two")] {
        let response = send(&service, id, create_channel(name, true)).await;
        assert!(command_result(&response).0);
    }

    let listed = send(&service, 9, Payload::ListChannelsRequest(ListChannelsRequest {})).await;
    match &listed.payload {
        Some(Payload::ListChannelsResponse(list)) => {
            let mut names = list.channel_names.clone();
            names.sort();
            assert_eq!(names, vec!["agntcy/ns/one", "agntcy/ns/two"]);
        }
        other => panic!("expected channels, got {other:?}"),
    }
}

#[tokio::test]
async fn envelope_without_payload_is_an_unknown_command() {
    let (service, _manager) = service().await;

    let response = service
        .command(Request::new(ControlMessage {
            msg_id: 99,
            payload: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.msg_id, 99);
    let (success, error) = command_result(&response);
    assert!(!success);
    assert_eq!(error.unwrap(), "unknown command type");
}
