//! Control service: the out-of-band request/response protocol of the
//! channel manager.
//!
//! A single `Command` RPC carries a `ControlMessage` envelope whose
//! `msg_id` is echoed in the response. Verb failures come back as a failed
//! `CommandResponse`, not as an RPC error.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::info;

use crate::name::Name;
use crate::proto::channel_manager_service_server::ChannelManagerService;
use crate::proto::control_message::Payload;
use crate::proto::{
    AddParticipantRequest, CommandResponse, ControlMessage, CreateChannelRequest,
    DeleteChannelRequest, ListChannelsRequest, ListChannelsResponse, ListParticipantsRequest,
    ListParticipantsResponse, RemoveParticipantRequest,
};
use crate::fabric::SessionOptions;

use super::ChannelManager;

/// gRPC face of the channel manager.
pub struct ControlService {
    manager: Arc<ChannelManager>,
}

impl ControlService {
    pub fn new(manager: Arc<ChannelManager>) -> Self {
        Self { manager }
    }

    async fn handle_create_channel(
        &self,
        msg_id: u64,
        request: CreateChannelRequest,
    ) -> ControlMessage {
        let channel = match Name::parse(&request.channel_name) {
            Ok(channel) => channel,
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid channel name: {}", request.channel_name),
                )
            }
        };

        let canonical = channel.to_string();
        if self.manager.channels().get_by_name(&canonical).await.is_ok() {
            return error_response(msg_id, format!("channel {canonical} already exists"));
        }

        let session = match self
            .manager
            .app()
            .create_session_and_wait(SessionOptions::group(request.mls_enabled), &channel)
            .await
        {
            Ok(session) => session,
            Err(_) => {
                return error_response(msg_id, format!("failed to create channel {canonical}"))
            }
        };

        if self.manager.channels().add(session.clone()).await.is_err() {
            // Roll the fabric session back so a failed registration does not
            // leave an unmanaged group behind.
            let _ = self.manager.app().delete_session_and_wait(&session).await;
            return error_response(
                msg_id,
                format!("failed to complete channel {canonical} creation"),
            );
        }

        info!(channel = %canonical, "created channel");
        success_response(msg_id)
    }

    async fn handle_delete_channel(
        &self,
        msg_id: u64,
        request: DeleteChannelRequest,
    ) -> ControlMessage {
        let canonical = match Name::parse(&request.channel_name) {
            Ok(channel) => channel.to_string(),
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid channel name: {}", request.channel_name),
                )
            }
        };

        let session = match self.manager.channels().remove_by_name(&canonical).await {
            Ok(session) => session,
            Err(err) => {
                return error_response(msg_id, format!("failed to delete channel {canonical}: {err}"))
            }
        };

        if let Err(err) = self.manager.app().delete_session_and_wait(&session).await {
            return error_response(msg_id, format!("failed to delete channel {canonical}: {err}"));
        }

        info!(channel = %canonical, "deleted channel");
        success_response(msg_id)
    }

    async fn handle_add_participant(
        &self,
        msg_id: u64,
        request: AddParticipantRequest,
    ) -> ControlMessage {
        let canonical = match Name::parse(&request.channel_name) {
            Ok(channel) => channel.to_string(),
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid channel name: {}", request.channel_name),
                )
            }
        };

        let session = match self.manager.channels().get_by_name(&canonical).await {
            Ok(session) => session,
            Err(err) => {
                return error_response(msg_id, format!("failed to get channel {canonical}: {err}"))
            }
        };

        let participant = match Name::parse(&request.participant_name) {
            Ok(participant) => participant,
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid participant name: {}", request.participant_name),
                )
            }
        };

        if let Err(err) = self
            .manager
            .app()
            .set_route(&participant, self.manager.connection_id())
            .await
        {
            return error_response(
                msg_id,
                format!("failed to set route for participant {participant}: {err}"),
            );
        }

        if let Err(err) = session.invite_and_wait(&participant).await {
            return error_response(
                msg_id,
                format!("failed to invite participant {participant} to channel {canonical}: {err}"),
            );
        }

        info!(channel = %canonical, participant = %participant, "participant added");
        success_response(msg_id)
    }

    async fn handle_remove_participant(
        &self,
        msg_id: u64,
        request: RemoveParticipantRequest,
    ) -> ControlMessage {
        let canonical = match Name::parse(&request.channel_name) {
            Ok(channel) => channel.to_string(),
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid channel name: {}", request.channel_name),
                )
            }
        };

        let session = match self.manager.channels().get_by_name(&canonical).await {
            Ok(session) => session,
            Err(err) => {
                return error_response(msg_id, format!("failed to get channel {canonical}: {err}"))
            }
        };

        let participant = match Name::parse(&request.participant_name) {
            Ok(participant) => participant,
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid participant name: {}", request.participant_name),
                )
            }
        };

        if let Err(err) = session.remove_and_wait(&participant).await {
            return error_response(
                msg_id,
                format!(
                    "failed to remove participant {participant} from channel {canonical}: {err}"
                ),
            );
        }

        info!(channel = %canonical, participant = %participant, "participant removed");
        success_response(msg_id)
    }

    async fn handle_list_channels(&self, msg_id: u64, _: ListChannelsRequest) -> ControlMessage {
        let channel_names = self.manager.channels().list_names().await;
        info!(count = channel_names.len(), "listing channels");

        ControlMessage {
            msg_id,
            payload: Some(Payload::ListChannelsResponse(ListChannelsResponse {
                msg_id,
                channel_names,
            })),
        }
    }

    async fn handle_list_participants(
        &self,
        msg_id: u64,
        request: ListParticipantsRequest,
    ) -> ControlMessage {
        let canonical = match Name::parse(&request.channel_name) {
            Ok(channel) => channel.to_string(),
            Err(_) => {
                return error_response(
                    msg_id,
                    format!("invalid channel name: {}", request.channel_name),
                )
            }
        };

        let session = match self.manager.channels().get_by_name(&canonical).await {
            Ok(session) => session,
            Err(err) => {
                return error_response(msg_id, format!("failed to get channel {canonical}: {err}"))
            }
        };

        let participants = match session.participants().await {
            Ok(participants) => participants,
            Err(err) => {
                return error_response(
                    msg_id,
                    format!("failed to list participants for channel {canonical}: {err}"),
                )
            }
        };

        let participant_names: Vec<String> =
            participants.iter().map(|name| name.to_string()).collect();
        info!(
            channel = %canonical,
            count = participant_names.len(),
            "listing participants"
        );

        ControlMessage {
            msg_id,
            payload: Some(Payload::ListParticipantsResponse(ListParticipantsResponse {
                msg_id,
                participant_names,
            })),
        }
    }
}

#[tonic::async_trait]
impl ChannelManagerService for ControlService {
    async fn command(
        &self,
        request: Request<ControlMessage>,
    ) -> Result<Response<ControlMessage>, Status> {
        let message = request.into_inner();
        let msg_id = message.msg_id;
        info!(msg_id, "received command");

        let response = match message.payload {
            Some(Payload::CreateChannelRequest(req)) => {
                self.handle_create_channel(msg_id, req).await
            }
            Some(Payload::DeleteChannelRequest(req)) => {
                self.handle_delete_channel(msg_id, req).await
            }
            Some(Payload::AddParticipantRequest(req)) => {
                self.handle_add_participant(msg_id, req).await
            }
            Some(Payload::RemoveParticipantRequest(req)) => {
                self.handle_remove_participant(msg_id, req).await
            }
            Some(Payload::ListChannelsRequest(req)) => {
                self.handle_list_channels(msg_id, req).await
            }
            Some(Payload::ListParticipantsRequest(req)) => {
                self.handle_list_participants(msg_id, req).await
            }
            _ => error_response(msg_id, "unknown command type".to_string()),
        };

        Ok(Response::new(response))
    }
}

fn success_response(msg_id: u64) -> ControlMessage {
    ControlMessage {
        msg_id,
        payload: Some(Payload::CommandResponse(CommandResponse {
            msg_id,
            success: true,
            error_msg: None,
        })),
    }
}

fn error_response(msg_id: u64, error_msg: String) -> ControlMessage {
    ControlMessage {
        msg_id,
        payload: Some(Payload::CommandResponse(CommandResponse {
            msg_id,
            success: false,
            error_msg: Some(error_msg),
        })),
    }
}
