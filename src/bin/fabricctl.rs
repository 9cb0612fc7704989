//! fabricctl: channel manager control tool
//!
//! Sends one control-protocol command to a running fabric-channeld and
//! prints the response.

use clap::{Parser, Subcommand};

use fabric_otel::proto::channel_manager_service_client::ChannelManagerServiceClient;
use fabric_otel::proto::control_message::Payload;
use fabric_otel::proto::{
    AddParticipantRequest, ControlMessage, CreateChannelRequest, DeleteChannelRequest,
    ListChannelsRequest, ListParticipantsRequest, RemoveParticipantRequest,
};

#[derive(Parser)]
#[command(name = "fabricctl", about = "Channel manager control tool", version)]
struct Cli {
    /// Control service address.
    #[arg(long, default_value = "localhost:46358")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all channels.
    ListChannels,

    /// List participants in a channel.
    ListParticipants { channel: String },

    /// Create a new channel.
    CreateChannel {
        channel: String,
        /// Disable MLS for this channel.
        #[arg(long)]
        disable_mls: bool,
    },

    /// Delete a channel.
    DeleteChannel { channel: String },

    /// Add a participant to a channel.
    AddParticipant { channel: String, participant: String },

    /// Remove a participant from a channel.
    RemoveParticipant { channel: String, participant: String },
}

impl Command {
    fn into_payload(self) -> Payload {
        match self {
            Command::ListChannels => Payload::ListChannelsRequest(ListChannelsRequest {}),
            Command::ListParticipants { channel } => {
                Payload::ListParticipantsRequest(ListParticipantsRequest {
                    channel_name: channel,
                })
            }
            Command::CreateChannel {
                channel,
                disable_mls,
            } => Payload::CreateChannelRequest(CreateChannelRequest {
                channel_name: channel,
                mls_enabled: !disable_mls,
            }),
            Command::DeleteChannel { channel } => {
                Payload::DeleteChannelRequest(DeleteChannelRequest {
                    channel_name: channel,
                })
            }
            Command::AddParticipant {
                channel,
                participant,
            } => Payload::AddParticipantRequest(AddParticipantRequest {
                channel_name: channel,
                participant_name: participant,
            }),
            Command::RemoveParticipant {
                channel,
                participant,
            } => Payload::RemoveParticipantRequest(RemoveParticipantRequest {
                channel_name: channel,
                participant_name: participant,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut client =
        ChannelManagerServiceClient::connect(format!("http://{}", cli.server)).await?;

    let msg_id: u64 = rand::random();
    let request = ControlMessage {
        msg_id,
        payload: Some(cli.command.into_payload()),
    };

    let response = client.command(request).await?.into_inner();
    print_response(response);
    Ok(())
}

fn print_response(response: ControlMessage) {
    println!("msg_id: {}", response.msg_id);

    match response.payload {
        Some(Payload::ListChannelsResponse(list)) => {
            println!("channels ({}):", list.channel_names.len());
            for name in list.channel_names {
                println!("  {name}");
            }
        }
        Some(Payload::ListParticipantsResponse(list)) => {
            println!("participants ({}):", list.participant_names.len());
            for name in list.participant_names {
                println!("  {name}");
            }
        }
        Some(Payload::CommandResponse(command)) => {
            if command.success {
                println!("success");
            } else {
                println!(
                    "failed: {}",
                    command.error_msg.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        other => println!("unexpected response: {other:?}"),
    }
}
