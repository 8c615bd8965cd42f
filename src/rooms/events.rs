//! The bidirectional event protocol. Frames are JSON text shaped
//! `{"event": <name>, "data": <payload>}` with camelCase payload fields;
//! anything that fails to parse is dropped without effect.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Message;

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room: String,
        username: String,
    },
    SendMessage {
        username: String,
        room: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
    },
    Typing {
        room: String,
        is_typing: bool,
    },
    ToggleReaction {
        message_id: Uuid,
        emoji: String,
        username: String,
        room: String,
    },
    AddReaction {
        message_id: Uuid,
        emoji: String,
        username: String,
        room: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A newly persisted message, fanned out to the whole room.
    ReceiveMessage(Message),
    /// Full membership snapshot after a join or leave.
    RoomUsers(Vec<String>),
    /// Single-slot typing indicator, relayed to everyone but the typist.
    TypingStatus { username: String, is_typing: bool },
    /// A message whose reactions changed; replace-by-id on the client.
    MessageUpdated(Message),
    /// Failure acknowledgment, sent only to the originating connection.
    Error { reason: String },
}
