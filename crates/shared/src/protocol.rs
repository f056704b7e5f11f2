use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatRoomId, MessageId, ProfileId},
    error::MalformedMessage,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub participants: BTreeSet<ProfileId>,
}

impl ChatRoom {
    pub fn is_direct(&self) -> bool {
        self.participants.len() == 2
    }

    /// Participants other than `viewer`.
    pub fn counterparties(&self, viewer: ProfileId) -> impl Iterator<Item = ProfileId> + '_ {
        self.participants
            .iter()
            .copied()
            .filter(move |profile_id| *profile_id != viewer)
    }
}

/// Message as delivered by a history page or the live channel. Every field is
/// optional on the wire; [`ChatMessage::try_from`] rejects incomplete ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub chat_room_id: Option<ChatRoomId>,
    #[serde(default)]
    pub sender_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_room_id: ChatRoomId,
    pub sender_profile_id: ProfileId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn is_sent_by(&self, profile_id: ProfileId) -> bool {
        self.sender_profile_id == profile_id
    }
}

impl TryFrom<MessagePayload> for ChatMessage {
    type Error = MalformedMessage;

    fn try_from(value: MessagePayload) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.ok_or(MalformedMessage::MissingField("id"))?,
            chat_room_id: value
                .chat_room_id
                .ok_or(MalformedMessage::MissingField("chat_room_id"))?,
            sender_profile_id: value
                .sender_profile_id
                .ok_or(MalformedMessage::MissingField("sender_profile_id"))?,
            content: value
                .content
                .ok_or(MalformedMessage::MissingField("content"))?,
            created_at: value
                .created_at
                .ok_or(MalformedMessage::MissingField("created_at"))?,
            read_at: value.read_at,
        })
    }
}

impl From<ChatMessage> for MessagePayload {
    fn from(value: ChatMessage) -> Self {
        Self {
            id: Some(value.id),
            chat_room_id: Some(value.chat_room_id),
            sender_profile_id: Some(value.sender_profile_id),
            content: Some(value.content),
            created_at: Some(value.created_at),
            read_at: value.read_at,
        }
    }
}

/// Events pushed on a room's live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LiveEvent {
    MessageReceived {
        message: MessagePayload,
    },
    MessageRead {
        chat_room_id: ChatRoomId,
        message_id: MessageId,
        read_at: DateTime<Utc>,
    },
}

impl LiveEvent {
    pub fn chat_room_id(&self) -> Option<ChatRoomId> {
        match self {
            LiveEvent::MessageReceived { message } => message.chat_room_id,
            LiveEvent::MessageRead { chat_room_id, .. } => Some(*chat_room_id),
        }
    }
}
