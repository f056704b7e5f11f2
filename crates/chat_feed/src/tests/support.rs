use chrono::{DateTime, Duration, Utc};
use shared::{
    domain::{ChatRoomId, MessageId, ProfileId},
    protocol::{ChatMessage, MessagePayload},
};
use uuid::Uuid;

pub fn room(n: u128) -> ChatRoomId {
    ChatRoomId(Uuid::from_u128(0x5000 + n))
}

pub fn me() -> ProfileId {
    ProfileId(Uuid::from_u128(1))
}

pub fn other() -> ProfileId {
    ProfileId(Uuid::from_u128(2))
}

pub fn at(id: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(id)
}

pub fn message_in(chat_room_id: ChatRoomId, id: i64, sender: ProfileId) -> ChatMessage {
    ChatMessage {
        id: MessageId(id),
        chat_room_id,
        sender_profile_id: sender,
        content: format!("message {id}"),
        created_at: at(id),
        read_at: None,
    }
}

pub fn message(id: i64, sender: ProfileId) -> ChatMessage {
    message_in(room(1), id, sender)
}

pub fn payload_in(chat_room_id: ChatRoomId, id: i64, sender: ProfileId) -> MessagePayload {
    message_in(chat_room_id, id, sender).into()
}

/// Descending page `[from, from-1, ..]` of `count` messages by `sender`.
pub fn page(chat_room_id: ChatRoomId, from: i64, count: i64, sender: ProfileId) -> Vec<MessagePayload> {
    (0..count)
        .map(|offset| payload_in(chat_room_id, from - offset, sender))
        .collect()
}

pub fn ids(messages: &[ChatMessage]) -> Vec<i64> {
    messages.iter().map(|message| message.id.0).collect()
}
