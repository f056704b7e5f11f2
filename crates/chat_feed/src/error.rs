use shared::{
    domain::{ChatRoomId, MessageId},
    error::MalformedMessage,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no chat room attached")]
    NoActiveRoom,
    #[error("failed to fetch older messages for chat room {chat_room_id}: {source}")]
    FetchFailure {
        chat_room_id: ChatRoomId,
        source: anyhow::Error,
    },
    #[error("failed to submit read receipt for message {message_id}: {source}")]
    AcknowledgmentFailure {
        message_id: MessageId,
        source: anyhow::Error,
    },
    #[error("malformed message event: {0}")]
    MalformedEvent(#[from] MalformedMessage),
}

impl FeedError {
    /// Whether the "load more" affordance should offer a retry.
    pub fn is_retryable_fetch(&self) -> bool {
        matches!(self, FeedError::FetchFailure { .. })
    }
}
