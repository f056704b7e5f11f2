use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChatRoomId, MessageId, ProfileId},
    protocol::MessagePayload,
};

pub mod config;
mod controller;
pub mod error;
pub mod grouping;
pub mod live;
pub mod message_store;
pub mod pagination;
pub mod read_receipts;
pub mod rest;
pub mod session;

pub use controller::{ChatSessionController, FeedEvent};
pub use error::FeedError;
pub use live::{LiveHub, LiveSubscription};
pub use pagination::{FetchOutcome, FetchTicket};
pub use session::{ChatSession, FeedView, GroupedMessage, LiveMerge};

/// One page of history, newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<MessagePayload>,
    /// Set when the backend knows no older messages exist.
    pub end_of_history: bool,
}

#[async_trait]
pub trait MessageHistory: Send + Sync {
    /// Messages of `chat_room_id` with an id below `before` (all when `None`),
    /// newest first, at most `page_size` of them.
    async fn fetch_older_messages(
        &self,
        chat_room_id: ChatRoomId,
        before: Option<MessageId>,
        page_size: u32,
    ) -> Result<HistoryPage>;
}

pub trait LiveMessages: Send + Sync {
    fn subscribe_live_messages(&self, chat_room_id: ChatRoomId) -> LiveSubscription;
}

#[async_trait]
pub trait ReadReceiptSink: Send + Sync {
    async fn submit_read_receipt(&self, message_id: MessageId) -> Result<()>;
}

pub trait ViewerContext: Send + Sync {
    fn current_profile_id(&self) -> Option<ProfileId>;
    fn is_surface_visible(&self) -> bool;
}

pub struct MissingMessageHistory;

#[async_trait]
impl MessageHistory for MissingMessageHistory {
    async fn fetch_older_messages(
        &self,
        chat_room_id: ChatRoomId,
        _before: Option<MessageId>,
        _page_size: u32,
    ) -> Result<HistoryPage> {
        Err(anyhow!(
            "message history unavailable for chat room {chat_room_id}"
        ))
    }
}

pub struct MissingLiveMessages;

impl LiveMessages for MissingLiveMessages {
    fn subscribe_live_messages(&self, _chat_room_id: ChatRoomId) -> LiveSubscription {
        LiveSubscription::closed()
    }
}

pub struct MissingReadReceiptSink;

#[async_trait]
impl ReadReceiptSink for MissingReadReceiptSink {
    async fn submit_read_receipt(&self, message_id: MessageId) -> Result<()> {
        Err(anyhow!(
            "read receipt backend unavailable for message {message_id}"
        ))
    }
}

/// Viewer identity plus a visibility flag toggled by the hosting surface.
#[derive(Debug, Default)]
pub struct SurfaceViewer {
    profile_id: RwLock<Option<ProfileId>>,
    visible: AtomicBool,
}

impl SurfaceViewer {
    pub fn new(profile_id: Option<ProfileId>, visible: bool) -> Self {
        Self {
            profile_id: RwLock::new(profile_id),
            visible: AtomicBool::new(visible),
        }
    }

    pub fn set_profile_id(&self, profile_id: Option<ProfileId>) {
        match self.profile_id.write() {
            Ok(mut guard) => *guard = profile_id,
            Err(poisoned) => *poisoned.into_inner() = profile_id,
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }
}

impl ViewerContext for SurfaceViewer {
    fn current_profile_id(&self) -> Option<ProfileId> {
        match self.profile_id.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn is_surface_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
