//! Single-owner feed state machine for the currently attached chat room.
//!
//! [`ChatSession`] performs no I/O. Each attached room gets a fresh
//! [`FeedState`] tagged with a generation number; fetch tickets and live
//! events carry enough identity for results addressed to a previous room to
//! be discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{ChatRoomId, MessageId, ProfileId},
    error::MalformedMessage,
    protocol::{ChatMessage, LiveEvent, MessagePayload},
};
use tracing::{debug, warn};

use crate::{
    grouping::resolve_groups,
    message_store::MessageStore,
    pagination::{FetchOutcome, FetchTicket, PaginationController},
    read_receipts::{last_message_id_by_other, Observation, ReadReceiptEngine, ReceiptState},
    HistoryPage,
};

#[derive(Debug, Clone)]
pub struct FeedState {
    chat_room_id: ChatRoomId,
    generation: u64,
    store: MessageStore,
    pagination: PaginationController,
    read_receipts: ReadReceiptEngine,
    draft: String,
}

impl FeedState {
    fn new(chat_room_id: ChatRoomId, generation: u64, page_size: u32) -> Self {
        Self {
            chat_room_id,
            generation,
            store: MessageStore::new(),
            pagination: PaginationController::new(page_size),
            read_receipts: ReadReceiptEngine::new(),
            draft: String::new(),
        }
    }

    pub fn chat_room_id(&self) -> ChatRoomId {
        self.chat_room_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn no_more_messages(&self) -> bool {
        self.pagination.no_more_messages()
    }

    pub fn fetching_messages(&self) -> bool {
        self.pagination.fetching_messages()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }
}

/// Result of applying one live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMerge {
    Inserted(MessageId),
    Duplicate(MessageId),
    ReadUpdated(MessageId),
    /// Addressed to another room, or nothing is attached.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedMessage {
    pub message: ChatMessage,
    pub is_own: bool,
    pub continues_sender_run: bool,
    pub prev_message_id: Option<MessageId>,
    pub next_message_id: Option<MessageId>,
    pub next_message_by_me_id: Option<MessageId>,
}

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub chat_room_id: Option<ChatRoomId>,
    pub messages: Vec<GroupedMessage>,
    pub fetching_messages: bool,
    pub no_more_messages: bool,
    pub can_load_more: bool,
    pub last_message_id_by_other: Option<MessageId>,
    pub pending_read_receipt: Option<MessageId>,
    pub draft: String,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    page_size: u32,
    next_generation: u64,
    feed: Option<FeedState>,
}

impl ChatSession {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            next_generation: 0,
            feed: None,
        }
    }

    pub fn feed(&self) -> Option<&FeedState> {
        self.feed.as_ref()
    }

    pub fn chat_room_id(&self) -> Option<ChatRoomId> {
        self.feed.as_ref().map(FeedState::chat_room_id)
    }

    /// Attaches `chat_room_id`, discarding the previous FeedState and draft.
    /// Returns `false` if that room is already attached.
    pub fn switch_room(&mut self, chat_room_id: ChatRoomId) -> bool {
        if self.chat_room_id() == Some(chat_room_id) {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        if let Some(previous) = self.feed.as_ref() {
            debug!(
                from = %previous.chat_room_id,
                to = %chat_room_id,
                generation,
                "feed: switching chat room"
            );
        }
        self.feed = Some(FeedState::new(chat_room_id, generation, self.page_size));
        true
    }

    pub fn detach(&mut self) {
        self.feed = None;
    }

    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let feed = self.feed.as_mut()?;
        let oldest = feed.store.oldest().map(|message| message.id);
        feed.pagination
            .begin(feed.chat_room_id, feed.generation, oldest)
    }

    pub fn complete_fetch(&mut self, ticket: &FetchTicket, page: HistoryPage) -> FetchOutcome {
        let Some(feed) = self.current_feed_mut(ticket) else {
            debug!(chat_room_id = %ticket.chat_room_id, "feed: discarding stale history page");
            return FetchOutcome::Stale;
        };

        let returned = page.messages.len();
        let items: Vec<ChatMessage> = page
            .messages
            .into_iter()
            .filter_map(|payload| match validate(payload, feed.chat_room_id) {
                Ok(message) => Some(message),
                Err(error) => {
                    warn!(chat_room_id = %feed.chat_room_id, %error, "feed: dropping malformed history message");
                    None
                }
            })
            .collect();
        let inserted = feed.store.append_older_page(items);
        let exhausted = feed.pagination.complete(returned, page.end_of_history);
        debug!(
            chat_room_id = %feed.chat_room_id,
            returned,
            inserted,
            exhausted,
            "feed: applied history page"
        );
        FetchOutcome::Applied {
            inserted,
            exhausted,
        }
    }

    /// Clears the outstanding fetch. Returns `false` for a stale ticket.
    pub fn fail_fetch(&mut self, ticket: &FetchTicket) -> bool {
        match self.current_feed_mut(ticket) {
            Some(feed) => {
                feed.pagination.fail();
                true
            }
            None => false,
        }
    }

    pub fn merge_live_event(&mut self, event: LiveEvent) -> Result<LiveMerge, MalformedMessage> {
        let Some(feed) = self.feed.as_mut() else {
            return Ok(LiveMerge::Ignored);
        };
        match event {
            LiveEvent::MessageReceived { message } => {
                if message
                    .chat_room_id
                    .is_some_and(|chat_room_id| chat_room_id != feed.chat_room_id)
                {
                    return Ok(LiveMerge::Ignored);
                }
                let message = validate(message, feed.chat_room_id)?;
                let message_id = message.id;
                if feed.store.merge_live_message(message) {
                    Ok(LiveMerge::Inserted(message_id))
                } else {
                    Ok(LiveMerge::Duplicate(message_id))
                }
            }
            LiveEvent::MessageRead {
                chat_room_id,
                message_id,
                read_at,
            } => {
                if chat_room_id != feed.chat_room_id {
                    return Ok(LiveMerge::Ignored);
                }
                if feed.store.mark_read(message_id, read_at) {
                    Ok(LiveMerge::ReadUpdated(message_id))
                } else {
                    Ok(LiveMerge::Ignored)
                }
            }
        }
    }

    /// Runs one read-receipt observation cycle. On [`Observation::Acknowledge`]
    /// the message is marked read locally before the caller submits the
    /// receipt.
    pub fn observe_read_receipts(
        &mut self,
        viewer: Option<ProfileId>,
        visible: bool,
        now: DateTime<Utc>,
    ) -> Observation {
        let (Some(feed), Some(viewer)) = (self.feed.as_mut(), viewer) else {
            return Observation::Unchanged;
        };
        let observation = feed
            .read_receipts
            .observe(feed.store.messages(), viewer, visible);
        if let Observation::Acknowledge(message_id) = observation {
            feed.store.mark_read(message_id, now);
        }
        observation
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        if let Some(feed) = self.feed.as_mut() {
            feed.draft = draft.into();
        }
    }

    pub fn draft(&self) -> &str {
        self.feed.as_ref().map_or("", FeedState::draft)
    }

    pub fn view(&self, viewer: Option<ProfileId>) -> FeedView {
        let Some(feed) = self.feed.as_ref() else {
            return FeedView::default();
        };
        let mut view = FeedView {
            chat_room_id: Some(feed.chat_room_id),
            fetching_messages: feed.fetching_messages(),
            no_more_messages: feed.no_more_messages(),
            draft: feed.draft.clone(),
            ..FeedView::default()
        };
        // nothing is rendered until the viewer is known
        let Some(viewer) = viewer else {
            return view;
        };

        let messages = feed.store.messages();
        view.can_load_more = !feed.no_more_messages();
        view.last_message_id_by_other = last_message_id_by_other(messages, viewer);
        view.pending_read_receipt = match feed.read_receipts.state(messages, viewer) {
            ReceiptState::PendingAcknowledgment(message_id) => Some(message_id),
            ReceiptState::Idle => None,
        };
        view.messages = resolve_groups(messages, viewer)
            .into_iter()
            .map(|ctx| GroupedMessage {
                message: ctx.message.clone(),
                is_own: ctx.message.is_sent_by(viewer),
                continues_sender_run: ctx.continues_sender_run(),
                prev_message_id: ctx.prev_message.map(|m| m.id),
                next_message_id: ctx.next_message.map(|m| m.id),
                next_message_by_me_id: ctx.next_message_by_me.map(|m| m.id),
            })
            .collect();
        view
    }

    fn current_feed_mut(&mut self, ticket: &FetchTicket) -> Option<&mut FeedState> {
        self.feed.as_mut().filter(|feed| {
            feed.generation == ticket.generation && feed.chat_room_id == ticket.chat_room_id
        })
    }
}

fn validate(
    payload: MessagePayload,
    chat_room_id: ChatRoomId,
) -> Result<ChatMessage, MalformedMessage> {
    let message = ChatMessage::try_from(payload)?;
    if message.chat_room_id != chat_room_id {
        return Err(MalformedMessage::WrongChatRoom {
            message_id: message.id.0,
        });
    }
    Ok(message)
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
