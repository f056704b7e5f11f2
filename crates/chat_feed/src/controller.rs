use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use shared::{
    domain::{ChatRoomId, MessageId},
    protocol::LiveEvent,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::FeedSettings,
    error::FeedError,
    pagination::FetchOutcome,
    read_receipts::Observation,
    session::{ChatSession, FeedView, LiveMerge},
    LiveMessages, MessageHistory, ReadReceiptSink, ViewerContext,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    RoomAttached {
        chat_room_id: ChatRoomId,
    },
    FeedUpdated {
        chat_room_id: ChatRoomId,
    },
    FetchFailed {
        chat_room_id: ChatRoomId,
        error: String,
    },
    MalformedEventDropped {
        chat_room_id: ChatRoomId,
        error: String,
    },
    /// A receipt submission was started; exactly one of
    /// `ReadReceiptSubmitted` or `ReadReceiptFailed` follows.
    ReadReceiptDispatched {
        chat_room_id: ChatRoomId,
        message_id: MessageId,
    },
    ReadReceiptSubmitted {
        chat_room_id: ChatRoomId,
        message_id: MessageId,
    },
    ReadReceiptFailed {
        chat_room_id: ChatRoomId,
        message_id: MessageId,
        error: String,
    },
}

/// Owns the [`ChatSession`] for one viewing surface and wires it to the
/// history, live and read-receipt collaborators.
///
/// The session lock is never held across a collaborator call, so live events
/// and visibility changes keep being processed while a page is in flight.
pub struct ChatSessionController {
    history: Arc<dyn MessageHistory>,
    live: Arc<dyn LiveMessages>,
    receipts: Arc<dyn ReadReceiptSink>,
    viewer: Arc<dyn ViewerContext>,
    inner: Mutex<ChatSession>,
    live_task: StdMutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<FeedEvent>,
}

impl ChatSessionController {
    pub fn new(
        settings: &FeedSettings,
        history: Arc<dyn MessageHistory>,
        live: Arc<dyn LiveMessages>,
        receipts: Arc<dyn ReadReceiptSink>,
        viewer: Arc<dyn ViewerContext>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        Arc::new(Self {
            history,
            live,
            receipts,
            viewer,
            inner: Mutex::new(ChatSession::new(settings.page_size)),
            live_task: StdMutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Attaches `chat_room_id` with a fresh feed and live subscription.
    /// Results still in flight for the previous room are discarded when they
    /// land. Returns `false` if the room was already attached.
    pub async fn open_room(self: &Arc<Self>, chat_room_id: ChatRoomId) -> bool {
        // held until the live task is installed so overlapping opens cannot
        // leave the feed on one room and the subscription on another
        let mut session = self.inner.lock().await;
        if !session.switch_room(chat_room_id) {
            return false;
        }

        // subscribe before spawning so nothing published after this returns is missed
        let mut subscription = self.live.subscribe_live_messages(chat_room_id);
        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next_event().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let _ = controller.on_live_event(event).await;
            }
            debug!(%chat_room_id, "live: subscription ended");
        });
        self.replace_live_task(Some(task));
        drop(session);

        info!(%chat_room_id, "feed: chat room attached");
        let _ = self.events.send(FeedEvent::RoomAttached { chat_room_id });
        true
    }

    pub async fn close_room(&self) {
        let mut session = self.inner.lock().await;
        session.detach();
        self.replace_live_task(None);
    }

    /// Loads the next page of older messages. A no-op while a fetch is
    /// outstanding or once history is exhausted.
    pub async fn fetch_more(&self) -> Result<FetchOutcome, FeedError> {
        let ticket = {
            let mut session = self.inner.lock().await;
            if session.chat_room_id().is_none() {
                return Err(FeedError::NoActiveRoom);
            }
            match session.begin_fetch() {
                Some(ticket) => ticket,
                None => return Ok(FetchOutcome::Skipped),
            }
        };
        let chat_room_id = ticket.chat_room_id;
        let _ = self.events.send(FeedEvent::FeedUpdated { chat_room_id });

        let result = self
            .history
            .fetch_older_messages(chat_room_id, ticket.before, ticket.page_size)
            .await;

        let mut session = self.inner.lock().await;
        match result {
            Ok(page) => {
                let outcome = session.complete_fetch(&ticket, page);
                if matches!(outcome, FetchOutcome::Applied { .. }) {
                    self.after_mutation(&mut session);
                }
                Ok(outcome)
            }
            Err(source) => {
                if !session.fail_fetch(&ticket) {
                    debug!(%chat_room_id, "feed: ignoring failure of stale history fetch");
                    return Ok(FetchOutcome::Stale);
                }
                drop(session);
                let error = FeedError::FetchFailure {
                    chat_room_id,
                    source,
                };
                warn!(%chat_room_id, %error, "feed: history fetch failed");
                let _ = self.events.send(FeedEvent::FetchFailed {
                    chat_room_id,
                    error: error.to_string(),
                });
                let _ = self.events.send(FeedEvent::FeedUpdated { chat_room_id });
                Err(error)
            }
        }
    }

    /// Applies one event from the live channel.
    pub async fn on_live_event(&self, event: LiveEvent) -> Result<LiveMerge, FeedError> {
        let mut session = self.inner.lock().await;
        match session.merge_live_event(event) {
            Ok(merge @ (LiveMerge::Inserted(_) | LiveMerge::ReadUpdated(_))) => {
                self.after_mutation(&mut session);
                Ok(merge)
            }
            Ok(merge) => Ok(merge),
            Err(malformed) => {
                let chat_room_id = session.chat_room_id();
                drop(session);
                warn!(chat_room_id = ?chat_room_id, error = %malformed, "live: dropping malformed message");
                if let Some(chat_room_id) = chat_room_id {
                    let _ = self.events.send(FeedEvent::MalformedEventDropped {
                        chat_room_id,
                        error: malformed.to_string(),
                    });
                }
                Err(FeedError::MalformedEvent(malformed))
            }
        }
    }

    /// Re-evaluates read receipts after the surface was shown or hidden, or the
    /// viewer identity changed.
    pub async fn on_visibility_changed(&self) {
        let mut session = self.inner.lock().await;
        self.observe_read_receipts(&mut session);
    }

    pub async fn set_draft(&self, draft: impl Into<String>) {
        self.inner.lock().await.set_draft(draft);
    }

    pub async fn view(&self) -> FeedView {
        self.inner
            .lock()
            .await
            .view(self.viewer.current_profile_id())
    }

    fn after_mutation(&self, session: &mut ChatSession) {
        self.observe_read_receipts(session);
        if let Some(chat_room_id) = session.chat_room_id() {
            let _ = self.events.send(FeedEvent::FeedUpdated { chat_room_id });
        }
    }

    fn observe_read_receipts(&self, session: &mut ChatSession) {
        let Some(chat_room_id) = session.chat_room_id() else {
            return;
        };
        let viewer = self.viewer.current_profile_id();
        let visible = self.viewer.is_surface_visible();
        match session.observe_read_receipts(viewer, visible, Utc::now()) {
            Observation::Acknowledge(message_id) => {
                self.dispatch_read_receipt(chat_room_id, message_id);
            }
            Observation::Deferred(message_id) => {
                debug!(%chat_room_id, message_id = message_id.0, "receipts: surface hidden; deferring");
            }
            Observation::AlreadyRead(message_id) => {
                debug!(%chat_room_id, message_id = message_id.0, "receipts: newest message already read");
            }
            Observation::Unchanged => {}
        }
    }

    fn dispatch_read_receipt(&self, chat_room_id: ChatRoomId, message_id: MessageId) {
        let receipts = Arc::clone(&self.receipts);
        let events = self.events.clone();
        let _ = events.send(FeedEvent::ReadReceiptDispatched {
            chat_room_id,
            message_id,
        });
        tokio::spawn(async move {
            match receipts.submit_read_receipt(message_id).await {
                Ok(()) => {
                    debug!(%chat_room_id, message_id = message_id.0, "receipts: submitted");
                    let _ = events.send(FeedEvent::ReadReceiptSubmitted {
                        chat_room_id,
                        message_id,
                    });
                }
                Err(source) => {
                    let error = FeedError::AcknowledgmentFailure { message_id, source };
                    warn!(%chat_room_id, %error, "receipts: submission failed; not retrying");
                    let _ = events.send(FeedEvent::ReadReceiptFailed {
                        chat_room_id,
                        message_id,
                        error: error.to_string(),
                    });
                }
            }
        });
    }

    fn replace_live_task(&self, task: Option<JoinHandle<()>>) {
        let mut guard = self
            .live_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = std::mem::replace(&mut *guard, task) {
            previous.abort();
        }
    }
}

impl Drop for ChatSessionController {
    fn drop(&mut self) {
        let task = self
            .live_task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}
