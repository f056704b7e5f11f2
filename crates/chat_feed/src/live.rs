//! In-process live channel, one broadcast sender per chat room.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use futures::StreamExt;
use shared::{domain::ChatRoomId, protocol::LiveEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use crate::LiveMessages;

/// Receiving end of a room's live channel. Dropping it unsubscribes.
pub struct LiveSubscription {
    chat_room_id: Option<ChatRoomId>,
    stream: Option<BroadcastStream<LiveEvent>>,
}

impl LiveSubscription {
    pub fn new(chat_room_id: ChatRoomId, receiver: broadcast::Receiver<LiveEvent>) -> Self {
        Self {
            chat_room_id: Some(chat_room_id),
            stream: Some(BroadcastStream::new(receiver)),
        }
    }

    /// A subscription that never yields.
    pub fn closed() -> Self {
        Self {
            chat_room_id: None,
            stream: None,
        }
    }

    pub fn chat_room_id(&self) -> Option<ChatRoomId> {
        self.chat_room_id
    }

    /// Next event, or `None` once the channel is closed. Lagged receivers log
    /// and keep reading.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        let stream = self.stream.as_mut()?;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => return Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        chat_room_id = ?self.chat_room_id,
                        skipped,
                        "live: subscriber lagged; events were dropped"
                    );
                }
            }
        }
        None
    }
}

pub struct LiveHub {
    capacity: usize,
    rooms: Mutex<HashMap<ChatRoomId, broadcast::Sender<LiveEvent>>>,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Publishes `event` to the room's subscribers and returns how many
    /// received it.
    pub fn publish(&self, chat_room_id: ChatRoomId, event: LiveEvent) -> usize {
        let rooms = self.rooms();
        match rooms.get(&chat_room_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, chat_room_id: ChatRoomId) -> usize {
        self.rooms()
            .get(&chat_room_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<ChatRoomId, broadcast::Sender<LiveEvent>>> {
        self.rooms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LiveMessages for LiveHub {
    fn subscribe_live_messages(&self, chat_room_id: ChatRoomId) -> LiveSubscription {
        let mut rooms = self.rooms();
        let sender = rooms
            .entry(chat_room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        LiveSubscription::new(chat_room_id, sender.subscribe())
    }
}
