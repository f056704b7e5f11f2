//! Ordered, deduplicated message sequence for one chat room.
//!
//! Messages are kept newest first (descending [`MessageId`]). Every mutation
//! preserves that order and drops ids already present, so retried pages and
//! duplicate live deliveries converge on the same sequence regardless of the
//! order they arrive in.

use chrono::{DateTime, Utc};
use shared::{domain::MessageId, protocol::ChatMessage};

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn newest(&self) -> Option<&ChatMessage> {
        self.messages.first()
    }

    pub fn oldest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn get(&self, message_id: MessageId) -> Option<&ChatMessage> {
        self.position(message_id)
            .ok()
            .map(|index| &self.messages[index])
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.position(message_id).is_ok()
    }

    /// Appends a page of older messages behind the current tail and returns
    /// how many were actually stored.
    pub fn append_older_page(&mut self, items: Vec<ChatMessage>) -> usize {
        let mut inserted = 0;
        for item in items {
            let older_than_tail = self
                .messages
                .last()
                .map_or(true, |tail| item.id < tail.id);
            if older_than_tail {
                self.messages.push(item);
                inserted += 1;
            } else if self.insert_sorted(item) {
                // overlapping page: fall back to a positional insert
                inserted += 1;
            }
        }
        inserted
    }

    /// Inserts a live message at its ordered position. Returns `false` when the
    /// id is already present.
    pub fn merge_live_message(&mut self, item: ChatMessage) -> bool {
        self.insert_sorted(item)
    }

    /// Sets `read_at` once. Returns `true` only when the message existed and
    /// was still unread.
    pub fn mark_read(&mut self, message_id: MessageId, read_at: DateTime<Utc>) -> bool {
        let Ok(index) = self.position(message_id) else {
            return false;
        };
        let message = &mut self.messages[index];
        if message.read_at.is_some() {
            return false;
        }
        message.read_at = Some(read_at);
        true
    }

    fn insert_sorted(&mut self, item: ChatMessage) -> bool {
        match self.position(item.id) {
            Ok(_) => false,
            Err(index) => {
                self.messages.insert(index, item);
                true
            }
        }
    }

    fn position(&self, message_id: MessageId) -> Result<usize, usize> {
        self.messages
            .binary_search_by(|probe| message_id.cmp(&probe.id))
    }
}

#[cfg(test)]
#[path = "tests/message_store_tests.rs"]
mod tests;
