//! Edge-triggered read receipts.
//!
//! The engine tracks the newest counterparty message it has already
//! acknowledged (a one-slot lag register). Observing the feed fires an
//! acknowledgment only when the newest counterparty message differs from
//! that register and the surface is visible. While hidden the change stays
//! pending and fires on the first visible observation.

use shared::{
    domain::{MessageId, ProfileId},
    protocol::ChatMessage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptState {
    Idle,
    PendingAcknowledgment(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Nothing new to acknowledge.
    Unchanged,
    /// A newer counterparty message exists but the surface is hidden.
    Deferred(MessageId),
    /// Submit exactly one receipt for this message.
    Acknowledge(MessageId),
    /// The message was already read; the register advanced without a receipt.
    AlreadyRead(MessageId),
}

#[derive(Debug, Clone, Default)]
pub struct ReadReceiptEngine {
    last_acknowledged_other_message_id: Option<MessageId>,
}

/// Id of the newest message in `messages` not sent by `viewer`.
pub fn last_message_id_by_other(messages: &[ChatMessage], viewer: ProfileId) -> Option<MessageId> {
    messages
        .iter()
        .find(|message| !message.is_sent_by(viewer))
        .map(|message| message.id)
}

impl ReadReceiptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_acknowledged(&self) -> Option<MessageId> {
        self.last_acknowledged_other_message_id
    }

    /// Pending only when the next visible observation would submit a receipt.
    pub fn state(&self, messages: &[ChatMessage], viewer: ProfileId) -> ReceiptState {
        match self.detect(messages, viewer) {
            Some(message) if !message.is_read() => ReceiptState::PendingAcknowledgment(message.id),
            _ => ReceiptState::Idle,
        }
    }

    /// Runs one observation cycle over the current feed snapshot.
    pub fn observe(
        &mut self,
        messages: &[ChatMessage],
        viewer: ProfileId,
        visible: bool,
    ) -> Observation {
        let Some(candidate) = self.detect(messages, viewer) else {
            return Observation::Unchanged;
        };
        let message_id = candidate.id;
        if !visible {
            return Observation::Deferred(message_id);
        }
        let already_read = candidate.is_read();
        self.last_acknowledged_other_message_id = Some(message_id);
        if already_read {
            Observation::AlreadyRead(message_id)
        } else {
            Observation::Acknowledge(message_id)
        }
    }

    fn detect<'a>(&self, messages: &'a [ChatMessage], viewer: ProfileId) -> Option<&'a ChatMessage> {
        let candidate = messages.iter().find(|message| !message.is_sent_by(viewer))?;
        match self.last_acknowledged_other_message_id {
            // the register never moves backwards
            Some(last) if candidate.id <= last => None,
            _ => Some(candidate),
        }
    }
}

#[cfg(test)]
#[path = "tests/read_receipts_tests.rs"]
mod tests;
