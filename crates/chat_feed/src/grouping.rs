use shared::{domain::ProfileId, protocol::ChatMessage};

/// Adjacency facts for one message of a newest-first sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageContext<'a> {
    pub message: &'a ChatMessage,
    /// Chronologically older neighbour (index + 1).
    pub prev_message: Option<&'a ChatMessage>,
    /// Chronologically newer neighbour (index - 1).
    pub next_message: Option<&'a ChatMessage>,
    /// Nearest newer message sent by the viewer.
    pub next_message_by_me: Option<&'a ChatMessage>,
}

impl MessageContext<'_> {
    /// True when the older neighbour has the same sender, i.e. this message
    /// continues a run and its sender label can be suppressed.
    pub fn continues_sender_run(&self) -> bool {
        self.prev_message
            .is_some_and(|prev| prev.sender_profile_id == self.message.sender_profile_id)
    }
}

/// Resolves grouping context for every message of `messages` (newest first)
/// in a single pass.
pub fn resolve_groups(messages: &[ChatMessage], viewer: ProfileId) -> Vec<MessageContext<'_>> {
    let mut contexts = Vec::with_capacity(messages.len());
    let mut nearest_mine: Option<&ChatMessage> = None;

    for (index, message) in messages.iter().enumerate() {
        contexts.push(MessageContext {
            message,
            prev_message: messages.get(index + 1),
            next_message: index.checked_sub(1).map(|newer| &messages[newer]),
            next_message_by_me: nearest_mine,
        });
        if message.is_sent_by(viewer) {
            nearest_mine = Some(message);
        }
    }

    contexts
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
