//! "Load older messages" bookkeeping.
//!
//! A fetch is split into [`PaginationController::begin`], which hands out a
//! [`FetchTicket`] and marks the request outstanding, and
//! [`PaginationController::complete`] / [`PaginationController::fail`]. Only
//! one ticket can be outstanding at a time and none is issued once history is
//! exhausted.

use shared::domain::{ChatRoomId, MessageId};

pub const MAX_PAGE_SIZE: u32 = 100;

/// A single outstanding page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub chat_room_id: ChatRoomId,
    /// Generation of the FeedState that issued the ticket.
    pub generation: u64,
    /// Exclusive cursor: only messages with a smaller id are requested.
    pub before: Option<MessageId>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No request was issued (exhausted, already fetching, or no room).
    Skipped,
    Applied { inserted: usize, exhausted: bool },
    /// The ticket's room was switched away before the page arrived.
    Stale,
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: u32,
    no_more_messages: bool,
    fetching_messages: bool,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            no_more_messages: false,
            fetching_messages: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn no_more_messages(&self) -> bool {
        self.no_more_messages
    }

    pub fn fetching_messages(&self) -> bool {
        self.fetching_messages
    }

    pub fn begin(
        &mut self,
        chat_room_id: ChatRoomId,
        generation: u64,
        oldest_loaded: Option<MessageId>,
    ) -> Option<FetchTicket> {
        if self.no_more_messages || self.fetching_messages {
            return None;
        }
        self.fetching_messages = true;
        Some(FetchTicket {
            chat_room_id,
            generation,
            before: oldest_loaded,
            page_size: self.page_size,
        })
    }

    /// Records a returned page of `returned` items. Returns whether history is
    /// now exhausted.
    pub fn complete(&mut self, returned: usize, end_of_history: bool) -> bool {
        self.fetching_messages = false;
        if end_of_history || returned < self.page_size as usize {
            self.no_more_messages = true;
        }
        self.no_more_messages
    }

    pub fn fail(&mut self) {
        self.fetching_messages = false;
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
