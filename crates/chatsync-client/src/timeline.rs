//! Message timeline of the selected conversation.
//!
//! Messages are kept newest first. Selecting a conversation replaces the
//! timeline wholesale: [`Timeline::begin_load`] empties it and issues a
//! [`HistoryRequest`] carrying a fresh [`HistoryToken`]. A history result is
//! only applied when its token is still the current one, so a slow fetch
//! for a conversation the user already left can never overwrite the
//! timeline of the one they moved to.

use std::collections::VecDeque;

use chatsync_proto::{ConversationId, Message};

/// Identifies one history load. A new token is issued per selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoryToken(pub u64);

/// Parameters of a history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Token to hand back with the result.
    pub token: HistoryToken,
    /// Conversation to load.
    pub conversation_id: ConversationId,
    /// Page index. Always the first page.
    pub page: u32,
    /// Page size.
    pub size: u32,
}

/// Whether a history result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// The timeline now holds the loaded page.
    Applied,
    /// The result belongs to an earlier selection and was discarded.
    Stale,
}

/// Newest-first messages of one conversation plus its input buffer.
#[derive(Debug, Default)]
pub struct Timeline {
    conversation: Option<ConversationId>,
    messages: VecDeque<Message>,
    generation: u64,
    pending: Option<HistoryToken>,
    input: String,
}

impl Timeline {
    /// Create an empty timeline with no conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `conversation` and request its first history page.
    ///
    /// Clears the messages and the input buffer.
    pub fn begin_load(&mut self, conversation: ConversationId, size: u32) -> HistoryRequest {
        self.generation += 1;
        let token = HistoryToken(self.generation);

        self.conversation = Some(conversation);
        self.messages.clear();
        self.input.clear();
        self.pending = Some(token);

        tracing::debug!(conversation_id = %conversation, token = token.0, "history load started");
        HistoryRequest { token, conversation_id: conversation, page: 0, size }
    }

    /// Apply a loaded page (newest first).
    ///
    /// Live messages pushed while the fetch was pending stay in front when
    /// they are newer than the newest entry of the page.
    pub fn apply_history(&mut self, token: HistoryToken, page: Vec<Message>) -> HistoryOutcome {
        if self.pending != Some(token) {
            tracing::debug!(token = token.0, "discarding stale history page");
            return HistoryOutcome::Stale;
        }
        self.pending = None;

        let mut merged: VecDeque<Message> = match page.first() {
            Some(newest) => self.messages.drain(..).filter(|m| m.timestamp > newest.timestamp).collect(),
            None => self.messages.drain(..).collect(),
        };
        merged.extend(page);
        self.messages = merged;

        tracing::debug!(token = token.0, count = self.messages.len(), "history applied");
        HistoryOutcome::Applied
    }

    /// The fetch for `token` failed.
    ///
    /// Returns `true` if it was the current load; the timeline keeps
    /// whatever it holds.
    pub fn fail_history(&mut self, token: HistoryToken) -> bool {
        if self.pending != Some(token) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Prepend a live message.
    ///
    /// Returns `false`, leaving the timeline untouched, when the message
    /// belongs to a different conversation.
    pub fn append_live(&mut self, message: Message) -> bool {
        if self.conversation != Some(message.conversation_id) {
            return false;
        }
        self.messages.push_front(message);
        true
    }

    /// Forget the conversation, its messages and any pending load.
    pub fn clear(&mut self) {
        // Generation keeps counting so earlier tokens stay stale.
        self.conversation = None;
        self.messages.clear();
        self.pending = None;
        self.input.clear();
    }

    /// Replace the input buffer.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Empty the input buffer.
    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    /// Conversation currently loaded.
    pub fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    /// Messages, newest first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Newest message.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Oldest message held.
    pub fn oldest(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages are held.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a history load is pending.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Token of the pending history load.
    pub fn pending_token(&self) -> Option<HistoryToken> {
        self.pending
    }

    /// Current input buffer.
    pub fn input(&self) -> &str {
        &self.input
    }
}
