//! Conversation directory.
//!
//! The reconciled, newest-first list of known conversations. Entries come
//! from the snapshot fetch and from live creation notifications; order
//! changes only when a conversation is added, never on message activity.
//!
//! # Naming
//!
//! A conversation without messages is a *placeholder* showing
//! [`PLACEHOLDER_NAME`]. The first message it acquires gives it a permanent
//! name (see [`derive_name`]). The transition is one-way: a named
//! conversation is never renamed and never becomes a placeholder again.
//!
//! # Single placeholder
//!
//! At most one placeholder exists at a time. Creation is refused while one
//! exists (the caller selects it instead). When an external source adds a
//! second placeholder anyway, the newer one is kept and the older one is
//! retired from the local view.

use std::collections::HashSet;

use chatsync_proto::{ConversationCreated, ConversationId, ConversationSummary};

/// Display name of a conversation that has no messages yet.
pub const PLACEHOLDER_NAME: &str = "new conversation";

/// Characters kept from the first message when deriving a name.
pub const NAME_LIMIT: usize = 15;

/// Derive a display name from message content.
///
/// Content longer than [`NAME_LIMIT`] characters is cut to that many
/// characters followed by `…`; shorter content is used as is.
pub fn derive_name(content: &str) -> String {
    match content.char_indices().nth(NAME_LIMIT) {
        Some((cut, _)) => format!("{}…", &content[..cut]),
        None => content.to_owned(),
    }
}

/// A known conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Name shown in the directory.
    pub display_name: String,
    /// `true` until the conversation acquires its first message.
    pub is_placeholder: bool,
}

impl Conversation {
    /// Placeholder conversation with the sentinel name.
    pub fn placeholder(id: ConversationId) -> Self {
        Self { id, display_name: PLACEHOLDER_NAME.to_owned(), is_placeholder: true }
    }

    /// Conversation named after `content`.
    pub fn named(id: ConversationId, content: &str) -> Self {
        Self { id, display_name: derive_name(content), is_placeholder: false }
    }
}

/// Result of [`Directory::create_conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A placeholder already exists; select it instead of creating.
    Existing(ConversationId),
    /// A creation request must be issued. The conversation arrives later
    /// through the creation feed.
    Requested,
    /// A creation request is already in flight.
    InFlight,
}

/// Result of applying a creation notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationApplied {
    /// The conversation was new and has been prepended.
    pub inserted: bool,
    /// Older placeholder retired to keep a single placeholder.
    pub superseded: Option<ConversationId>,
}

/// Ordered conversation directory.
#[derive(Debug, Default)]
pub struct Directory {
    conversations: Vec<Conversation>,
    creation_in_flight: bool,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the snapshot fetched from the server.
    ///
    /// The server lists conversations oldest first; the directory keeps them
    /// newest first. Entries added by creation notifications that the
    /// snapshot does not know about yet stay in front.
    pub fn load_snapshot(&mut self, snapshot: Vec<ConversationSummary>) -> &[Conversation] {
        let known: HashSet<ConversationId> = snapshot.iter().map(|s| s.id).collect();
        let mut merged: Vec<Conversation> =
            self.conversations.drain(..).filter(|c| !known.contains(&c.id)).collect();

        merged.extend(snapshot.into_iter().rev().map(|summary| match summary.last_message {
            Some(message) => Conversation::named(summary.id, &message.content),
            None => Conversation::placeholder(summary.id),
        }));

        self.conversations = merged;
        let retired = self.retire_extra_placeholders();
        if !retired.is_empty() {
            tracing::debug!(?retired, "retired older placeholders from snapshot");
        }
        tracing::debug!(count = self.conversations.len(), "snapshot loaded");
        &self.conversations
    }

    /// Apply a creation notification.
    ///
    /// Ids already present are ignored, so notifications for conversations
    /// this client already knows never produce duplicates.
    pub fn apply_creation_event(&mut self, event: &ConversationCreated) -> CreationApplied {
        let id = event.conversation_id;
        if self.contains(id) {
            tracing::debug!(conversation_id = %id, "duplicate creation notice ignored");
            return CreationApplied::default();
        }

        self.conversations.insert(0, Conversation::placeholder(id));
        let superseded = self.retire_extra_placeholders().first().copied();
        tracing::debug!(conversation_id = %id, ?superseded, "conversation created");
        CreationApplied { inserted: true, superseded }
    }

    /// Give a placeholder its permanent name from its first message.
    ///
    /// Returns `true` if the conversation was renamed. Named conversations and
    /// unknown ids are left untouched.
    pub fn apply_first_message_naming(&mut self, id: ConversationId, content: &str) -> bool {
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        if !conversation.is_placeholder {
            return false;
        }

        conversation.display_name = derive_name(content);
        conversation.is_placeholder = false;
        tracing::debug!(conversation_id = %id, name = %conversation.display_name, "conversation named");
        true
    }

    /// Decide how to satisfy a "new conversation" request.
    pub fn create_conversation(&mut self) -> CreateOutcome {
        if let Some(existing) = self.placeholder() {
            return CreateOutcome::Existing(existing.id);
        }
        if self.creation_in_flight {
            return CreateOutcome::InFlight;
        }
        self.creation_in_flight = true;
        CreateOutcome::Requested
    }

    /// The creation request completed (successfully or not).
    pub fn creation_finished(&mut self) {
        self.creation_in_flight = false;
    }

    /// Whether the creation affordance is enabled.
    pub fn can_create(&self) -> bool {
        !self.creation_in_flight && self.placeholder().is_none()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.creation_in_flight = false;
    }

    /// Keep only the newest placeholder; returns the ids retired.
    fn retire_extra_placeholders(&mut self) -> Vec<ConversationId> {
        let mut seen = false;
        let mut retired = Vec::new();
        self.conversations.retain(|c| {
            if !c.is_placeholder {
                return true;
            }
            if seen {
                retired.push(c.id);
                return false;
            }
            seen = true;
            true
        });
        retired
    }

    /// Conversations, newest first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversation with `id`.
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: ConversationId) -> bool {
        self.get(id).is_some()
    }

    /// Newest conversation.
    pub fn first(&self) -> Option<&Conversation> {
        self.conversations.first()
    }

    /// The placeholder conversation, if one exists.
    pub fn placeholder(&self) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.is_placeholder)
    }

    /// Whether a creation request is in flight.
    pub fn is_creation_in_flight(&self) -> bool {
        self.creation_in_flight
    }

    /// Number of conversations.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
