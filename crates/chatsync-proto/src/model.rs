//! JSON payloads exchanged with the chat server.
//!
//! Field names follow the server's camelCase JSON. Conversations are called
//! "chats" on the wire (`chatId`, `chatName`), which the serde renames hide.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Server-assigned conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConversationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The user behind the bearer credential.
///
/// Also used as the sender reference embedded in messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Unique login name.
    pub username: String,
}

impl Identity {
    /// Create an identity for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }
}

/// A chat message as delivered by history fetches and live pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Author of the message.
    pub sender: Identity,
    /// Text content.
    pub content: String,
    /// Server timestamp (local date-time, no offset).
    pub timestamp: NaiveDateTime,
    /// Conversation the message belongs to.
    #[serde(rename = "chatId")]
    pub conversation_id: ConversationId,
    /// Optional link to an attached file.
    #[serde(rename = "fileUrl", default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}

impl Message {
    /// Username of the author.
    pub fn sender_username(&self) -> &str {
        &self.sender.username
    }
}

/// One entry of the conversation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Most recent message, absent for conversations without messages.
    #[serde(default)]
    pub last_message: Option<Message>,
}

/// Page wrapper returned by the history source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage<T> {
    /// Page contents in the requested sort order.
    pub content: Vec<T>,
}

/// Notification pushed on the per-identity creation feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationCreated {
    /// Identifier of the new conversation.
    #[serde(rename = "chatId")]
    pub conversation_id: ConversationId,
    /// Name the server assigned at creation time.
    #[serde(rename = "chatName", default)]
    pub seed_name: String,
}

/// Message published to the send action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Text content.
    pub content: String,
    /// Target conversation.
    #[serde(rename = "chatId")]
    pub conversation_id: ConversationId,
    /// Optional link to an attached file. Serialized as `null` when absent.
    #[serde(rename = "fileUrl")]
    pub attachment_url: Option<String>,
}
