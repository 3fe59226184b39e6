//! Broker addressing.
//!
//! Topics are what a client subscribes to; outbound actions are what it
//! publishes. Both render to STOMP destinations.

use std::fmt;

use crate::{ConversationId, OutgoingMessage, ProtocolError};

/// Destination of the send-message action.
pub const SEND_MESSAGE_DESTINATION: &str = "/action/send-message";

/// Destination of the creation-feed registration action.
pub const SUBSCRIBE_CREATIONS_DESTINATION: &str = "/action/subscribe-creations";

/// A subscribable broker topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Live messages of one conversation.
    Conversation(ConversationId),
    /// Creation notifications addressed to one identity.
    ConversationCreated {
        /// Identity the feed belongs to.
        username: String,
    },
}

impl Topic {
    /// STOMP destination for this topic.
    pub fn destination(&self) -> String {
        match self {
            Self::Conversation(id) => format!("/conversation/{id}"),
            Self::ConversationCreated { username } => {
                format!("/identity/{username}/conversation-created")
            },
        }
    }

    /// Whether this is a per-conversation topic.
    pub fn is_conversation(&self) -> bool {
        matches!(self, Self::Conversation(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())
    }
}

/// An outbound, fire-and-forget action published on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Post a message to a conversation.
    SendMessage(OutgoingMessage),
    /// Ask the server to deliver creation notifications to this client.
    SubscribeCreations,
}

impl Outbound {
    /// STOMP destination of the action.
    pub fn destination(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => SEND_MESSAGE_DESTINATION,
            Self::SubscribeCreations => SUBSCRIBE_CREATIONS_DESTINATION,
        }
    }

    /// JSON body of the action.
    pub fn body(&self) -> Result<String, ProtocolError> {
        match self {
            Self::SendMessage(message) => Ok(serde_json::to_string(message)?),
            Self::SubscribeCreations => Ok("{}".to_owned()),
        }
    }
}
