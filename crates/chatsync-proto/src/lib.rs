//! Wire protocol for chatsync.
//!
//! Defines everything that crosses a process boundary: the JSON payloads
//! exchanged with the chat server, the addressing of broker topics and
//! outbound actions, and the STOMP 1.2 text framing used on the persistent
//! link.
//!
//! # Components
//!
//! - [`model`]: identities, messages, conversation summaries and
//!   notifications
//! - [`Topic`] / [`Outbound`]: broker addressing
//! - [`Frame`]: STOMP frame codec

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
pub mod model;
mod topic;

pub use errors::ProtocolError;
pub use frame::{Command, Frame};
pub use model::{
    ConversationCreated, ConversationId, ConversationSummary, HistoryPage, Identity, Message,
    OutgoingMessage,
};
pub use topic::{Outbound, SEND_MESSAGE_DESTINATION, SUBSCRIBE_CREATIONS_DESTINATION, Topic};
