//! Session error taxonomy.

use std::fmt;

use chatsync_proto::ProtocolError;
use thiserror::Error;

/// Which collaborator fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// Identity resolution.
    Identity,
    /// Conversation snapshot.
    Snapshot,
    /// Message history page.
    History,
    /// Conversation creation request.
    Creation,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity",
            Self::Snapshot => "snapshot",
            Self::History => "history",
            Self::Creation => "creation",
        })
    }
}

/// Failure reported by a request/response collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct FetchError {
    /// Human-readable cause.
    pub detail: String,
}

impl FetchError {
    /// Fetch error with the given cause.
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Kind of a transport error notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Credential refused at connect time. Fatal for the session.
    AuthRejected,
    /// Link lost without an explicit disconnect. Reconnection follows.
    TransportDropped,
}

/// Errors reported upward by the session.
///
/// None of these corrupt component state: the component that failed keeps
/// its prior state and the error is surfaced for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A snapshot, history, identity or creation fetch failed. Not retried.
    #[error("{kind} fetch failed: {detail}")]
    TransientFetch {
        /// Which fetch failed.
        kind: FetchKind,
        /// Cause reported by the collaborator.
        detail: String,
    },

    /// Credential was refused by the broker; the session was torn down.
    #[error("credential rejected: {detail}")]
    AuthRejected {
        /// Broker-provided reason.
        detail: String,
    },

    /// Live link dropped; a reconnection is scheduled.
    #[error("transport dropped: {detail}")]
    TransportDropped {
        /// Cause of the drop.
        detail: String,
    },

    /// User action not valid in the current state. Ignored, never shown.
    #[error("invalid action: {reason}")]
    InvalidAction {
        /// Why the action was refused.
        reason: &'static str,
    },

    /// Pushed payload could not be decoded.
    #[error("protocol error: {detail}")]
    Protocol {
        /// Decoder message.
        detail: String,
    },
}

impl SessionError {
    /// Transient fetch failure of `kind`.
    pub fn fetch(kind: FetchKind, error: &FetchError) -> Self {
        Self::TransientFetch { kind, detail: error.detail.clone() }
    }

    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol { detail: err.to_string() }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol { detail: err.to_string() }
    }
}
