//! Driver input.

use chatsync_client::{ConnectionHandle, SessionEvent};

/// Inputs a [`crate::Driver`] hands to the runtime.
///
/// Fetch completions and user intents are already session events. Link
/// activity is raw and goes through the [`crate::Bridge`] first.
#[derive(Debug, Clone)]
pub enum Input<I = std::time::Instant> {
    /// Event for the session as is.
    Session(SessionEvent<I>),
    /// Socket of `handle` opened; the STOMP handshake can start.
    LinkUp {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
    },
    /// Server refused the credential while opening the socket.
    LinkRefused {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
        /// Refusal reason.
        detail: String,
    },
    /// Socket failed to open or was lost.
    LinkDown {
        /// Connection the link belonged to.
        handle: ConnectionHandle,
        /// Cause.
        detail: String,
    },
    /// Text message received on the link.
    Frame {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
        /// Raw STOMP frame text.
        text: String,
    },
    /// Periodic timer; the runtime reads the driver clock.
    Tick,
}
