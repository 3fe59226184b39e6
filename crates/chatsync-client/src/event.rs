//! Session events and actions.

use chatsync_proto::{ConversationId, ConversationSummary, Identity, Message, Outbound, Topic};

use crate::{
    FetchError, SessionError,
    connection::ConnectionHandle,
    credential::Credential,
    subscription::SubscriptionId,
    timeline::{HistoryRequest, HistoryToken},
};

/// Events the caller feeds into the session.
///
/// The caller is responsible for:
/// - Completing the fetches requested by [`SessionAction`]s
/// - Reporting link outcomes and pushed payloads
/// - Driving time forward via ticks
/// - Forwarding user intents
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (`tokio::time::Instant`).
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// Begin bootstrapping.
    Start,

    /// Time tick for the reconnection timer.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Identity resolution finished.
    IdentityResolved(Result<Identity, FetchError>),

    /// Snapshot fetch finished. Entries are oldest first, as served.
    SnapshotLoaded(Result<Vec<ConversationSummary>, FetchError>),

    /// History fetch finished.
    HistoryLoaded {
        /// Token from the originating [`HistoryRequest`].
        token: HistoryToken,
        /// Page contents, newest first.
        result: Result<Vec<Message>, FetchError>,
    },

    /// Creation request finished. The conversation itself arrives as a
    /// push on the creation feed.
    CreationFinished(Result<(), FetchError>),

    /// Link completed its handshake.
    TransportOpened {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
    },

    /// Link was lost or could not be opened.
    TransportClosed {
        /// Connection the link belonged to.
        handle: ConnectionHandle,
        /// Cause.
        detail: String,
    },

    /// Broker refused the credential.
    TransportRejected {
        /// Connection the link belonged to.
        handle: ConnectionHandle,
        /// Broker-provided reason.
        detail: String,
    },

    /// Payload pushed on a subscription.
    Delivery {
        /// Subscription the payload arrived on.
        subscription: SubscriptionId,
        /// JSON body.
        body: String,
    },

    /// User selected a conversation.
    Select {
        /// Conversation to open.
        conversation_id: ConversationId,
    },

    /// User edited the input buffer.
    SetInput {
        /// New buffer contents.
        text: String,
    },

    /// User wants to send a message to the selected conversation.
    Send {
        /// Message text.
        content: String,
    },

    /// User wants a new conversation.
    CreateConversation,

    /// User logged out.
    Logout,
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Resolve the identity behind the credential, then feed
    /// [`SessionEvent::IdentityResolved`].
    ResolveIdentity,

    /// Fetch the conversation snapshot, then feed
    /// [`SessionEvent::SnapshotLoaded`].
    FetchSnapshot,

    /// Fetch a history page, then feed [`SessionEvent::HistoryLoaded`].
    FetchHistory(HistoryRequest),

    /// Issue a creation request, then feed
    /// [`SessionEvent::CreationFinished`].
    RequestCreation,

    /// Open a link to the broker.
    OpenTransport {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
        /// Broker endpoint.
        endpoint: String,
        /// Credential to present in the handshake.
        credential: Credential,
    },

    /// Close the link of `handle`.
    CloseTransport {
        /// Connection to close.
        handle: ConnectionHandle,
    },

    /// Subscribe to a topic.
    Subscribe {
        /// Client-allocated subscription id.
        subscription: SubscriptionId,
        /// Topic to subscribe to.
        topic: Topic,
    },

    /// Drop a subscription.
    Unsubscribe {
        /// Subscription to drop.
        subscription: SubscriptionId,
    },

    /// Publish a fire-and-forget action on the broker.
    Publish(Outbound),

    /// Remove the stored credential.
    DiscardCredential,

    /// Surface an error for display.
    Report(SessionError),

    /// Visible state changed.
    Render,
}
