//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::HashMap;

use chatsync_client::{
    ConnectionHandle, Conversation, Environment, Session, SessionState,
};
use chatsync_proto::ConversationId;

use crate::SimServer;

/// Snapshot of the entire system state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-session state snapshots.
    pub sessions: Vec<SessionSnapshot>,
    /// Broker-side view of the links.
    pub broker: BrokerSnapshot,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no sessions, no links).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single session.
    pub fn single(session: SessionSnapshot) -> Self {
        Self { sessions: vec![session], broker: BrokerSnapshot::default() }
    }

    /// Attach the broker view.
    #[must_use]
    pub fn with_broker(mut self, broker: BrokerSnapshot) -> Self {
        self.broker = broker;
        self
    }
}

/// Snapshot of one session's observable state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session identifier within the simulation.
    pub id: u64,
    /// Lifecycle state.
    pub state: SessionState,
    /// Selected conversation.
    pub selected: Option<ConversationId>,
    /// Directory entries in display order.
    pub conversations: Vec<Conversation>,
    /// Conversation the timeline belongs to.
    pub timeline_conversation: Option<ConversationId>,
    /// Number of messages in the timeline.
    pub timeline_len: usize,
    /// Display names seen per conversation across snapshots, oldest first.
    /// `None` records a placeholder observation.
    pub name_history: HashMap<ConversationId, Vec<Option<String>>>,
}

impl SessionSnapshot {
    /// Capture the observable state of `session`.
    pub fn from_session<E: Environment>(id: u64, session: &Session<E>) -> Self {
        Self {
            id,
            state: session.state(),
            selected: session.selected(),
            conversations: session.directory().conversations().to_vec(),
            timeline_conversation: session.timeline().conversation(),
            timeline_len: session.timeline().len(),
            name_history: HashMap::new(),
        }
    }

    /// Append the current names to `history` and attach it.
    #[must_use]
    pub fn with_name_history(
        mut self,
        history: &mut HashMap<ConversationId, Vec<Option<String>>>,
    ) -> Self {
        for conversation in &self.conversations {
            let name = (!conversation.is_placeholder).then(|| conversation.display_name.clone());
            let seen = history.entry(conversation.id).or_default();
            if seen.last() != Some(&name) {
                seen.push(name);
            }
        }
        self.name_history = history.clone();
        self
    }
}

/// Broker-side view of every open link.
#[derive(Debug, Clone, Default)]
pub struct BrokerSnapshot {
    /// Open links with their subscribed destinations.
    pub links: Vec<LinkSnapshot>,
}

impl BrokerSnapshot {
    /// Capture the links of `server`.
    pub fn from_server(server: &SimServer) -> Self {
        let links = server
            .all_subscriptions()
            .into_iter()
            .map(|(handle, destinations)| LinkSnapshot { handle, destinations })
            .collect();
        Self { links }
    }
}

/// One link as the broker sees it.
#[derive(Debug, Clone)]
pub struct LinkSnapshot {
    /// Link identifier.
    pub handle: ConnectionHandle,
    /// Subscribed destinations in subscription order.
    pub destinations: Vec<String>,
}
