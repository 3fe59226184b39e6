//! Transport connection lifecycle.
//!
//! [`Connection`] owns the state of the single persistent broker link. It
//! never touches a socket: it emits [`ConnectionAction::Open`] and
//! [`ConnectionAction::Close`] for the driver and is told about link outcomes
//! through [`Connection::on_opened`], [`Connection::on_closed`] and
//! [`Connection::on_rejected`].
//!
//! # Reconnection
//!
//! A link lost without an explicit [`Connection::disconnect`] schedules a new
//! attempt after a fixed delay. Attempts repeat until one succeeds or the
//! caller disconnects. A rejected credential is fatal and never retried.
//!
//! The connection does not hold the credential. Whoever executes
//! [`ConnectionAction::Open`] reads it for that attempt.

use std::{fmt, time::Duration};

use crate::error::TransportErrorKind;

/// Identifies one logical connection from `connect` to `disconnect`.
///
/// Stays the same across automatic reconnections so the caller can tell
/// late link events of a torn-down connection apart from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no pending attempt.
    Disconnected,
    /// First attempt in progress.
    Connecting,
    /// Link established and authenticated.
    Connected,
    /// Link lost; waiting for or running a retry.
    Reconnecting,
}

/// Notices emitted to subscribers of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    /// Link established.
    Connected,
    /// Link no longer usable.
    Disconnected,
    /// Link failed.
    Error {
        /// Failure class.
        kind: TransportErrorKind,
        /// Cause reported by the link.
        detail: String,
    },
}

/// Actions the connection produces for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a link to `endpoint`.
    Open {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
        /// Broker endpoint.
        endpoint: String,
    },
    /// Close the link of `handle`.
    Close {
        /// Connection to close.
        handle: ConnectionHandle,
    },
    /// Tell subscribers about a transition.
    Notify(ConnectionNotice),
}

/// Transport connection state machine.
#[derive(Debug)]
pub struct Connection<I> {
    state: ConnectionState,
    handle: Option<ConnectionHandle>,
    next_handle: u64,
    endpoint: Option<String>,
    reconnect_delay: Duration,
    reconnect_at: Option<I>,
    /// An `Open` was emitted and its outcome has not arrived yet.
    link_pending: bool,
    attempts: u32,
}

impl<I> Connection<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    /// Create a disconnected connection retrying after `reconnect_delay`.
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handle: None,
            next_handle: 1,
            endpoint: None,
            reconnect_delay,
            reconnect_at: None,
            link_pending: false,
            attempts: 0,
        }
    }

    /// Start connecting to `endpoint`.
    ///
    /// While a connection exists (in any state but `Disconnected`) this is a
    /// no-op returning the existing handle.
    pub fn connect(&mut self, endpoint: &str) -> (ConnectionHandle, Vec<ConnectionAction>) {
        if let Some(handle) = self.handle {
            return (handle, Vec::new());
        }

        let handle = ConnectionHandle(self.next_handle);
        self.next_handle += 1;
        self.handle = Some(handle);
        self.endpoint = Some(endpoint.to_owned());
        self.state = ConnectionState::Connecting;
        self.attempts = 0;

        tracing::info!(%handle, endpoint, "connecting");
        (handle, self.open_action(handle).into_iter().collect())
    }

    /// Tear the connection down. Idempotent.
    ///
    /// Synchronously moves to `Disconnected` and cancels any pending retry.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let Some(handle) = self.handle.take() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if self.link_pending || self.state == ConnectionState::Connected {
            actions.push(ConnectionAction::Close { handle });
        }
        self.state = ConnectionState::Disconnected;
        self.endpoint = None;
        self.reconnect_at = None;
        self.link_pending = false;

        tracing::info!(%handle, "disconnected by request");
        actions.push(ConnectionAction::Notify(ConnectionNotice::Disconnected));
        actions
    }

    /// Link of `handle` completed its handshake.
    pub fn on_opened(&mut self, handle: ConnectionHandle) -> Vec<ConnectionAction> {
        if !self.is_current(handle) || self.state == ConnectionState::Connected {
            tracing::debug!(%handle, "ignoring open for stale link");
            return Vec::new();
        }

        self.state = ConnectionState::Connected;
        self.link_pending = false;
        self.attempts = 0;
        tracing::info!(%handle, "connected");
        vec![ConnectionAction::Notify(ConnectionNotice::Connected)]
    }

    /// Link of `handle` was lost or could not be established.
    pub fn on_closed(&mut self, handle: ConnectionHandle, detail: &str, now: I) -> Vec<ConnectionAction> {
        if !self.is_current(handle) {
            tracing::debug!(%handle, "ignoring close for stale link");
            return Vec::new();
        }

        let was_connected = self.state == ConnectionState::Connected;
        if !was_connected && !self.link_pending {
            // Retry already scheduled.
            return Vec::new();
        }

        self.state = ConnectionState::Reconnecting;
        self.link_pending = false;
        self.reconnect_at = Some(now + self.reconnect_delay);
        tracing::warn!(%handle, detail, delay = ?self.reconnect_delay, "link lost, reconnect scheduled");

        let mut actions = vec![ConnectionAction::Notify(ConnectionNotice::Error {
            kind: TransportErrorKind::TransportDropped,
            detail: detail.to_owned(),
        })];
        if was_connected {
            actions.push(ConnectionAction::Notify(ConnectionNotice::Disconnected));
        }
        actions
    }

    /// Broker refused the credential presented by `handle`'s link.
    ///
    /// Fatal: the connection is dropped with no retry.
    pub fn on_rejected(&mut self, handle: ConnectionHandle, detail: &str) -> Vec<ConnectionAction> {
        if !self.is_current(handle) {
            return Vec::new();
        }

        tracing::warn!(%handle, detail, "credential rejected");
        self.handle = None;
        self.endpoint = None;
        self.state = ConnectionState::Disconnected;
        self.reconnect_at = None;
        self.link_pending = false;

        vec![ConnectionAction::Notify(ConnectionNotice::Error {
            kind: TransportErrorKind::AuthRejected,
            detail: detail.to_owned(),
        })]
    }

    /// Fire the reconnection timer if it has expired.
    pub fn on_tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(deadline) = self.reconnect_at else {
            return Vec::new();
        };
        if now < deadline || self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        let Some(handle) = self.handle else {
            return Vec::new();
        };

        self.reconnect_at = None;
        self.attempts += 1;
        tracing::info!(%handle, attempt = self.attempts, "reconnecting");
        self.open_action(handle).into_iter().collect()
    }

    fn open_action(&mut self, handle: ConnectionHandle) -> Option<ConnectionAction> {
        let endpoint = self.endpoint.clone()?;
        self.link_pending = true;
        Some(ConnectionAction::Open { handle, endpoint })
    }

    fn is_current(&self, handle: ConnectionHandle) -> bool {
        self.handle == Some(handle)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the link is established.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Handle of the current connection. `None` when disconnected.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.handle
    }

    /// Deadline of the pending reconnection attempt, if any.
    pub fn reconnect_at(&self) -> Option<I> {
        self.reconnect_at
    }

    /// Reconnection attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
