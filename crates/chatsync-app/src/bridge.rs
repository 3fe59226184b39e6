//! Session-to-link translation layer.
//!
//! The [`Bridge`] sits between the [`chatsync_client::Session`] and the raw
//! text link provided by a driver.
//!
//! # Responsibilities
//!
//! - Runs the STOMP handshake: `CONNECT` once the socket is up, `CONNECTED`
//!   becomes [`SessionEvent::TransportOpened`].
//! - Classifies failures: `ERROR` before `CONNECTED` is a rejected
//!   credential, `ERROR` after it is a dropped link.
//! - Converts subscribe, unsubscribe and publish actions into frames,
//!   accumulated for the driver to send in the next I/O cycle.
//! - Routes `MESSAGE` frames to [`SessionEvent::Delivery`] by their
//!   `subscription` header.

use chatsync_client::{ConnectionHandle, Credential, SessionEvent, SubscriptionId};
use chatsync_proto::{Command, Frame, Outbound, Topic};

/// Progress of the current link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPhase {
    /// No link.
    Idle,
    /// Socket is being opened.
    Opening {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
    },
    /// `CONNECT` sent, waiting for `CONNECTED`.
    Handshaking {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
    },
    /// Handshake complete.
    Established {
        /// Connection the link belongs to.
        handle: ConnectionHandle,
    },
}

impl LinkPhase {
    /// Connection owning the link, if any.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        match self {
            Self::Idle => None,
            Self::Opening { handle } | Self::Handshaking { handle } | Self::Established { handle } => {
                Some(*handle)
            },
        }
    }
}

/// Bridge between the session and the broker link.
#[derive(Debug)]
pub struct Bridge {
    phase: LinkPhase,
    host: String,
    credential: Option<Credential>,
    outgoing: Vec<(ConnectionHandle, Frame)>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// Create an idle bridge.
    pub fn new() -> Self {
        Self { phase: LinkPhase::Idle, host: String::new(), credential: None, outgoing: Vec::new() }
    }

    /// A link for `handle` is being opened to `endpoint`.
    pub fn open(&mut self, handle: ConnectionHandle, endpoint: &str, credential: Credential) {
        self.phase = LinkPhase::Opening { handle };
        self.host = host_of(endpoint).to_owned();
        self.credential = Some(credential);
        tracing::debug!(%handle, host = %self.host, "link opening");
    }

    /// Socket is up: send `CONNECT`.
    pub fn link_up(&mut self, handle: ConnectionHandle) {
        if self.phase != (LinkPhase::Opening { handle }) {
            tracing::debug!(%handle, "link up for stale attempt ignored");
            return;
        }
        let Some(credential) = &self.credential else {
            return;
        };

        let connect = Frame::connect(&self.host, credential.expose());
        self.outgoing.push((handle, connect));
        self.phase = LinkPhase::Handshaking { handle };
    }

    /// Server refused the credential while the socket was opening.
    pub fn link_refused<I>(&mut self, handle: ConnectionHandle, detail: String) -> Option<SessionEvent<I>> {
        if !self.owns(handle) {
            return None;
        }
        self.reset();
        Some(SessionEvent::TransportRejected { handle, detail })
    }

    /// Socket failed to open or was lost.
    pub fn link_down<I>(&mut self, handle: ConnectionHandle, detail: String) -> Option<SessionEvent<I>> {
        if !self.owns(handle) {
            tracing::debug!(%handle, "link down for stale attempt ignored");
            return None;
        }
        self.reset();
        Some(SessionEvent::TransportClosed { handle, detail })
    }

    /// Interpret a text frame received on the link of `handle`.
    ///
    /// Malformed frames and frames unexpected in the current phase are
    /// logged and dropped.
    pub fn handle_frame<I>(&mut self, handle: ConnectionHandle, text: &str) -> Option<SessionEvent<I>> {
        if !self.owns(handle) {
            return None;
        }
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%handle, error = %e, "malformed frame dropped");
                return None;
            },
        };

        match (self.phase.clone(), frame.command) {
            (LinkPhase::Handshaking { .. }, Command::Connected) => {
                tracing::debug!(%handle, version = ?frame.header("version"), "handshake complete");
                self.phase = LinkPhase::Established { handle };
                Some(SessionEvent::TransportOpened { handle })
            },
            (LinkPhase::Handshaking { .. }, Command::Error) => {
                self.reset();
                Some(SessionEvent::TransportRejected { handle, detail: error_detail(&frame) })
            },
            (LinkPhase::Established { .. }, Command::Error) => {
                self.reset();
                Some(SessionEvent::TransportClosed { handle, detail: error_detail(&frame) })
            },
            (LinkPhase::Established { .. }, Command::Message) => {
                let Some(subscription) = frame.header("subscription").and_then(SubscriptionId::parse)
                else {
                    tracing::warn!(%handle, "message without subscription dropped");
                    return None;
                };
                Some(SessionEvent::Delivery { subscription, body: frame.body })
            },
            (phase, command) => {
                tracing::debug!(%handle, ?phase, %command, "unexpected frame ignored");
                None
            },
        }
    }

    /// Close the link of `handle`, sending `DISCONNECT` if the handshake had
    /// completed.
    pub fn close(&mut self, handle: ConnectionHandle) {
        if self.phase == (LinkPhase::Established { handle }) {
            self.outgoing.push((handle, Frame::disconnect()));
        }
        if self.owns(handle) {
            self.reset();
        }
    }

    /// Queue a `SUBSCRIBE`.
    pub fn subscribe(&mut self, subscription: SubscriptionId, topic: &Topic) {
        let frame = Frame::subscribe(&subscription.to_string(), &topic.destination());
        self.queue(frame);
    }

    /// Queue an `UNSUBSCRIBE`.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.queue(Frame::unsubscribe(&subscription.to_string()));
    }

    /// Queue a `SEND` for an outbound action.
    pub fn publish(&mut self, outbound: &Outbound) {
        match outbound.body() {
            Ok(body) => self.queue(Frame::send(outbound.destination(), body)),
            Err(e) => tracing::warn!(destination = outbound.destination(), error = %e, "publish dropped"),
        }
    }

    /// Take pending outgoing frames.
    pub fn take_outgoing(&mut self) -> Vec<(ConnectionHandle, Frame)> {
        std::mem::take(&mut self.outgoing)
    }

    /// Current link phase.
    pub fn phase(&self) -> &LinkPhase {
        &self.phase
    }

    fn queue(&mut self, frame: Frame) {
        match self.phase {
            LinkPhase::Established { handle } => self.outgoing.push((handle, frame)),
            _ => tracing::debug!(command = %frame.command, "link not established, frame dropped"),
        }
    }

    fn owns(&self, handle: ConnectionHandle) -> bool {
        self.phase.handle() == Some(handle)
    }

    fn reset(&mut self) {
        self.phase = LinkPhase::Idle;
        self.credential = None;
    }
}

fn error_detail(frame: &Frame) -> String {
    frame
        .header("message")
        .map(str::to_owned)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| frame.body.trim().to_owned())
}

/// Host part of a `ws://host:port/path` endpoint.
fn host_of(endpoint: &str) -> &str {
    let rest = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    authority.rsplit_once(':').map_or(authority, |(host, _)| host)
}
