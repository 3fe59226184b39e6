//! In-memory chat server for simulation.
//!
//! `SimServer` plays both external collaborators of the session: the HTTP
//! endpoints (identity, conversation list, history, creation) and the STOMP
//! broker on the persistent link. Tests drive it explicitly; nothing runs in
//! the background.
//!
//! Frames the broker wants to deliver are queued as [`ServerPush`] and
//! collected by the driver with [`SimServer::take_pushes`].

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use chatsync_client::{ConnectionHandle, Credential, FetchError, HistoryRequest};
use chatsync_proto::{
    Command, ConversationCreated, ConversationId, ConversationSummary, Frame, Identity, Message,
    OutgoingMessage, SEND_MESSAGE_DESTINATION, SUBSCRIBE_CREATIONS_DESTINATION, Topic,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Name the server gives conversations it creates.
pub const SEED_NAME: &str = "New chat";

/// Something the broker sends towards a client link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPush {
    /// Text frame for the link of `handle`.
    Frame {
        /// Target link.
        handle: ConnectionHandle,
        /// Encoded STOMP frame.
        text: String,
    },
    /// The link of `handle` was cut.
    Closed {
        /// Target link.
        handle: ConnectionHandle,
        /// Cause.
        detail: String,
    },
}

struct StoredConversation {
    id: ConversationId,
    /// Chronological order.
    messages: Vec<Message>,
}

#[derive(Default)]
struct SimLink {
    connected: bool,
    /// `(subscription id, destination)` in subscription order.
    subscriptions: Vec<(String, String)>,
}

/// In-memory chat server for one user.
pub struct SimServer {
    username: String,
    token: String,
    /// Creation order; the conversation list is reported newest-last.
    conversations: Vec<StoredConversation>,
    next_conversation_id: u64,
    links: BTreeMap<ConnectionHandle, SimLink>,
    outbox: VecDeque<ServerPush>,
    creation_registrations: usize,
    clock: NaiveDateTime,
    next_message_id: u64,
    refuse_links: bool,
}

/// Server shared between a test and its driver.
pub type SharedSimServer = Arc<Mutex<SimServer>>;

/// Create a [`SharedSimServer`] for `username` accepting `token`.
pub fn create_shared_server(username: &str, token: &str) -> SharedSimServer {
    Arc::new(Mutex::new(SimServer::new(username, token)))
}

impl SimServer {
    /// Server for `username` accepting bearer `token`.
    pub fn new(username: &str, token: &str) -> Self {
        let clock = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|day| day.and_hms_opt(9, 0, 0))
            .unwrap_or_default();

        Self {
            username: username.to_owned(),
            token: token.to_owned(),
            conversations: Vec::new(),
            next_conversation_id: 1,
            links: BTreeMap::new(),
            outbox: VecDeque::new(),
            creation_registrations: 0,
            clock,
            next_message_id: 1,
            refuse_links: false,
        }
    }

    /// Add an empty conversation without notifying anyone.
    pub fn add_conversation(&mut self) -> ConversationId {
        let id = ConversationId(self.next_conversation_id);
        self.next_conversation_id += 1;
        self.conversations.push(StoredConversation { id, messages: Vec::new() });
        id
    }

    /// Store a message from `sender` and deliver it to subscribers.
    ///
    /// Returns `None` if the conversation does not exist.
    pub fn post_message(
        &mut self,
        conversation_id: ConversationId,
        sender: &str,
        content: &str,
    ) -> Option<Message> {
        let timestamp = self.tick_clock();
        let conversation = self.conversations.iter_mut().find(|c| c.id == conversation_id)?;
        let message = Message {
            sender: Identity::new(sender),
            content: content.to_owned(),
            timestamp,
            conversation_id,
            attachment_url: None,
        };
        conversation.messages.push(message.clone());

        match serde_json::to_string(&message) {
            Ok(body) => self.fan_out(&Topic::Conversation(conversation_id).destination(), &body),
            Err(e) => tracing::warn!(error = %e, "message encoding failed"),
        }
        Some(message)
    }

    /// Create a conversation as if requested from another device.
    ///
    /// The creation notice goes out like for a request from this client.
    pub fn announce_creation(&mut self) -> ConversationId {
        let id = self.add_conversation();
        self.notify_creation(id);
        id
    }

    /// Change the accepted token. Existing links stay up.
    pub fn rotate_token(&mut self, token: &str) {
        token.clone_into(&mut self.token);
    }

    /// Refuse every new link at the socket level.
    pub fn set_refuse_links(&mut self, refuse: bool) {
        self.refuse_links = refuse;
    }

    /// `POST /auth/who-am-i`.
    pub fn who_am_i(&self, credential: Option<&Credential>) -> Result<Identity, FetchError> {
        self.authorize(credential)?;
        Ok(Identity::new(self.username.clone()))
    }

    /// `GET /api/chat-rooms/my`, newest-last.
    pub fn my_conversations(
        &self,
        credential: Option<&Credential>,
    ) -> Result<Vec<ConversationSummary>, FetchError> {
        self.authorize(credential)?;
        Ok(self
            .conversations
            .iter()
            .map(|c| ConversationSummary { id: c.id, last_message: c.messages.last().cloned() })
            .collect())
    }

    /// `GET /api/chat-messages/{id}` sorted newest first.
    pub fn history(
        &self,
        credential: Option<&Credential>,
        request: &HistoryRequest,
    ) -> Result<Vec<Message>, FetchError> {
        self.authorize(credential)?;
        let conversation = self
            .conversations
            .iter()
            .find(|c| c.id == request.conversation_id)
            .ok_or_else(|| FetchError::new("404 Not Found"))?;

        let size = request.size as usize;
        let skip = request.page as usize * size;
        Ok(conversation.messages.iter().rev().skip(skip).take(size).cloned().collect())
    }

    /// `POST /api/chat-rooms/chat-ai`.
    ///
    /// The new conversation is announced on the creation feed before this
    /// returns, the same ordering a broker on the server's side produces.
    pub fn create_conversation(
        &mut self,
        credential: Option<&Credential>,
    ) -> Result<ConversationId, FetchError> {
        self.authorize(credential)?;
        Ok(self.announce_creation())
    }

    /// Open the socket of `handle`.
    ///
    /// Fails with the HTTP status text when links are refused or the
    /// credential does not match.
    pub fn open_link(&mut self, handle: ConnectionHandle, credential: &Credential) -> Result<(), String> {
        if self.refuse_links || credential.expose() != self.token {
            return Err("HTTP 401 Unauthorized".to_owned());
        }
        self.links.insert(handle, SimLink::default());
        Ok(())
    }

    /// Client closed the socket of `handle`.
    pub fn close_link(&mut self, handle: ConnectionHandle) {
        self.links.remove(&handle);
        self.outbox.retain(|push| push_handle(push) != handle);
    }

    /// Cut the socket of `handle` from the server side.
    ///
    /// Returns `false` if no such link was open.
    pub fn drop_link(&mut self, handle: ConnectionHandle) -> bool {
        if self.links.remove(&handle).is_none() {
            return false;
        }
        self.outbox.retain(|push| push_handle(push) != handle);
        self.outbox.push_back(ServerPush::Closed { handle, detail: "connection reset".to_owned() });
        true
    }

    /// Frame text sent by the client on the link of `handle`.
    pub fn receive(&mut self, handle: ConnectionHandle, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%handle, error = %e, "malformed client frame");
                return;
            },
        };
        let Some(link) = self.links.get_mut(&handle) else {
            tracing::debug!(%handle, command = %frame.command, "frame on closed link dropped");
            return;
        };

        match frame.command {
            Command::Connect => {
                let expected = format!("Bearer {}", self.token);
                if frame.header("Authorization") == Some(expected.as_str()) {
                    link.connected = true;
                    self.push_frame(handle, &Frame::new(Command::Connected).with_header("version", "1.2"));
                } else {
                    self.push_frame(
                        handle,
                        &Frame::new(Command::Error).with_header("message", "invalid credential"),
                    );
                    self.links.remove(&handle);
                }
            },
            Command::Subscribe if link.connected => {
                if let (Some(id), Some(destination)) = (frame.header("id"), frame.header("destination")) {
                    link.subscriptions.push((id.to_owned(), destination.to_owned()));
                }
            },
            Command::Unsubscribe if link.connected => {
                if let Some(id) = frame.header("id") {
                    link.subscriptions.retain(|(sub, _)| sub != id);
                }
            },
            Command::Send if link.connected => self.handle_send(handle, &frame),
            Command::Disconnect => {
                self.links.remove(&handle);
            },
            command => tracing::debug!(%handle, %command, "client frame ignored"),
        }
    }

    fn handle_send(&mut self, handle: ConnectionHandle, frame: &Frame) {
        match frame.header("destination") {
            Some(SEND_MESSAGE_DESTINATION) => {
                let outgoing: OutgoingMessage = match serde_json::from_str(&frame.body) {
                    Ok(outgoing) => outgoing,
                    Err(e) => {
                        tracing::warn!(%handle, error = %e, "bad send-message body");
                        return;
                    },
                };
                let sender = self.username.clone();
                if self.post_message(outgoing.conversation_id, &sender, &outgoing.content).is_none() {
                    tracing::warn!(%handle, conversation_id = %outgoing.conversation_id, "send to unknown conversation");
                }
            },
            Some(SUBSCRIBE_CREATIONS_DESTINATION) => self.creation_registrations += 1,
            other => tracing::debug!(%handle, destination = ?other, "send to unknown destination"),
        }
    }

    /// Take every queued push in order.
    pub fn take_pushes(&mut self) -> Vec<ServerPush> {
        self.outbox.drain(..).collect()
    }

    /// Stored messages of a conversation, oldest first.
    pub fn messages(&self, conversation_id: ConversationId) -> &[Message] {
        self.conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map_or(&[], |c| c.messages.as_slice())
    }

    /// Conversation ids in creation order.
    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        self.conversations.iter().map(|c| c.id).collect()
    }

    /// Destinations the link of `handle` is subscribed to.
    pub fn subscriptions(&self, handle: ConnectionHandle) -> Vec<String> {
        self.links
            .get(&handle)
            .map(|link| link.subscriptions.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    /// Destinations of every link, by link.
    pub fn all_subscriptions(&self) -> Vec<(ConnectionHandle, Vec<String>)> {
        self.links.keys().map(|handle| (*handle, self.subscriptions(*handle))).collect()
    }

    /// Whether the link of `handle` completed the STOMP handshake.
    pub fn is_connected(&self, handle: ConnectionHandle) -> bool {
        self.links.get(&handle).is_some_and(|link| link.connected)
    }

    /// Number of open links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// How many times a client registered for creation notices.
    pub fn creation_registrations(&self) -> usize {
        self.creation_registrations
    }

    fn authorize(&self, credential: Option<&Credential>) -> Result<(), FetchError> {
        match credential {
            Some(credential) if credential.expose() == self.token => Ok(()),
            _ => Err(FetchError::new("401 Unauthorized")),
        }
    }

    fn notify_creation(&mut self, id: ConversationId) {
        let notice = ConversationCreated { conversation_id: id, seed_name: SEED_NAME.to_owned() };
        let destination = Topic::ConversationCreated { username: self.username.clone() }.destination();
        match serde_json::to_string(&notice) {
            Ok(body) => self.fan_out(&destination, &body),
            Err(e) => tracing::warn!(error = %e, "creation notice encoding failed"),
        }
    }

    fn fan_out(&mut self, destination: &str, body: &str) {
        let mut frames = Vec::new();
        for (handle, link) in &self.links {
            for (subscription, subscribed) in &link.subscriptions {
                if subscribed != destination {
                    continue;
                }
                let frame = Frame::new(Command::Message)
                    .with_header("subscription", subscription.clone())
                    .with_header("destination", destination)
                    .with_header("message-id", self.next_message_id.to_string())
                    .with_body(body);
                self.next_message_id += 1;
                frames.push((*handle, frame));
            }
        }
        for (handle, frame) in frames {
            self.push_frame(handle, &frame);
        }
    }

    fn push_frame(&mut self, handle: ConnectionHandle, frame: &Frame) {
        self.outbox.push_back(ServerPush::Frame { handle, text: frame.encode() });
    }

    fn tick_clock(&mut self) -> NaiveDateTime {
        self.clock += TimeDelta::seconds(1);
        self.clock
    }
}

fn push_handle(push: &ServerPush) -> ConnectionHandle {
    match push {
        ServerPush::Frame { handle, .. } | ServerPush::Closed { handle, .. } => *handle,
    }
}

#[cfg(test)]
mod tests {
    use chatsync_client::HistoryToken;

    use super::*;

    const HANDLE: ConnectionHandle = ConnectionHandle(1);

    fn connected_server() -> SimServer {
        let mut server = SimServer::new("alice", "tok");
        server.open_link(HANDLE, &Credential::new("tok")).unwrap();
        server.receive(HANDLE, &Frame::connect("localhost", "tok").encode());
        server
    }

    fn decoded(pushes: Vec<ServerPush>) -> Vec<Frame> {
        pushes
            .into_iter()
            .filter_map(|push| match push {
                ServerPush::Frame { text, .. } => Frame::decode(&text).unwrap(),
                ServerPush::Closed { .. } => None,
            })
            .collect()
    }

    #[test]
    fn connect_with_valid_token_is_acknowledged() {
        let mut server = connected_server();

        let frames = decoded(server.take_pushes());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Connected);
        assert!(server.is_connected(HANDLE));
    }

    #[test]
    fn connect_with_stale_token_gets_error_and_loses_link() {
        let mut server = SimServer::new("alice", "tok");
        server.open_link(HANDLE, &Credential::new("tok")).unwrap();
        server.rotate_token("other");
        server.receive(HANDLE, &Frame::connect("localhost", "tok").encode());

        let frames = decoded(server.take_pushes());
        assert_eq!(frames[0].command, Command::Error);
        assert_eq!(server.link_count(), 0);
    }

    #[test]
    fn socket_refused_for_wrong_token() {
        let mut server = SimServer::new("alice", "tok");
        assert!(server.open_link(HANDLE, &Credential::new("nope")).is_err());
    }

    #[test]
    fn posted_message_reaches_subscribers_only() {
        let mut server = connected_server();
        let first = server.add_conversation();
        let second = server.add_conversation();
        server.receive(HANDLE, &Frame::subscribe("sub-0", &Topic::Conversation(first).destination()).encode());
        server.take_pushes();

        server.post_message(second, "bob", "not for you");
        assert!(server.take_pushes().is_empty());

        server.post_message(first, "bob", "hi");
        let frames = decoded(server.take_pushes());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header("subscription"), Some("sub-0"));
        let message: Message = serde_json::from_str(&frames[0].body).unwrap();
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn send_action_stores_message_as_this_user() {
        let mut server = connected_server();
        let id = server.add_conversation();
        let body = serde_json::to_string(&OutgoingMessage {
            content: "hello".into(),
            conversation_id: id,
            attachment_url: None,
        })
        .unwrap();
        server.receive(HANDLE, &Frame::send(SEND_MESSAGE_DESTINATION, body).encode());

        assert_eq!(server.messages(id).len(), 1);
        assert_eq!(server.messages(id)[0].sender_username(), "alice");
    }

    #[test]
    fn history_pages_newest_first() {
        let mut server = SimServer::new("alice", "tok");
        let id = server.add_conversation();
        for i in 0..5 {
            server.post_message(id, "bob", &format!("m{i}"));
        }
        let credential = Credential::new("tok");

        let request = HistoryRequest { token: HistoryToken(1), conversation_id: id, page: 0, size: 3 };
        let page: Vec<_> = server
            .history(Some(&credential), &request)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(page, ["m4", "m3", "m2"]);

        let request = HistoryRequest { page: 1, ..request };
        assert_eq!(server.history(Some(&credential), &request).unwrap().len(), 2);
    }

    #[test]
    fn fetches_require_the_token() {
        let server = SimServer::new("alice", "tok");
        assert!(server.who_am_i(None).is_err());
        assert!(server.my_conversations(Some(&Credential::new("bad"))).is_err());
        assert_eq!(server.who_am_i(Some(&Credential::new("tok"))).unwrap(), Identity::new("alice"));
    }

    #[test]
    fn creation_notice_goes_to_identity_feed() {
        let mut server = connected_server();
        let feed = Topic::ConversationCreated { username: "alice".into() }.destination();
        server.receive(HANDLE, &Frame::subscribe("sub-1", &feed).encode());
        server.take_pushes();

        let id = server.create_conversation(Some(&Credential::new("tok"))).unwrap();

        let frames = decoded(server.take_pushes());
        assert_eq!(frames.len(), 1);
        let notice: ConversationCreated = serde_json::from_str(&frames[0].body).unwrap();
        assert_eq!(notice.conversation_id, id);
        assert_eq!(notice.seed_name, SEED_NAME);
    }

    #[test]
    fn dropped_link_discards_undelivered_frames() {
        let mut server = connected_server();
        assert!(server.drop_link(HANDLE));

        let pushes = server.take_pushes();
        assert_eq!(pushes, vec![ServerPush::Closed { handle: HANDLE, detail: "connection reset".into() }]);
        assert!(!server.drop_link(HANDLE));
    }
}
