//! Session controller.
//!
//! [`Session`] is the single consumer of [`SessionEvent`]s. It owns the four
//! component state machines, routes each event to the ones it concerns and
//! turns their outputs into [`SessionAction`]s.
//!
//! # Lifecycle
//!
//! ```text
//! Bootstrapping --(identity + snapshot done)--> Ready --(logout)--> LoggedOut
//!       |                                                               ^
//!       +----------------(logout / credential rejected)-----------------+
//! ```
//!
//! The connection is opened as soon as the identity is known. Every
//! connection attempt reads the credential store afresh; an empty store
//! counts as a rejected credential. The first
//! conversation is auto-selected on entering `Ready`, never earlier.
//! `LoggedOut` is terminal: every later event is ignored.

use std::{collections::VecDeque, sync::Arc};

use chatsync_proto::{
    ConversationCreated, ConversationId, ConversationSummary, Identity, Message, OutgoingMessage,
    Outbound,
};

use crate::{
    FetchError, FetchKind, SessionAction, SessionError, SessionEvent, TransportErrorKind,
    config::SessionConfig,
    connection::{Connection, ConnectionAction, ConnectionHandle, ConnectionNotice, ConnectionState},
    credential::CredentialStore,
    directory::{CreateOutcome, Directory},
    env::Environment,
    subscription::{Route, SubscriptionAction, SubscriptionId, Subscriptions},
    timeline::{HistoryOutcome, HistoryToken, Timeline},
};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for identity and snapshot.
    Bootstrapping,
    /// Fully operational.
    Ready,
    /// Torn down. Terminal.
    LoggedOut,
}

/// Session controller state machine.
#[derive(Debug)]
pub struct Session<E: Environment> {
    env: E,
    config: SessionConfig,
    store: Arc<dyn CredentialStore>,
    state: SessionState,
    started: bool,
    identity: Option<Identity>,
    snapshot_done: bool,
    connection: Connection<E::Instant>,
    subscriptions: Subscriptions,
    directory: Directory,
    timeline: Timeline,
    selected: Option<ConversationId>,
    /// A creation requested by this session has not been announced yet.
    awaiting_created: bool,
}

impl<E: Environment> Session<E> {
    /// Create a session presenting the credential held by `store`.
    pub fn new(env: E, config: SessionConfig, store: Arc<dyn CredentialStore>) -> Self {
        let connection = Connection::new(config.reconnect_delay);
        Self {
            env,
            config,
            store,
            state: SessionState::Bootstrapping,
            started: false,
            identity: None,
            snapshot_done: false,
            connection,
            subscriptions: Subscriptions::new(),
            directory: Directory::new(),
            timeline: Timeline::new(),
            selected: None,
            awaiting_created: false,
        }
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: SessionEvent<E::Instant>) -> Vec<SessionAction> {
        if self.state == SessionState::LoggedOut {
            tracing::debug!(?event, "session logged out, event ignored");
            return Vec::new();
        }

        match event {
            SessionEvent::Start => self.handle_start(),
            SessionEvent::Tick { now } => self.handle_tick(now),
            SessionEvent::IdentityResolved(result) => self.handle_identity(result),
            SessionEvent::SnapshotLoaded(result) => self.handle_snapshot(result),
            SessionEvent::HistoryLoaded { token, result } => self.handle_history(token, result),
            SessionEvent::CreationFinished(result) => self.handle_creation_finished(result),
            SessionEvent::TransportOpened { handle } => {
                let actions = self.connection.on_opened(handle);
                self.apply_connection(actions)
            },
            SessionEvent::TransportClosed { handle, detail } => {
                let actions = self.connection.on_closed(handle, &detail, self.env.now());
                self.apply_connection(actions)
            },
            SessionEvent::TransportRejected { handle, detail } => {
                let actions = self.connection.on_rejected(handle, &detail);
                self.apply_connection(actions)
            },
            SessionEvent::Delivery { subscription, body } => {
                self.handle_delivery(subscription, &body)
            },
            SessionEvent::Select { conversation_id } => self.handle_select(conversation_id),
            SessionEvent::SetInput { text } => {
                self.timeline.set_input(text);
                vec![SessionAction::Render]
            },
            SessionEvent::Send { content } => self.handle_send(content),
            SessionEvent::CreateConversation => self.handle_create(),
            SessionEvent::Logout => {
                tracing::info!("logging out");
                let mut actions = self.teardown();
                actions.push(SessionAction::Render);
                actions
            },
        }
    }

    fn handle_start(&mut self) -> Vec<SessionAction> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        tracing::debug!("bootstrapping");
        vec![SessionAction::ResolveIdentity, SessionAction::FetchSnapshot, SessionAction::Render]
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        let actions = self.connection.on_tick(now);
        self.apply_connection(actions)
    }

    fn handle_identity(&mut self, result: Result<Identity, FetchError>) -> Vec<SessionAction> {
        if self.identity.is_some() {
            return Vec::new();
        }

        let identity = match result {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "identity resolution failed");
                return vec![
                    SessionAction::Report(SessionError::fetch(FetchKind::Identity, &e)),
                    SessionAction::Render,
                ];
            },
        };

        tracing::info!(username = %identity.username, "identity resolved");
        let mut actions = forward(self.subscriptions.attach_creation_feed(&identity));
        self.identity = Some(identity);

        let (_, opened) = self.connection.connect(&self.config.endpoint);
        actions.extend(self.apply_connection(opened));

        actions.extend(self.maybe_ready());
        actions.push(SessionAction::Render);
        actions
    }

    fn handle_snapshot(
        &mut self,
        result: Result<Vec<ConversationSummary>, FetchError>,
    ) -> Vec<SessionAction> {
        if self.snapshot_done {
            return Vec::new();
        }
        self.snapshot_done = true;

        let mut actions = Vec::new();
        match result {
            Ok(snapshot) => {
                self.directory.load_snapshot(snapshot);
            },
            Err(e) => {
                tracing::warn!(error = %e, "snapshot fetch failed");
                actions.push(SessionAction::Report(SessionError::fetch(FetchKind::Snapshot, &e)));
            },
        }

        actions.extend(self.maybe_ready());
        actions.push(SessionAction::Render);
        actions
    }

    fn maybe_ready(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Bootstrapping || self.identity.is_none() || !self.snapshot_done {
            return Vec::new();
        }

        self.state = SessionState::Ready;
        tracing::info!(conversations = self.directory.len(), "session ready");

        match self.directory.first().map(|c| c.id) {
            Some(first) => self.select(first),
            None => Vec::new(),
        }
    }

    fn handle_history(
        &mut self,
        token: HistoryToken,
        result: Result<Vec<Message>, FetchError>,
    ) -> Vec<SessionAction> {
        match result {
            Ok(page) => {
                if self.timeline.apply_history(token, page) == HistoryOutcome::Stale {
                    return Vec::new();
                }
                if let Some(id) = self.timeline.conversation()
                    && let Some(first) = self.timeline.oldest()
                {
                    self.directory.apply_first_message_naming(id, &first.content);
                }
                vec![SessionAction::Render]
            },
            Err(e) => {
                if !self.timeline.fail_history(token) {
                    tracing::debug!(token = token.0, "stale history failure ignored");
                    return Vec::new();
                }
                tracing::warn!(token = token.0, error = %e, "history fetch failed");
                vec![
                    SessionAction::Report(SessionError::fetch(FetchKind::History, &e)),
                    SessionAction::Render,
                ]
            },
        }
    }

    fn handle_creation_finished(&mut self, result: Result<(), FetchError>) -> Vec<SessionAction> {
        self.directory.creation_finished();
        match result {
            Ok(()) => vec![SessionAction::Render],
            Err(e) => {
                tracing::warn!(error = %e, "creation request failed");
                self.awaiting_created = false;
                vec![
                    SessionAction::Report(SessionError::fetch(FetchKind::Creation, &e)),
                    SessionAction::Render,
                ]
            },
        }
    }

    fn handle_delivery(&mut self, subscription: SubscriptionId, body: &str) -> Vec<SessionAction> {
        let Some(route) = self.subscriptions.route(subscription) else {
            tracing::debug!(%subscription, "delivery for released subscription dropped");
            return Vec::new();
        };

        let result = match route {
            Route::Conversation(_) => {
                serde_json::from_str::<Message>(body).map(|message| self.on_live_message(message))
            },
            Route::Creations => serde_json::from_str::<ConversationCreated>(body)
                .map(|created| self.on_conversation_created(&created)),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(%subscription, error = %e, "malformed push payload");
            vec![SessionAction::Report(SessionError::from(e))]
        })
    }

    fn on_live_message(&mut self, message: Message) -> Vec<SessionAction> {
        let id = message.conversation_id;
        self.directory.apply_first_message_naming(id, &message.content);

        if !self.timeline.append_live(message) {
            tracing::debug!(conversation_id = %id, "live message for another conversation");
        }
        vec![SessionAction::Render]
    }

    fn on_conversation_created(&mut self, created: &ConversationCreated) -> Vec<SessionAction> {
        let applied = self.directory.apply_creation_event(created);
        if !applied.inserted {
            return Vec::new();
        }

        let id = created.conversation_id;
        let replaces_selected = applied.superseded.is_some() && applied.superseded == self.selected;
        let requested_here = self.awaiting_created && self.state == SessionState::Ready;

        let mut actions = Vec::new();
        if replaces_selected || requested_here {
            self.awaiting_created = false;
            actions.extend(self.select(id));
        }
        actions.push(SessionAction::Render);
        actions
    }

    fn handle_select(&mut self, id: ConversationId) -> Vec<SessionAction> {
        if self.state != SessionState::Ready {
            tracing::debug!(conversation_id = %id, "selection before ready ignored");
            return Vec::new();
        }
        if self.selected == Some(id) {
            return Vec::new();
        }
        if !self.directory.contains(id) {
            tracing::debug!(conversation_id = %id, "selection of unknown conversation ignored");
            return Vec::new();
        }
        self.select(id)
    }

    fn select(&mut self, id: ConversationId) -> Vec<SessionAction> {
        self.selected = Some(id);
        tracing::debug!(conversation_id = %id, "conversation selected");

        let request = self.timeline.begin_load(id, self.config.history_page_size);
        let mut actions = vec![SessionAction::FetchHistory(request)];
        actions.extend(forward(self.subscriptions.set_active_conversation(Some(id))));
        actions.push(SessionAction::Render);
        actions
    }

    fn handle_send(&mut self, content: String) -> Vec<SessionAction> {
        let conversation_id = match self.check_send(&content) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(error = %e, "send ignored");
                return Vec::new();
            },
        };

        tracing::debug!(%conversation_id, "publishing message");
        self.timeline.clear_input();
        vec![
            SessionAction::Publish(Outbound::SendMessage(OutgoingMessage {
                content,
                conversation_id,
                attachment_url: None,
            })),
            SessionAction::Render,
        ]
    }

    fn check_send(&self, content: &str) -> Result<ConversationId, SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::InvalidAction { reason: "session not ready" });
        }
        let Some(id) = self.selected else {
            return Err(SessionError::InvalidAction { reason: "no conversation selected" });
        };
        if !self.connection.is_connected() {
            return Err(SessionError::InvalidAction { reason: "not connected" });
        }
        if content.trim().is_empty() {
            return Err(SessionError::InvalidAction { reason: "empty message" });
        }
        Ok(id)
    }

    fn handle_create(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Ready {
            tracing::debug!("creation before ready ignored");
            return Vec::new();
        }

        match self.directory.create_conversation() {
            CreateOutcome::Existing(id) => {
                tracing::debug!(conversation_id = %id, "placeholder exists, selecting it");
                if self.selected == Some(id) { Vec::new() } else { self.select(id) }
            },
            CreateOutcome::Requested => {
                tracing::debug!("requesting new conversation");
                self.awaiting_created = true;
                vec![SessionAction::RequestCreation, SessionAction::Render]
            },
            CreateOutcome::InFlight => {
                tracing::debug!("creation already in flight");
                Vec::new()
            },
        }
    }

    /// Logout-equivalent teardown, in order: subscriptions, connection,
    /// credential, local state. Each step runs regardless of the others.
    fn teardown(&mut self) -> Vec<SessionAction> {
        let mut actions = forward(self.subscriptions.detach_all());

        let closing = self.connection.disconnect();
        actions.extend(self.apply_connection(closing));

        actions.push(SessionAction::DiscardCredential);

        self.directory.clear();
        self.timeline.clear();
        self.selected = None;
        self.awaiting_created = false;
        self.state = SessionState::LoggedOut;
        actions
    }

    /// Translate connection output, delivering notices to the subscription
    /// controller and the error report path. Each `Open` loads the credential
    /// from the store.
    fn apply_connection(&mut self, actions: Vec<ConnectionAction>) -> Vec<SessionAction> {
        let mut out = Vec::new();
        let mut rejected = false;
        let mut pending = VecDeque::from(actions);

        while let Some(action) = pending.pop_front() {
            match action {
                ConnectionAction::Open { handle, endpoint } => match self.store.load() {
                    Some(credential) => {
                        out.push(SessionAction::OpenTransport { handle, endpoint, credential });
                    },
                    None => {
                        pending.extend(self.connection.on_rejected(handle, "no stored credential"));
                    },
                },
                ConnectionAction::Close { handle } => {
                    out.push(SessionAction::CloseTransport { handle });
                },
                ConnectionAction::Notify(ConnectionNotice::Connected) => {
                    let resubscribe = self.subscriptions.on_connected();
                    out.extend(forward(resubscribe));
                    out.push(SessionAction::Render);
                },
                ConnectionAction::Notify(ConnectionNotice::Disconnected) => {
                    self.subscriptions.on_disconnected();
                    out.push(SessionAction::Render);
                },
                ConnectionAction::Notify(ConnectionNotice::Error { kind, detail }) => match kind {
                    TransportErrorKind::TransportDropped => {
                        out.push(SessionAction::Report(SessionError::TransportDropped { detail }));
                    },
                    TransportErrorKind::AuthRejected => {
                        out.push(SessionAction::Report(SessionError::AuthRejected { detail }));
                        rejected = true;
                    },
                },
            }
        }

        if rejected && self.state != SessionState::LoggedOut {
            out.extend(self.teardown());
            out.push(SessionAction::Render);
        }
        out
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Resolved identity.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Selected conversation.
    pub fn selected(&self) -> Option<ConversationId> {
        self.selected
    }

    /// Conversation directory.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Timeline of the selected conversation.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Subscription controller.
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Transport connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Handle of the live connection.
    pub fn connection_handle(&self) -> Option<ConnectionHandle> {
        self.connection.handle()
    }

    /// Deadline of the pending reconnection attempt.
    pub fn reconnect_at(&self) -> Option<E::Instant> {
        self.connection.reconnect_at()
    }

    /// Whether the creation affordance is enabled.
    pub fn can_create(&self) -> bool {
        self.state == SessionState::Ready && self.directory.can_create()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

fn forward(actions: Vec<SubscriptionAction>) -> Vec<SessionAction> {
    actions
        .into_iter()
        .map(|action| match action {
            SubscriptionAction::Subscribe { subscription, topic } => {
                SessionAction::Subscribe { subscription, topic }
            },
            SubscriptionAction::Unsubscribe { subscription } => {
                SessionAction::Unsubscribe { subscription }
            },
            SubscriptionAction::Publish(outbound) => SessionAction::Publish(outbound),
        })
        .collect()
}
