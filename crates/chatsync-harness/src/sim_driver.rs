//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's network driver but
//! for deterministic testing. It implements [`Driver`] so the same
//! [`chatsync_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Requests are answered by a [`SimServer`] at the moment they are made.
//! With [`FetchMode::Deferred`] the completions are held back until the test
//! releases them, in any order it likes.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, MutexGuard, PoisonError},
};

use chatsync_app::{Driver, Input};
use chatsync_client::{
    ConnectionHandle, Credential, CredentialStore, Environment, HistoryRequest,
    MemoryCredentialStore, Session, SessionError, SessionEvent,
};
use chatsync_proto::ConversationId;
use tokio::time::Instant;

use crate::{
    SharedSimServer, SimServer,
    invariants::{BrokerSnapshot, InvariantRegistry, SessionSnapshot, SystemSnapshot},
    sim_server::ServerPush,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// When fetch completions reach the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Queued right behind the request.
    #[default]
    Immediate,
    /// Held until [`SimDriver::release_held`] or
    /// [`SimDriver::release_held_reversed`].
    Deferred,
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    server: SharedSimServer,
    store: Arc<MemoryCredentialStore>,
    inputs: VecDeque<Input<Instant>>,
    /// Deferred fetch completions in request order.
    held: Vec<Input<Instant>>,
    fetch_mode: FetchMode,
    links: HashSet<ConnectionHandle>,
    reports: Vec<SessionError>,
    renders: usize,
    name_history: HashMap<ConversationId, Vec<Option<String>>>,
    invariants: Option<InvariantRegistry>,
}

impl SimDriver {
    /// Create a driver talking to `server` with `credential` stored.
    pub fn new(server: SharedSimServer, credential: Credential) -> Self {
        Self {
            server,
            store: Arc::new(MemoryCredentialStore::new(credential)),
            inputs: VecDeque::new(),
            held: Vec::new(),
            fetch_mode: FetchMode::Immediate,
            links: HashSet::new(),
            reports: Vec::new(),
            renders: 0,
            name_history: HashMap::new(),
            invariants: None,
        }
    }

    /// Enable invariant checking on every render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Change when fetch completions are delivered.
    pub fn set_fetch_mode(&mut self, mode: FetchMode) {
        self.fetch_mode = mode;
    }

    /// Queue a session event, typically a user intent.
    pub fn push_event(&mut self, event: SessionEvent<Instant>) {
        self.inputs.push_back(Input::Session(event));
    }

    /// Queue a timer tick.
    pub fn push_tick(&mut self) {
        self.inputs.push_back(Input::Tick);
    }

    /// Number of held fetch completions.
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Deliver held completions in request order.
    pub fn release_held(&mut self) {
        self.inputs.extend(self.held.drain(..));
    }

    /// Deliver held completions newest request first.
    pub fn release_held_reversed(&mut self) {
        self.inputs.extend(self.held.drain(..).rev());
    }

    /// Errors reported so far.
    pub fn reports(&self) -> &[SessionError] {
        &self.reports
    }

    /// Number of renders requested so far.
    pub fn renders(&self) -> usize {
        self.renders
    }

    /// Credential currently stored.
    pub fn stored_credential(&self) -> Option<Credential> {
        self.store.load()
    }

    /// The store the session reads its credential from.
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    /// Replace the stored credential, as a login refresh would.
    pub fn refresh_credential(&self, credential: Credential) {
        self.store.store(credential);
    }

    /// Links the driver considers open.
    pub fn open_links(&self) -> Vec<ConnectionHandle> {
        let mut links: Vec<_> = self.links.iter().copied().collect();
        links.sort();
        links
    }

    /// Check if there are pending inputs to process.
    pub fn has_pending(&self) -> bool {
        !self.inputs.is_empty()
    }

    /// Lock the shared server.
    pub fn server(&self) -> MutexGuard<'_, SimServer> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a snapshot of the session and the broker.
    ///
    /// Records the current conversation names into the driver's history.
    pub fn snapshot_from_session<E: Environment>(&mut self, session: &Session<E>) -> SystemSnapshot {
        let broker = BrokerSnapshot::from_server(&self.server());
        let session =
            SessionSnapshot::from_session(0, session).with_name_history(&mut self.name_history);
        SystemSnapshot::single(session).with_broker(broker)
    }

    /// Check invariants against the session and the broker.
    pub fn check_invariants<E: Environment>(&mut self, session: &Session<E>, context: &str) {
        if self.invariants.is_none() {
            return;
        }
        let snapshot = self.snapshot_from_session(session);
        if let Some(registry) = &self.invariants {
            registry.assert_all(&snapshot, context);
        }
    }

    /// Move broker pushes for open links onto the input queue.
    fn pump(&mut self) {
        let pushes = self.server().take_pushes();
        for push in pushes {
            match push {
                ServerPush::Frame { handle, text } if self.links.contains(&handle) => {
                    self.inputs.push_back(Input::Frame { handle, text });
                },
                ServerPush::Closed { handle, detail } => {
                    if self.links.remove(&handle) {
                        self.inputs.push_back(Input::LinkDown { handle, detail });
                    }
                },
                ServerPush::Frame { handle, .. } => {
                    tracing::debug!(%handle, "frame for closed link dropped");
                },
            }
        }
    }

    fn complete(&mut self, event: SessionEvent<Instant>) {
        let input = Input::Session(event);
        match self.fetch_mode {
            FetchMode::Immediate => self.inputs.push_back(input),
            FetchMode::Deferred => self.held.push(input),
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = Instant;

    async fn poll_input(&mut self) -> Result<Option<Input<Self::Instant>>, Self::Error> {
        self.pump();
        Ok(self.inputs.pop_front())
    }

    fn resolve_identity(&mut self) -> Result<(), Self::Error> {
        let credential = self.store.load();
        let result = self.server().who_am_i(credential.as_ref());
        self.complete(SessionEvent::IdentityResolved(result));
        Ok(())
    }

    fn fetch_snapshot(&mut self) -> Result<(), Self::Error> {
        let credential = self.store.load();
        let result = self.server().my_conversations(credential.as_ref());
        self.complete(SessionEvent::SnapshotLoaded(result));
        Ok(())
    }

    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error> {
        let credential = self.store.load();
        let result = self.server().history(credential.as_ref(), &request);
        self.complete(SessionEvent::HistoryLoaded { token: request.token, result });
        Ok(())
    }

    fn request_creation(&mut self) -> Result<(), Self::Error> {
        let credential = self.store.load();
        let result = self.server().create_conversation(credential.as_ref()).map(|_| ());
        self.complete(SessionEvent::CreationFinished(result));
        Ok(())
    }

    fn open_link(
        &mut self,
        handle: ConnectionHandle,
        _endpoint: &str,
        credential: &Credential,
    ) -> Result<(), Self::Error> {
        let opened = self.server().open_link(handle, credential);
        match opened {
            Ok(()) => {
                self.links.insert(handle);
                self.inputs.push_back(Input::LinkUp { handle });
            },
            Err(detail) => self.inputs.push_back(Input::LinkRefused { handle, detail }),
        }
        Ok(())
    }

    fn close_link(&mut self, handle: ConnectionHandle) {
        self.links.remove(&handle);
        self.server().close_link(handle);
        self.inputs.retain(|input| match input {
            Input::LinkUp { handle: h }
            | Input::LinkRefused { handle: h, .. }
            | Input::LinkDown { handle: h, .. }
            | Input::Frame { handle: h, .. } => *h != handle,
            Input::Session(_) | Input::Tick => true,
        });
    }

    async fn send_frame(&mut self, handle: ConnectionHandle, text: String) -> Result<(), Self::Error> {
        if !self.links.contains(&handle) {
            return Err(SimDriverError(format!("{handle} is closed")));
        }
        self.server().receive(handle, &text);
        Ok(())
    }

    fn discard_credential(&mut self) -> Result<(), Self::Error> {
        self.store.clear().map_err(|e| SimDriverError(e.to_string()))
    }

    fn report(&mut self, error: &SessionError) {
        tracing::debug!(%error, "session reported");
        self.reports.push(error.clone());
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render<E: Environment>(&mut self, session: &Session<E>) -> Result<(), Self::Error> {
        self.renders += 1;
        self.check_invariants(session, "after render");
        Ok(())
    }

    fn stop(&mut self) {
        self.links.clear();
        self.inputs.clear();
    }
}
