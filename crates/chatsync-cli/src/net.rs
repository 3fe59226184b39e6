//! Network driver for the CLI.
//!
//! Implements the [`Driver`] trait with tokio: HTTP requests and WebSocket
//! links run as spawned tasks that report back through one internal
//! channel, user commands come from stdin lines, and a periodic tick drives
//! the reconnection timer.

use std::{
    collections::HashMap,
    future::Future,
    io::{self, Write},
    sync::Arc,
    time::{Duration, Instant},
};

use chatsync_app::{Driver, Input};
use chatsync_client::{
    ConnectionHandle, Credential, CredentialStore, Environment, FetchError, HistoryRequest,
    Session, SessionError, SessionEvent,
    transport::{self, HttpBackend},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
    time::{Interval, MissedTickBehavior},
};

use crate::{CliError, commands, render};

/// Tick period for timer checks.
const TICK: Duration = Duration::from_millis(250);

/// Outgoing frame buffer per link.
const LINK_BUFFER: usize = 64;

/// Completion reported by a spawned task.
enum Completion {
    /// Request finished.
    Session(SessionEvent),
    /// Activity on one attempt of a link.
    Link {
        handle: ConnectionHandle,
        /// Attempt the activity belongs to.
        attempt: u64,
        input: Input,
    },
}

/// Link attempt currently owned by a connection handle.
struct LinkSlot {
    attempt: u64,
    outgoing: mpsc::Sender<String>,
}

/// Driver for the real network and terminal.
pub struct NetDriver {
    http: HttpBackend,
    store: Arc<dyn CredentialStore>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    stdin: Lines<BufReader<Stdin>>,
    stdin_open: bool,
    tick: Interval,
    links: HashMap<ConnectionHandle, LinkSlot>,
    next_attempt: u64,
    timeline_limit: usize,
}

impl NetDriver {
    /// Create a driver. Must be called within a tokio runtime.
    pub fn new(http: HttpBackend, store: Arc<dyn CredentialStore>, timeline_limit: usize) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            http,
            store,
            completions_tx,
            completions_rx,
            stdin: BufReader::new(tokio::io::stdin()).lines(),
            stdin_open: true,
            tick,
            links: HashMap::new(),
            next_attempt: 0,
            timeline_limit,
        }
    }

    /// Run `request` in the background and queue its event.
    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let event = request.await;
            if completions.send(Completion::Session(event)).is_err() {
                tracing::debug!("driver gone, completion dropped");
            }
        });
    }

    /// Accept a completion, dropping activity of superseded link attempts.
    fn accept(&mut self, completion: Completion) -> Option<Input> {
        match completion {
            Completion::Session(event) => Some(Input::Session(event)),
            Completion::Link { handle, attempt, input } => {
                let current = self.links.get(&handle).is_some_and(|slot| slot.attempt == attempt);
                if !current {
                    tracing::debug!(%handle, attempt, "activity of closed link dropped");
                    return None;
                }
                if matches!(input, Input::LinkDown { .. } | Input::LinkRefused { .. }) {
                    self.links.remove(&handle);
                }
                Some(input)
            },
        }
    }
}

/// Print a line for the user outside of a full render.
fn notice(text: &str) {
    let mut out = io::stdout().lock();
    if let Err(e) = writeln!(out, "{text}") {
        tracing::warn!(error = %e, "stdout write failed");
    }
}

impl Driver for NetDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_input(&mut self) -> Result<Option<Input>, Self::Error> {
        loop {
            tokio::select! {
                biased;

                Some(completion) = self.completions_rx.recv() => {
                    if let Some(input) = self.accept(completion) {
                        return Ok(Some(input));
                    }
                },

                line = self.stdin.next_line(), if self.stdin_open => {
                    let Some(line) = line? else {
                        self.stdin_open = false;
                        return Ok(None);
                    };
                    match commands::parse(&line) {
                        Some(commands::Command::Quit) => return Ok(None),
                        Some(commands::Command::Invalid(hint)) => notice(&hint),
                        Some(command) => {
                            if let Some(event) = command.into_event() {
                                return Ok(Some(Input::Session(event)));
                            }
                        },
                        None => {},
                    }
                },

                _ = self.tick.tick() => return Ok(Some(Input::Tick)),
            }
        }
    }

    fn resolve_identity(&mut self) -> Result<(), Self::Error> {
        let http = self.http.clone();
        self.spawn_request(async move {
            SessionEvent::IdentityResolved(http.resolve_identity().await.map_err(FetchError::from))
        });
        Ok(())
    }

    fn fetch_snapshot(&mut self) -> Result<(), Self::Error> {
        let http = self.http.clone();
        self.spawn_request(async move {
            SessionEvent::SnapshotLoaded(http.fetch_snapshot().await.map_err(FetchError::from))
        });
        Ok(())
    }

    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error> {
        let http = self.http.clone();
        self.spawn_request(async move {
            let result = http.fetch_history(&request).await.map_err(FetchError::from);
            SessionEvent::HistoryLoaded { token: request.token, result }
        });
        Ok(())
    }

    fn request_creation(&mut self) -> Result<(), Self::Error> {
        let http = self.http.clone();
        self.spawn_request(async move {
            SessionEvent::CreationFinished(http.request_creation().await.map_err(FetchError::from))
        });
        Ok(())
    }

    fn open_link(
        &mut self,
        handle: ConnectionHandle,
        endpoint: &str,
        credential: &Credential,
    ) -> Result<(), Self::Error> {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let (outgoing_tx, outgoing_rx) = mpsc::channel(LINK_BUFFER);

        tokio::spawn(run_link(LinkTask {
            handle,
            attempt,
            endpoint: endpoint.to_owned(),
            credential: credential.clone(),
            outgoing: outgoing_rx,
            completions: self.completions_tx.clone(),
        }));
        self.links.insert(handle, LinkSlot { attempt, outgoing: outgoing_tx });
        Ok(())
    }

    fn close_link(&mut self, handle: ConnectionHandle) {
        // Dropping the sender lets the task flush queued frames and close.
        self.links.remove(&handle);
    }

    async fn send_frame(&mut self, handle: ConnectionHandle, text: String) -> Result<(), Self::Error> {
        let outgoing = self
            .links
            .get(&handle)
            .map(|slot| slot.outgoing.clone())
            .ok_or(CliError::LinkClosed(handle))?;
        outgoing.send(text).await.map_err(|_| CliError::LinkClosed(handle))
    }

    fn discard_credential(&mut self) -> Result<(), Self::Error> {
        Ok(self.store.clear()?)
    }

    fn report(&mut self, error: &SessionError) {
        tracing::warn!(%error, "session error");
        notice(&format!("! {error}"));
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render<E: Environment>(&mut self, session: &Session<E>) -> Result<(), Self::Error> {
        let mut out = io::stdout().lock();
        render::render(session, &mut out, self.timeline_limit)?;
        out.flush()?;
        Ok(())
    }

    fn stop(&mut self) {
        self.links.clear();
    }
}

/// Everything one link attempt needs.
struct LinkTask {
    handle: ConnectionHandle,
    attempt: u64,
    endpoint: String,
    credential: Credential,
    outgoing: mpsc::Receiver<String>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl LinkTask {
    fn report(&self, input: Input) -> bool {
        let completion = Completion::Link { handle: self.handle, attempt: self.attempt, input };
        self.completions.send(completion).is_ok()
    }
}

/// Open the socket, then pump frames until either side ends.
async fn run_link(mut task: LinkTask) {
    let handle = task.handle;
    let mut link = match transport::connect(&task.endpoint, &task.credential).await {
        Ok(link) => link,
        Err(e) => {
            let detail = e.to_string();
            let input = if e.is_rejection() {
                Input::LinkRefused { handle, detail }
            } else {
                Input::LinkDown { handle, detail }
            };
            task.report(input);
            return;
        },
    };
    if !task.report(Input::LinkUp { handle }) {
        link.stop();
        return;
    }

    let detail = loop {
        tokio::select! {
            outgoing = task.outgoing.recv() => match outgoing {
                Some(text) => {
                    if link.to_server.send(text).await.is_err() {
                        break "link task ended".to_owned();
                    }
                },
                // Closed by the driver; dropping the link closes the socket.
                None => return,
            },
            incoming = link.from_server.recv() => match incoming {
                Some(text) => {
                    if !task.report(Input::Frame { handle, text }) {
                        link.stop();
                        return;
                    }
                },
                None => break "connection lost".to_owned(),
            },
        }
    };
    tracing::info!(%handle, %detail, "link ended");
    task.report(Input::LinkDown { handle, detail });
}
