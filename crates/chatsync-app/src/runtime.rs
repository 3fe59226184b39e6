//! Generic runtime for session orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Session`]: Sans-IO session state machine
//! - [`Bridge`]: Link handshake and frame translation
//! - [`Driver`]: Platform-specific I/O

use std::sync::Arc;

use chatsync_client::{
    ConnectionHandle, CredentialStore, Environment, Session, SessionAction, SessionConfig,
    SessionEvent,
};

use crate::{Bridge, Driver, Input};

/// Generic runtime that orchestrates Session, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment providing the session clock
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    session: Session<E>,
    bridge: Bridge,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    ///
    /// `store` is read at every connection attempt.
    pub fn new(driver: D, env: E, config: SessionConfig, store: Arc<dyn CredentialStore>) -> Self {
        let session = Session::new(env, config, store);
        Self { driver, session, bridge: Bridge::new() }
    }

    /// Run the main event loop until the driver runs out of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.start().await?;
        while self.step().await? {}
        self.driver.stop();
        Ok(())
    }

    /// Bootstrap the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn start(&mut self) -> Result<(), D::Error> {
        self.dispatch(SessionEvent::Start).await
    }

    /// Process one input.
    ///
    /// Returns `false` once the driver has no more input.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<bool, D::Error> {
        let Some(input) = self.driver.poll_input().await? else {
            return Ok(false);
        };
        self.process_input(input).await?;
        Ok(true)
    }

    /// Process one input without polling the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn process_input(&mut self, input: Input<D::Instant>) -> Result<(), D::Error> {
        match input {
            Input::Session(event) => self.dispatch(event).await,
            Input::LinkUp { handle } => {
                self.bridge.link_up(handle);
                self.flush().await;
                Ok(())
            },
            Input::LinkRefused { handle, detail } => match self.bridge.link_refused(handle, detail) {
                Some(event) => self.dispatch(event).await,
                None => Ok(()),
            },
            Input::LinkDown { handle, detail } => match self.bridge.link_down(handle, detail) {
                Some(event) => self.dispatch(event).await,
                None => Ok(()),
            },
            Input::Frame { handle, text } => {
                let Some(event) = self.bridge.handle_frame(handle, &text) else {
                    return Ok(());
                };
                if matches!(
                    event,
                    SessionEvent::TransportClosed { .. } | SessionEvent::TransportRejected { .. }
                ) {
                    // Broker ended the session; the socket is of no further use.
                    self.driver.close_link(handle);
                }
                self.dispatch(event).await
            },
            Input::Tick => {
                let now = self.driver.now();
                self.dispatch(SessionEvent::Tick { now }).await
            },
        }
    }

    /// Feed an event to the session and execute the resulting actions.
    async fn dispatch(&mut self, event: SessionEvent<E::Instant>) -> Result<(), D::Error> {
        let actions = self.session.handle(event);
        self.execute(actions).await
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), D::Error> {
        for action in actions {
            match action {
                SessionAction::ResolveIdentity => self.driver.resolve_identity()?,
                SessionAction::FetchSnapshot => self.driver.fetch_snapshot()?,
                SessionAction::FetchHistory(request) => self.driver.fetch_history(request)?,
                SessionAction::RequestCreation => self.driver.request_creation()?,
                SessionAction::OpenTransport { handle, endpoint, credential } => {
                    self.bridge.open(handle, &endpoint, credential.clone());
                    self.driver.open_link(handle, &endpoint, &credential)?;
                },
                SessionAction::CloseTransport { handle } => self.close(handle).await,
                SessionAction::Subscribe { subscription, topic } => {
                    self.bridge.subscribe(subscription, &topic);
                    self.flush().await;
                },
                SessionAction::Unsubscribe { subscription } => {
                    self.bridge.unsubscribe(subscription);
                    self.flush().await;
                },
                SessionAction::Publish(outbound) => {
                    self.bridge.publish(&outbound);
                    self.flush().await;
                },
                SessionAction::DiscardCredential => {
                    // Teardown continues whatever happens here.
                    if let Err(e) = self.driver.discard_credential() {
                        tracing::warn!(error = %e, "failed to discard credential");
                    }
                },
                SessionAction::Report(error) => self.driver.report(&error),
                SessionAction::Render => self.driver.render(&self.session)?,
            }
        }
        Ok(())
    }

    async fn close(&mut self, handle: ConnectionHandle) {
        self.bridge.close(handle);
        self.flush().await;
        self.driver.close_link(handle);
    }

    /// Send all pending outgoing frames.
    ///
    /// Send failures are only logged: a dead link is reported separately as
    /// [`Input::LinkDown`].
    async fn flush(&mut self) {
        for (handle, frame) in self.bridge.take_outgoing() {
            let command = frame.command;
            if let Err(e) = self.driver.send_frame(handle, frame.encode()).await {
                tracing::warn!(%handle, %command, error = %e, "frame send failed");
            }
        }
    }

    /// Get a reference to the Session
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}
