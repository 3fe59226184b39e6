//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

use chatsync_client::{
    ConnectionHandle, Credential, Environment, HistoryRequest, Session, SessionError,
};

use crate::Input;

/// Abstracts I/O operations for the runtime.
///
/// Request-style operations (`resolve_identity`, `fetch_*`,
/// `request_creation`, `open_link`) only *start* the work. Their outcome
/// comes back later through [`Driver::poll_input`], which keeps every
/// completion on the runtime's single event queue.
///
/// # Implementations
///
/// - **CLI**: tokio tasks, reqwest for HTTP, tokio-tungstenite for the link
/// - **Simulation**: in-memory server with controllable completion order
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync;

    /// Wait for the next input.
    ///
    /// Returns `None` once the input source is exhausted (the user quit).
    fn poll_input(
        &mut self,
    ) -> impl Future<Output = Result<Option<Input<Self::Instant>>, Self::Error>> + Send;

    /// Start resolving the identity behind the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn resolve_identity(&mut self) -> Result<(), Self::Error>;

    /// Start fetching the conversation snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn fetch_snapshot(&mut self) -> Result<(), Self::Error>;

    /// Start fetching a history page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error>;

    /// Start a conversation creation request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn request_creation(&mut self) -> Result<(), Self::Error>;

    /// Start opening the link of `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be started.
    fn open_link(
        &mut self,
        handle: ConnectionHandle,
        endpoint: &str,
        credential: &Credential,
    ) -> Result<(), Self::Error>;

    /// Close the link of `handle`. No input for it may follow.
    fn close_link(&mut self, handle: ConnectionHandle);

    /// Send a text frame on the link of `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is closed or the send fails.
    fn send_frame(
        &mut self,
        handle: ConnectionHandle,
        text: String,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Remove the stored credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be cleared.
    fn discard_credential(&mut self) -> Result<(), Self::Error>;

    /// Surface an error to the user.
    fn report(&mut self, error: &SessionError);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the session state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render<E: Environment>(&mut self, session: &Session<E>) -> Result<(), Self::Error>;

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
