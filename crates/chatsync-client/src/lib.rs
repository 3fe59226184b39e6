//! Session synchronizer
//!
//! Action-based client state machines for chatsync. Keeps the conversation
//! directory, the selected conversation's timeline and the broker link
//! consistent while snapshot fetches, live pushes and user actions arrive in
//! any order.
//!
//! # Architecture
//!
//! Every component is Sans-IO. The [`Session`] receives events
//! ([`SessionEvent`]), processes them through pure state machine logic, and
//! returns actions ([`SessionAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`Connection`]: Lifecycle of the reconnecting broker link
//! - [`Subscriptions`]: One conversation topic plus the creation feed
//! - [`Directory`]: Newest-first conversations with one-way naming
//! - [`Timeline`]: Newest-first messages of the selected conversation
//! - [`Session`]: Orchestration, bootstrapping and logout teardown
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect`]: Open the WebSocket link to the broker
//! - [`transport::HttpBackend`]: Identity, snapshot, history and creation
//!   requests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
mod connection;
mod credential;
mod directory;
mod env;
mod error;
mod event;
mod session;
mod subscription;
mod timeline;

#[cfg(feature = "transport")]
pub mod transport;

pub use chatsync_proto as proto;
pub use config::SessionConfig;
pub use connection::{
    Connection, ConnectionAction, ConnectionHandle, ConnectionNotice, ConnectionState,
};
pub use credential::{
    Credential, CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use directory::{
    Conversation, CreateOutcome, CreationApplied, Directory, NAME_LIMIT, PLACEHOLDER_NAME,
    derive_name,
};
pub use env::{Environment, SystemEnv};
pub use error::{FetchError, FetchKind, SessionError, TransportErrorKind};
pub use event::{SessionAction, SessionEvent};
pub use session::{Session, SessionState};
pub use subscription::{Route, SubscriptionAction, SubscriptionId, Subscriptions};
pub use timeline::{HistoryOutcome, HistoryRequest, HistoryToken, Timeline};
