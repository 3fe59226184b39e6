//! Deterministic simulation harness for chatsync session testing.
//!
//! In-memory implementations of the chat server and of the [`chatsync_app::Driver`]
//! trait, so the production [`chatsync_app::Runtime`] can be driven step by
//! step with full control over completion order and virtual time.
//!
//! # Components
//!
//! - [`SimServer`]: HTTP collaborators and STOMP broker in one in-memory
//!   model
//! - [`SimDriver`]: driver queueing inputs and answering requests from a
//!   [`SimServer`], optionally holding fetch completions back
//! - [`SimEnv`]: environment on tokio's clock, pausable in tests
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties against snapshots of
//! the session and the broker. Invariants verify WHAT must be true across
//! all execution paths, not specific scenarios. Use
//! [`InvariantRegistry::standard()`] for the session invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    BrokerSnapshot, Invariant, InvariantRegistry, InvariantResult, LinkSnapshot, NamesNeverRevert,
    SelectedInDirectory, SessionSnapshot, SingleConversationSubscription, SinglePlaceholder,
    SystemSnapshot, TimelineMatchesSelection, UniqueConversationIds, Violation,
};
pub use sim_driver::{FetchMode, SimDriver, SimDriverError};
pub use sim_env::SimEnv;
pub use sim_server::{ServerPush, SharedSimServer, SimServer, create_shared_server};
