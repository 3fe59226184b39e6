//! Application layer for chatsync
//!
//! Generic runtime wiring the Sans-IO [`chatsync_client::Session`] to
//! platform I/O, so deterministic simulation runs the same orchestration
//! code as production.
//!
//! # Components
//!
//! - [`Bridge`]: Link handshake and translation between session actions and
//!   STOMP frames
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Input`]: What a driver feeds into the runtime
//! - [`Runtime`]: Generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bridge;
mod driver;
mod input;
mod runtime;

pub use bridge::{Bridge, LinkPhase};
pub use driver::Driver;
pub use input::Input;
pub use runtime::Runtime;
