//! Headless terminal client for chatsync.
//!
//! Wires the production pieces into the generic [`chatsync_app::Runtime`]:
//! the WebSocket link and HTTP collaborators from
//! [`chatsync_client::transport`], a file-backed credential store, stdin
//! commands and a plain text rendering on stdout.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
mod error;
pub mod net;
pub mod render;

pub use commands::Command;
pub use error::CliError;
pub use net::NetDriver;
