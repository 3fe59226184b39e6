//! CLI errors.

use std::{io, path::PathBuf};

use chatsync_client::{ConnectionHandle, CredentialError, transport::TransportError};
use thiserror::Error;

/// Errors that stop the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport could not be set up.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential store failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Token file is missing or empty.
    #[error("no token in {}", path.display())]
    NoCredential {
        /// Configured token file.
        path: PathBuf,
    },

    /// The link of a connection is gone.
    #[error("link {0} is closed")]
    LinkClosed(ConnectionHandle),
}
