//! Network transport for the session.
//!
//! Thin I/O layers with no session logic:
//! - [`ws`]: the persistent WebSocket link carrying STOMP text frames
//! - [`http`]: the request/response collaborators (identity, snapshot,
//!   history, creation)

pub mod http;
pub mod ws;

pub use http::HttpBackend;
use thiserror::Error;
pub use ws::{WsLink, connect};

use crate::FetchError;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint could not be parsed or has the wrong scheme.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Server refused the credential during the WebSocket upgrade.
    #[error("credential rejected with HTTP {status}")]
    Rejected {
        /// HTTP status of the refused upgrade.
        status: u16,
    },

    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP request failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Credential store is empty.
    #[error("no credential stored")]
    MissingCredential,
}

impl TransportError {
    /// Whether the failure means the credential was refused.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Rejected { .. } => true,
            Self::Http(e) => e.status().is_some_and(|s| s.as_u16() == 401 || s.as_u16() == 403),
            _ => false,
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        FetchError::new(err.to_string())
    }
}
