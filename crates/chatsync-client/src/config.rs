//! Session configuration.

use std::time::Duration;

/// Fixed delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Number of messages requested per history page.
pub const HISTORY_PAGE_SIZE: u32 = 50;

/// Broker endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Tunables for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Broker WebSocket endpoint.
    pub endpoint: String,
    /// Delay before each reconnection attempt after an unexpected drop.
    pub reconnect_delay: Duration,
    /// Page size of the history fetch issued on selection.
    pub history_page_size: u32,
}

impl SessionConfig {
    /// Configuration for `endpoint` with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            reconnect_delay: RECONNECT_DELAY,
            history_page_size: HISTORY_PAGE_SIZE,
        }
    }
}
