//! Simulation environment.
//!
//! [`SimEnv`] reads tokio's clock. Under a paused runtime
//! (`#[tokio::test(start_paused = true)]`) time only moves when a test
//! advances it, which makes reconnection delays deterministic.

use chatsync_client::Environment;

/// Environment backed by [`tokio::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl SimEnv {
    /// Create a simulation environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }
}
