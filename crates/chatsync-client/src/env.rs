//! Time source abstraction.
//!
//! The session never reads a clock directly. Production code uses
//! [`SystemEnv`]; simulation supplies a virtual clock so reconnection delays
//! can be stepped deterministically.

use std::{fmt::Debug, ops::Add, time::Duration};

/// Source of time for the session state machines.
pub trait Environment: Clone + Send + 'static {
    /// Point in time. Virtual in simulation, monotonic in production.
    type Instant: Copy + Ord + Debug + Send + Sync + Add<Duration, Output = Self::Instant>;

    /// Current instant.
    fn now(&self) -> Self::Instant;
}

/// Production environment backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }
}
