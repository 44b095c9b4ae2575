//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init + install logger → Watch config
//!     → Open stores → Assemble pipeline → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections (bounded)
//!     → Close stores → Flush logs → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging, then stores, listener last
//! - Ordered shutdown: stop accept, drain, close stores, flush
//! - Shutdown has timeout: forced close after deadline

use std::fmt;

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{run, Harness, HarnessError, Serving};

/// Process phases, in the only order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Unstarted,
    ConfigLoaded,
    LoggingReady,
    ResourcesOpened,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    /// The state that may follow this one, `None` once stopped.
    pub fn next(self) -> Option<Self> {
        use LifecycleState::*;
        match self {
            Unstarted => Some(ConfigLoaded),
            ConfigLoaded => Some(LoggingReady),
            LoggingReady => Some(ResourcesOpened),
            ResourcesOpened => Some(Serving),
            Serving => Some(Draining),
            Draining => Some(Stopped),
            Stopped => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::ConfigLoaded => "config_loaded",
            LifecycleState::LoggingReady => "logging_ready",
            LifecycleState::ResourcesOpened => "resources_opened",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attempt to skip or repeat a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Tracks the current phase and rejects out-of-order transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unstarted,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether `to` is the immediate successor, without moving.
    pub fn check(&self, to: LifecycleState) -> Result<(), TransitionError> {
        if self.state.next() != Some(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: LifecycleState) -> Result<(), TransitionError> {
        self.check(to)?;
        tracing::debug!(from = %self.state, to = %to, "Lifecycle transition");
        self.state = to;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
