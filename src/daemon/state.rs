//! Daemon lifecycle.

use std::fmt;

use crate::error::{Error, Result};

/// Where the daemon is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DaemonState {
    /// Not running.
    #[default]
    Stopped,
    /// Acquiring the pid file and building the session.
    Starting,
    /// Polling rooms.
    Running,
    /// Finishing the current cycle before releasing the pid file.
    Stopping,
}

impl DaemonState {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: DaemonState) -> bool {
        use DaemonState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Stopped => "stopped",
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// A [`DaemonState`] that only moves along legal transitions.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: DaemonState,
}

impl Lifecycle {
    /// A lifecycle in [`DaemonState::Stopped`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Move to `next`, or fail with [`Error::InvalidState`].
    pub fn transition(&mut self, next: DaemonState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::invalid_state(format!(
                "cannot go from {} to {next}",
                self.state
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "daemon state");
        self.state = next;
        Ok(())
    }
}
