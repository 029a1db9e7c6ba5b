//! Lifecycle state of a supervised process.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// States a supervised process moves through.
///
/// `Ready` is reached on the first readiness signal. `Terminated` is reached
/// once a termination attempt completed, or once the exit monitor observed
/// the child exit on its own; the OS gives no stronger confirmation than
/// that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisedState {
    /// Spawned, no readiness signal yet.
    Starting,
    /// Believed to be accepting work.
    Ready,
    /// A termination pass is signaling this process.
    Terminating,
    /// Exit observed or termination attempt completed.
    Terminated,
}

impl fmt::Display for SupervisedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisedState::Starting => write!(f, "starting"),
            SupervisedState::Ready => write!(f, "ready"),
            SupervisedState::Terminating => write!(f, "terminating"),
            SupervisedState::Terminated => write!(f, "terminated"),
        }
    }
}

impl SupervisedState {
    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisedState::Terminated)
    }

    /// Check if a transition to `target` is valid.
    pub fn is_valid_transition(self, target: SupervisedState) -> bool {
        use SupervisedState::*;
        match (self, target) {
            (Starting, Ready) => true,
            // Any live state may be torn down or observed exiting.
            (Starting | Ready, Terminating | Terminated) => true,
            (Terminating, Terminated) => true,
            // Same state is a no-op.
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

/// Shared state cell, updated by the readiness synchronizer, the exit
/// monitor and the tree terminator, observed by everyone holding a handle.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<Mutex<SupervisedState>>);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SupervisedState::Starting)))
    }

    pub fn get(&self) -> SupervisedState {
        *self.0.lock()
    }

    /// Move to `target` if the transition is valid. Returns whether the
    /// state changed.
    pub fn advance(&self, target: SupervisedState) -> bool {
        let mut current = self.0.lock();
        if !current.is_valid_transition(target) {
            debug!(from = %*current, to = %target, "ignoring invalid state transition");
            return false;
        }
        let changed = *current != target;
        *current = target;
        changed
    }
}
