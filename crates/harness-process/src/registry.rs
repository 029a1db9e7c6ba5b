//! Registry of live supervised processes.
//!
//! One registry per harness instance, threaded through the launcher and the
//! tree terminator. Deliberately not process-global so parallel harness
//! instances never share state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

use crate::state::{StateCell, SupervisedState};

/// One tracked process, as the launcher registered it.
#[derive(Debug, Clone)]
pub struct RegisteredProcess {
    pub pid: u32,
    pub command: String,
    pub spawned_at: DateTime<Utc>,
    state: StateCell,
}

impl RegisteredProcess {
    pub(crate) fn new(pid: u32, command: String, state: StateCell) -> Self {
        Self {
            pid,
            command,
            spawned_at: Utc::now(),
            state,
        }
    }

    pub fn state(&self) -> SupervisedState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }
}

/// Ordered table of currently-live supervised processes.
///
/// Insertion order is spawn order. Every process spawned through the
/// launcher is registered exactly once and stays registered until a
/// teardown pass clears the table; the registry never silently forgets a
/// process that may still be running.
///
/// Append, snapshot and clear are individually atomic so an extension to
/// concurrent scenarios cannot corrupt the list; the surrounding driver
/// currently serializes registration and teardown anyway.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<Vec<RegisteredProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned process. Called by the launcher before any
    /// output is observed.
    pub(crate) fn register(&self, entry: RegisteredProcess) {
        let mut processes = self.inner.lock();
        // A pid may only appear once concurrently; seeing it again means the
        // previous entry is stale (the pid was reused after an exit we
        // already observed).
        if let Some(existing) = processes.iter_mut().find(|p| p.pid == entry.pid) {
            warn!(pid = entry.pid, command = %entry.command, "pid registered twice, replacing stale entry");
            *existing = entry;
            return;
        }
        processes.push(entry);
    }

    /// Ordered copy of all tracked processes.
    pub fn snapshot(&self) -> Vec<RegisteredProcess> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every entry unconditionally. Only called after a termination
    /// pass; a process that failed to terminate is still dropped, which is
    /// logged by the terminator rather than blocking the registry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
