//! Best-effort termination of whole process trees.
//!
//! The targets may spawn further children (worker processes, build tools
//! forking compilers) that must not survive a test, so termination always
//! addresses the tree rooted at a tracked pid, not the single process.
//!
//! Teardown never blocks on a stuck process: each tracked root gets exactly
//! one signal fan-out over its descendants, individual failures are
//! recorded in a report and the registry is cleared regardless. Actual exit
//! is not verified - the OS does not guarantee confirmation, and a process
//! that ignores the signal is leaked rather than holding up the suite.

use std::collections::HashMap;
use std::fmt;
use sysinfo::System;
use tracing::{debug, warn};

use crate::registry::{ProcessRegistry, RegisteredProcess};
use crate::state::SupervisedState;

/// Signal requested for a termination pass.
///
/// On Windows, where named signals do not exist, any request degrades to
/// unconditional process termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermSignal {
    #[default]
    Term,
    Int,
    Kill,
}

impl fmt::Display for TermSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermSignal::Term => write!(f, "SIGTERM"),
            TermSignal::Int => write!(f, "SIGINT"),
            TermSignal::Kill => write!(f, "SIGKILL"),
        }
    }
}

#[cfg(unix)]
impl TermSignal {
    fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            TermSignal::Term => Signal::SIGTERM,
            TermSignal::Int => Signal::SIGINT,
            TermSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// Result of one tree-termination attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// At least one member of the tree was signaled.
    Terminated,
    /// The whole tree was gone before anything was signaled.
    AlreadyGone,
    /// Signal delivery failed for part of the tree.
    Failed(String),
}

/// One entry of a termination report.
#[derive(Debug, Clone)]
pub struct TerminationAttempt {
    pub pid: u32,
    pub command: String,
    pub outcome: TerminationOutcome,
}

/// Aggregate of one teardown pass.
///
/// Individual failures are recorded here, never escalated: one stuck
/// process must not prevent cleanup of the others.
#[derive(Debug, Clone, Default)]
pub struct TerminationReport {
    pub attempts: Vec<TerminationAttempt>,
}

impl TerminationReport {
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TerminationAttempt> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, TerminationOutcome::Failed(_)))
    }
}

/// Signal the process tree rooted at `pid`.
///
/// Descendants are discovered from one snapshot of the OS process table and
/// signaled deepest-first, root last. A root that is already gone is not an
/// error; that is the common case at teardown time. Blocking (process-table
/// enumeration); call through [`terminate_all`] from async code.
pub fn terminate_tree(pid: u32, signal: TermSignal) -> TerminationOutcome {
    let sys = System::new_all();
    terminate_tree_in_table(&children_by_parent(&sys), pid, signal)
}

/// Terminate every tracked process tree and clear the registry.
///
/// Always settles: every entry is attempted (an unordered fan-out of
/// independent attempts), outcomes are aggregated, and the registry is
/// emptied even if some attempts failed. Calling this on an empty registry
/// is a no-op.
pub async fn terminate_all(registry: &ProcessRegistry, signal: TermSignal) -> TerminationReport {
    let snapshot = registry.snapshot();
    if snapshot.is_empty() {
        registry.clear();
        return TerminationReport::default();
    }

    let report = tokio::task::spawn_blocking(move || run_pass(snapshot, signal))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "termination pass panicked");
            TerminationReport::default()
        });

    finish_pass(registry, &report);
    report
}

/// Synchronous variant of [`terminate_all`], for `Drop` guards and other
/// non-async exit paths.
pub fn terminate_all_blocking(
    registry: &ProcessRegistry,
    signal: TermSignal,
) -> TerminationReport {
    let snapshot = registry.snapshot();
    if snapshot.is_empty() {
        registry.clear();
        return TerminationReport::default();
    }
    let report = run_pass(snapshot, signal);
    finish_pass(registry, &report);
    report
}

fn finish_pass(registry: &ProcessRegistry, report: &TerminationReport) {
    for failed in report.failures() {
        warn!(
            pid = failed.pid,
            command = %failed.command,
            outcome = ?failed.outcome,
            "process tree not cleanly terminated"
        );
    }
    registry.clear();
}

fn run_pass(snapshot: Vec<RegisteredProcess>, signal: TermSignal) -> TerminationReport {
    let sys = System::new_all();
    let table = children_by_parent(&sys);

    let mut attempts = Vec::with_capacity(snapshot.len());
    for entry in snapshot {
        let outcome = if entry.state() == SupervisedState::Terminated {
            // Exit already observed and reaped; do not signal what may by
            // now be a reused pid.
            TerminationOutcome::AlreadyGone
        } else {
            entry.state_cell().advance(SupervisedState::Terminating);
            terminate_tree_in_table(&table, entry.pid, signal)
        };
        entry.state_cell().advance(SupervisedState::Terminated);
        debug!(pid = entry.pid, command = %entry.command, outcome = ?outcome, %signal, "termination attempt");
        attempts.push(TerminationAttempt {
            pid: entry.pid,
            command: entry.command.clone(),
            outcome,
        });
    }
    TerminationReport { attempts }
}

/// Parent pid -> child pids, from one process-table snapshot.
fn children_by_parent(sys: &System) -> HashMap<u32, Vec<u32>> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children
                .entry(parent.as_u32())
                .or_default()
                .push(pid.as_u32());
        }
    }
    children
}

/// Breadth-first membership walk from `root`; every child appears after its
/// parent, so the reversed order signals leaves before their parents.
fn tree_members(children: &HashMap<u32, Vec<u32>>, root: u32) -> Vec<u32> {
    let mut order = vec![root];
    let mut next = 0;
    while next < order.len() {
        if let Some(kids) = children.get(&order[next]) {
            order.extend_from_slice(kids);
        }
        next += 1;
    }
    order
}

fn terminate_tree_in_table(
    children: &HashMap<u32, Vec<u32>>,
    root: u32,
    signal: TermSignal,
) -> TerminationOutcome {
    let order = tree_members(children, root);

    let mut delivered = false;
    let mut failures = Vec::new();
    for &pid in order.iter().rev() {
        match deliver(pid, signal) {
            Delivery::Delivered => delivered = true,
            Delivery::Gone => {}
            Delivery::Failed(reason) => failures.push(format!("pid {pid}: {reason}")),
        }
    }

    if !failures.is_empty() {
        TerminationOutcome::Failed(failures.join("; "))
    } else if delivered {
        TerminationOutcome::Terminated
    } else {
        TerminationOutcome::AlreadyGone
    }
}

enum Delivery {
    Delivered,
    Gone,
    Failed(String),
}

#[cfg(unix)]
fn deliver(pid: u32, signal: TermSignal) -> Delivery {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal.to_nix()) {
        Ok(()) => Delivery::Delivered,
        Err(Errno::ESRCH) => Delivery::Gone,
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

#[cfg(windows)]
fn deliver(pid: u32, _signal: TermSignal) -> Delivery {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        // An unopenable handle usually means the process is gone already
        // (invalid parameter) or out of reach; either way there is nothing
        // useful left to do with it at teardown time.
        let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
            Ok(h) if !h.is_invalid() => h,
            _ => return Delivery::Gone,
        };

        let result = TerminateProcess(handle, 1);
        let _ = CloseHandle(handle);

        match result {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }
}
