//! # Harness Process
//!
//! Process lifecycle supervision for the proxy e2e harness.
//!
//! This crate provides the primitives a test scenario needs to manage
//! out-of-process programs it knows nothing about internally:
//! - Cross-platform spawning (shell-wrapped on Windows, direct elsewhere)
//! - Heuristic readiness detection from raw child output
//! - A registry of every live supervised process, in spawn order
//! - Best-effort termination of whole process trees
//!
//! The usual flow is: spawn through a [`Launcher`] (which registers the
//! child), await [`SupervisedProcess::wait_ready`], run scenario assertions,
//! then drain everything with [`terminate_all`]. Teardown is always safe to
//! call, even for processes that never became ready or already exited.

pub mod launcher;
pub mod output;
pub mod readiness;
pub mod registry;
pub mod state;
pub mod terminate;

pub use launcher::{
    CompletedProcess, Launcher, SpawnOptions, SpawnStrategy, SupervisedProcess,
    DEFAULT_STDOUT_GRACE,
};
pub use readiness::{OutputSniffer, Readiness, ReadinessProbe};
pub use registry::{ProcessRegistry, RegisteredProcess};
pub use state::{StateCell, SupervisedState};
pub use terminate::{
    terminate_all, terminate_all_blocking, terminate_tree, TermSignal, TerminationAttempt,
    TerminationOutcome, TerminationReport,
};
