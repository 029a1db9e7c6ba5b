//! Error types for the harness.

use std::process::ExitStatus;
use thiserror::Error;

/// Result type alias for launch operations.
pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

/// A supervised process failed to launch.
///
/// Either the OS refused the spawn outright, or the child exited before it
/// produced a readiness signal. The captured stderr text is carried verbatim
/// so a failing scenario can show what the child printed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Spawning failed at the OS level (executable not found, permission
    /// denied). Nothing was registered.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child exited with a non-zero status before becoming ready.
    #[error("`{command}` exited before becoming ready ({status}): {stderr}")]
    ExitedBeforeReady {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The harness lost track of the child before readiness resolved
    /// (its exit status could not be observed).
    #[error("lost track of `{command}` before readiness: {reason}")]
    Supervision { command: String, reason: String },
}

impl LaunchError {
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    pub fn exited_before_ready(
        command: impl Into<String>,
        status: ExitStatus,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExitedBeforeReady {
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }

    pub fn supervision(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Supervision {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Exit code of the child, when the failure was an early exit with one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitedBeforeReady { status, .. } => status.code(),
            _ => None,
        }
    }

    /// Stderr text captured up to the failure, when any was observed.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExitedBeforeReady { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Signal delivery to a process tree failed.
///
/// Recorded per attempt inside a termination report and never escalated:
/// one stuck process must not prevent cleanup of the others.
#[derive(Debug, Clone, Error)]
#[error("failed to signal process tree rooted at pid {pid}: {reason}")]
pub struct TerminationError {
    pub pid: u32,
    pub reason: String,
}
