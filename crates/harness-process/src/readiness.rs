//! Readiness detection for supervised processes.
//!
//! There is no health-check protocol with the children: readiness is
//! inferred from their output streams. The heuristic is deliberately
//! permissive. Early stderr output counts as a go-ahead, not an error,
//! because the systems under test print informational startup lines to
//! either stream:
//!
//! - the first chunk on **stderr** resolves readiness immediately;
//! - the first chunk on **stdout** resolves after a short grace delay, so a
//!   banner flushed in several writes counts as one startup;
//! - an exit before any output resolves by exit code: zero is a benign
//!   already-complete run, non-zero is a launch failure carrying the code
//!   and captured stderr.
//!
//! The probe resolves at most once per process; later output only buffers
//! and echoes. No timeout is enforced here - callers wrap the wait in their
//! own bound.

use async_trait::async_trait;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

use harness_common::{LaunchError, LaunchResult, StreamType};

use crate::output::{OutputBuffer, OutputEvent};

/// Resolution of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The process produced output and is assumed to accept work.
    Ready,
    /// The process exited with code 0 before producing output; there is
    /// nothing left to wait for.
    Completed,
}

/// Seam for readiness detection.
///
/// The output heuristic behind [`OutputSniffer`] can be replaced by a real
/// health-check call later without touching callers.
#[async_trait]
pub trait ReadinessProbe: Send {
    async fn wait_ready(&mut self) -> LaunchResult<Readiness>;
}

enum Resolution {
    Done(Readiness),
    Failed(ExitStatus),
    Lost,
}

/// Stream-sniffing readiness probe consuming the capture-task event feed.
pub struct OutputSniffer {
    command: String,
    events: UnboundedReceiver<OutputEvent>,
    stderr: OutputBuffer,
    grace: Duration,
    resolution: Option<Resolution>,
}

impl OutputSniffer {
    pub(crate) fn new(
        command: String,
        events: UnboundedReceiver<OutputEvent>,
        stderr: OutputBuffer,
        grace: Duration,
    ) -> Self {
        Self {
            command,
            events,
            stderr,
            grace,
            resolution: None,
        }
    }

    fn failure(&self, status: ExitStatus) -> LaunchError {
        LaunchError::exited_before_ready(self.command.clone(), status, self.stderr.snapshot())
    }

    fn lost(&self) -> LaunchError {
        LaunchError::supervision(self.command.clone(), "exit status unavailable")
    }

    async fn sniff(&mut self) -> Resolution {
        match self.events.recv().await {
            Some(OutputEvent::Chunk(StreamType::Stderr)) => Resolution::Done(Readiness::Ready),
            Some(OutputEvent::Chunk(StreamType::Stdout)) => self.grace_window().await,
            Some(OutputEvent::Exited(status)) if status.success() => {
                Resolution::Done(Readiness::Completed)
            }
            Some(OutputEvent::Exited(status)) => Resolution::Failed(status),
            Some(OutputEvent::WaitFailed) | None => Resolution::Lost,
        }
    }

    /// A stdout banner arrived. Hold for the grace delay; stderr output or
    /// an exit inside the window still settles the wait first.
    async fn grace_window(&mut self) -> Resolution {
        let deadline = sleep(self.grace);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return Resolution::Done(Readiness::Ready),
                event = self.events.recv() => match event {
                    Some(OutputEvent::Chunk(StreamType::Stderr)) => {
                        return Resolution::Done(Readiness::Ready);
                    }
                    // Further banner flushes do not reset the window.
                    Some(OutputEvent::Chunk(StreamType::Stdout)) => {}
                    Some(OutputEvent::Exited(status)) if status.success() => {
                        return Resolution::Done(Readiness::Completed);
                    }
                    Some(OutputEvent::Exited(status)) => return Resolution::Failed(status),
                    Some(OutputEvent::WaitFailed) => return Resolution::Lost,
                    // Event feed gone after output was seen: the banner is
                    // the best signal left.
                    None => return Resolution::Done(Readiness::Ready),
                },
            }
        }
    }
}

#[async_trait]
impl ReadinessProbe for OutputSniffer {
    async fn wait_ready(&mut self) -> LaunchResult<Readiness> {
        if self.resolution.is_none() {
            let resolution = self.sniff().await;
            self.resolution = Some(resolution);
        }
        match self.resolution.as_ref() {
            Some(Resolution::Done(readiness)) => Ok(*readiness),
            Some(Resolution::Failed(status)) => Err(self.failure(*status)),
            Some(Resolution::Lost) | None => Err(self.lost()),
        }
    }
}
