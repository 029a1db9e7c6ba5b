//! Process spawning.
//!
//! The launcher normalizes command handling across platforms, registers
//! every child with the process registry before any output is observed, and
//! wires up output capture plus an exit-monitor task that owns the `Child`
//! and reaps it (no zombies on Unix).

use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use harness_common::{LaunchError, LaunchResult, StreamType};

use crate::output::{spawn_capture_task, OutputBuffer, OutputEvent};
use crate::readiness::{OutputSniffer, Readiness, ReadinessProbe};
use crate::registry::{ProcessRegistry, RegisteredProcess};
use crate::state::{StateCell, SupervisedState};

/// Default grace delay applied after the first stdout chunk before a
/// process counts as ready. Not derived from any contract of the targets;
/// see [`Launcher::with_stdout_grace`].
pub const DEFAULT_STDOUT_GRACE: Duration = Duration::from_millis(100);

/// Options for a single spawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Suppress echoing of child output to the parent console. Capture into
    /// the in-memory buffers is unaffected.
    pub silent: bool,
}

/// How a command line is handed to the OS.
///
/// Some target executables are batch files or shell-resolved scripts that
/// the raw exec call cannot start, so Windows hosts route everything through
/// the command shell. Selected once from host detection, not per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStrategy {
    /// Execute the program directly.
    DirectExec,
    /// Execute through `cmd.exe /c <command> <args...>`.
    ShellWrapped,
}

impl SpawnStrategy {
    /// Strategy for the host this harness runs on.
    pub fn for_host() -> Self {
        if cfg!(windows) {
            SpawnStrategy::ShellWrapped
        } else {
            SpawnStrategy::DirectExec
        }
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        match self {
            SpawnStrategy::DirectExec => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            SpawnStrategy::ShellWrapped => {
                let mut cmd = Command::new("cmd.exe");
                cmd.arg("/c").arg(program).args(args);
                cmd
            }
        }
    }
}

/// Handle to one spawned, registry-tracked process.
///
/// The underlying [`Child`] is owned by a background exit-monitor task; the
/// handle exposes the pid, the lifecycle state, the readiness wait and the
/// captured output.
pub struct SupervisedProcess {
    pid: u32,
    command: String,
    state: StateCell,
    probe: Box<dyn ReadinessProbe>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

impl std::fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> SupervisedState {
        self.state.get()
    }

    /// Wait until the process is believed ready to accept work.
    ///
    /// Unbounded: the supervisor defines no internal timeout, callers wrap
    /// this in their own (`tokio::time::timeout`). Resolves at most once;
    /// repeated calls return the first resolution.
    pub async fn wait_ready(&mut self) -> LaunchResult<Readiness> {
        let readiness = self.probe.wait_ready().await;
        match &readiness {
            Ok(Readiness::Ready) => {
                self.state.advance(SupervisedState::Ready);
            }
            Ok(Readiness::Completed) => {
                self.state.advance(SupervisedState::Terminated);
            }
            Err(_) => {
                self.state.advance(SupervisedState::Terminated);
            }
        }
        readiness
    }

    /// Everything captured from stdout so far.
    pub fn stdout(&self) -> String {
        self.stdout.snapshot()
    }

    /// Everything captured from stderr so far.
    pub fn stderr(&self) -> String {
        self.stderr.snapshot()
    }
}

/// Output of a command run to completion via [`Launcher::exec`].
#[derive(Debug, Clone)]
pub struct CompletedProcess {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl CompletedProcess {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawns and tracks supervised processes.
pub struct Launcher {
    registry: ProcessRegistry,
    strategy: SpawnStrategy,
    stdout_grace: Duration,
}

impl Launcher {
    pub fn new(registry: ProcessRegistry) -> Self {
        Self {
            registry,
            strategy: SpawnStrategy::for_host(),
            stdout_grace: DEFAULT_STDOUT_GRACE,
        }
    }

    /// Override the grace delay applied after a first stdout chunk.
    pub fn with_stdout_grace(mut self, grace: Duration) -> Self {
        self.stdout_grace = grace;
        self
    }

    /// Override the platform spawn strategy.
    pub fn with_strategy(mut self, strategy: SpawnStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Spawn a supervised process.
    ///
    /// Empty argument entries are dropped. The child is registered before
    /// any output is observed, so a process that dies instantly is still
    /// part of teardown. Must be called from within a Tokio runtime.
    pub fn spawn(
        &self,
        program: &str,
        args: &[&str],
        options: SpawnOptions,
    ) -> LaunchResult<SupervisedProcess> {
        let mut spawned = self.spawn_inner(program, args)?;

        let captures = start_captures(
            &mut spawned.child,
            &spawned.stdout,
            &spawned.stderr,
            &spawned.events_tx,
            options.silent,
        );
        let probe = OutputSniffer::new(
            spawned.command.clone(),
            spawned.events_rx,
            spawned.stderr.clone(),
            self.stdout_grace,
        );
        spawn_exit_monitor(
            spawned.child,
            captures,
            spawned.command.clone(),
            spawned.state.clone(),
            spawned.events_tx,
        );

        Ok(SupervisedProcess {
            pid: spawned.pid,
            command: spawned.command,
            state: spawned.state,
            probe: Box::new(probe),
            stdout: spawned.stdout,
            stderr: spawned.stderr,
        })
    }

    /// Run a command to completion, capturing output.
    ///
    /// Unlike [`Launcher::spawn`] this resolves once the child closes, with
    /// its output and exit status regardless of the exit code - it is a
    /// completion API for build steps and helper scripts, not a readiness
    /// API. The child is registered while it runs, so a teardown firing
    /// mid-run still covers it.
    pub async fn exec(
        &self,
        program: &str,
        args: &[&str],
        options: SpawnOptions,
    ) -> LaunchResult<CompletedProcess> {
        let mut spawned = self.spawn_inner(program, args)?;

        let captures = start_captures(
            &mut spawned.child,
            &spawned.stdout,
            &spawned.stderr,
            &spawned.events_tx,
            options.silent,
        );
        drop(spawned.events_tx);

        let status = spawned.child.wait().await.map_err(|e| LaunchError::Spawn {
            command: spawned.command.clone(),
            source: e,
        })?;
        for capture in captures {
            let _ = capture.await;
        }
        spawned.state.advance(SupervisedState::Terminated);

        Ok(CompletedProcess {
            stdout: spawned.stdout.snapshot(),
            stderr: spawned.stderr.snapshot(),
            status,
        })
    }

    fn spawn_inner(&self, program: &str, args: &[&str]) -> LaunchResult<SpawnedChild> {
        let args: Vec<String> = args
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| a.to_string())
            .collect();
        let command = render_command(program, &args);

        let mut cmd = self.strategy.command(program, &args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| LaunchError::spawn(command.clone(), e))?;
        let pid = child.id().unwrap_or(0);
        let state = StateCell::new();

        // Track before any output is observed so an instantly-dying child
        // is still part of teardown.
        self.registry
            .register(RegisteredProcess::new(pid, command.clone(), state.clone()));
        debug!(pid, %command, "spawned");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(SpawnedChild {
            child,
            pid,
            command,
            state,
            events_tx,
            events_rx,
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
        })
    }
}

/// A spawned, registered child before its monitoring tasks are wired up.
struct SpawnedChild {
    child: Child,
    pid: u32,
    command: String,
    state: StateCell,
    events_tx: UnboundedSender<OutputEvent>,
    events_rx: mpsc::UnboundedReceiver<OutputEvent>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

fn start_captures(
    child: &mut Child,
    stdout_buf: &OutputBuffer,
    stderr_buf: &OutputBuffer,
    events: &UnboundedSender<OutputEvent>,
    silent: bool,
) -> Vec<JoinHandle<()>> {
    let mut captures = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        captures.push(spawn_capture_task(
            stdout,
            StreamType::Stdout,
            stdout_buf.clone(),
            events.clone(),
            silent,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        captures.push(spawn_capture_task(
            stderr,
            StreamType::Stderr,
            stderr_buf.clone(),
            events.clone(),
            silent,
        ));
    }
    captures
}

/// Own the child, reap it, and report its exit after both streams drained
/// (so an exit event never races the output that preceded it).
fn spawn_exit_monitor(
    mut child: Child,
    captures: Vec<JoinHandle<()>>,
    command: String,
    state: StateCell,
    events: UnboundedSender<OutputEvent>,
) {
    tokio::spawn(async move {
        let waited = child.wait().await;
        for capture in captures {
            let _ = capture.await;
        }
        match waited {
            Ok(status) => {
                // Reaped; teardown no longer has anything to signal here.
                state.advance(SupervisedState::Terminated);
                debug!(%command, %status, "process exited");
                let _ = events.send(OutputEvent::Exited(status));
            }
            Err(e) => {
                warn!(%command, error = %e, "failed to await child exit");
                let _ = events.send(OutputEvent::WaitFailed);
            }
        }
    });
}

fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
