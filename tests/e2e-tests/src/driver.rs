//! Scenario driver: owns the registry and launcher for one scenario and
//! guarantees teardown on every exit path.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use harness_common::LaunchError;
use harness_config::{write_config, ProxyConfig};
use harness_process::{
    terminate_all, terminate_all_blocking, CompletedProcess, Launcher, ProcessRegistry,
    SpawnOptions, SupervisedProcess, TermSignal, TerminationReport,
};

/// Default bound a scenario puts on readiness waits. The supervisor core
/// itself never times out.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced to scenarios by the driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The caller-imposed bound on a readiness wait elapsed.
    #[error("`{command}` produced no readiness signal within {timeout:?}")]
    ReadyTimeout { command: String, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// One scenario's process supervision context.
///
/// Each driver owns its registry, so parallel scenarios in one test binary
/// never share tracked processes. Dropping the driver tree-kills anything a
/// panicking scenario left behind.
pub struct ScenarioDriver {
    registry: ProcessRegistry,
    launcher: Launcher,
    ready_timeout: Duration,
    verbose: bool,
}

impl Default for ScenarioDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioDriver {
    pub fn new() -> Self {
        crate::init_test_logging();
        let registry = ProcessRegistry::new();
        let launcher = Launcher::new(registry.clone());
        Self {
            registry,
            launcher,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            verbose: false,
        }
    }

    /// Echo child output to the console instead of only buffering it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Spawn a process and wait until it looks ready to accept work.
    pub async fn start(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<SupervisedProcess, DriverError> {
        let mut process = self.launcher.spawn(
            program,
            args,
            SpawnOptions {
                silent: !self.verbose,
            },
        )?;
        match timeout(self.ready_timeout, process.wait_ready()).await {
            Ok(Ok(_)) => Ok(process),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DriverError::ReadyTimeout {
                command: process.command().to_string(),
                timeout: self.ready_timeout,
            }),
        }
    }

    /// Launch the in-repo backend test server on `port`.
    pub async fn start_backend(&self, port: u16) -> Result<SupervisedProcess, DriverError> {
        let backend = crate::testbackend_path();
        let port = port.to_string();
        self.start(&backend.display().to_string(), &["--port", &port])
            .await
    }

    /// Launch the proxy under test against a written config file.
    pub async fn start_proxy(
        &self,
        proxy_bin: &Path,
        config_path: &Path,
    ) -> Result<SupervisedProcess, DriverError> {
        self.start(
            &proxy_bin.display().to_string(),
            &["-c", &config_path.display().to_string()],
        )
        .await
    }

    /// Write a proxy config into `dir` and return its path.
    pub async fn write_proxy_config(
        &self,
        dir: &Path,
        config: &ProxyConfig,
    ) -> Result<PathBuf, DriverError> {
        let path = dir.join("proxy.json");
        write_config(&path, config)
            .await
            .map_err(|e| DriverError::Io {
                context: format!("failed to write proxy config {}", path.display()),
                source: e,
            })?;
        Ok(path)
    }

    /// Run a one-shot command (builds, cert scripts) to completion.
    pub async fn exec(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CompletedProcess, DriverError> {
        let done = self
            .launcher
            .exec(
                program,
                args,
                SpawnOptions {
                    silent: !self.verbose,
                },
            )
            .await?;
        Ok(done)
    }

    /// Tear down every process started in this scenario.
    ///
    /// Always settles and always leaves the registry empty; per-process
    /// failures are recorded in the report and logged, never raised.
    pub async fn teardown(&self) -> TerminationReport {
        terminate_all(&self.registry, TermSignal::default()).await
    }
}

impl Drop for ScenarioDriver {
    /// Last-resort cleanup for scenarios that unwind before teardown, so a
    /// failing assertion cannot leak processes into the next test.
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            warn!(
                remaining = self.registry.len(),
                "scenario dropped with live processes, tree-killing the remainder"
            );
            terminate_all_blocking(&self.registry, TermSignal::default());
        }
    }
}
