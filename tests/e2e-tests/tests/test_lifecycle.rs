//! Supervisor lifecycle properties, exercised against real child processes.
//!
//! These run without the proxy binary; they only need a POSIX shell.

#![cfg(unix)]

use harness_common::LaunchError;
use harness_process::{
    terminate_all, Launcher, ProcessRegistry, Readiness, SpawnOptions, TermSignal,
    TerminationOutcome,
};
use std::time::Duration;

const SILENT: SpawnOptions = SpawnOptions { silent: true };

fn harness() -> (ProcessRegistry, Launcher) {
    let registry = ProcessRegistry::new();
    let launcher = Launcher::new(registry.clone());
    (registry, launcher)
}

#[tokio::test]
async fn registry_drains_after_teardown_regardless_of_exit_codes() {
    let (registry, launcher) = harness();

    // A long-runner, a clean early exit and a failing early exit.
    launcher.spawn("sleep", &["30"], SILENT).unwrap();
    let mut ok = launcher.spawn("sh", &["-c", "exit 0"], SILENT).unwrap();
    let mut failing = launcher.spawn("sh", &["-c", "exit 3"], SILENT).unwrap();
    assert_eq!(registry.len(), 3);

    ok.wait_ready().await.unwrap();
    failing.wait_ready().await.unwrap_err();

    let report = terminate_all(&registry, TermSignal::default()).await;
    assert_eq!(report.attempts.len(), 3);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn teardown_twice_is_a_noop() {
    let (registry, launcher) = harness();
    launcher.spawn("sleep", &["30"], SILENT).unwrap();

    let first = terminate_all(&registry, TermSignal::default()).await;
    assert_eq!(first.attempts.len(), 1);
    assert!(registry.is_empty());

    let second = terminate_all(&registry, TermSignal::default()).await;
    assert!(second.attempts.is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn clean_exit_before_output_resolves_as_completed() {
    let (registry, launcher) = harness();
    let mut process = launcher.spawn("true", &[], SILENT).unwrap();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Completed);
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn failing_exit_before_output_carries_the_exit_code() {
    let (registry, launcher) = harness();
    let mut process = launcher.spawn("sh", &["-c", "exit 7"], SILENT).unwrap();
    let err = process.wait_ready().await.unwrap_err();
    assert_eq!(err.exit_code(), Some(7));
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn os_spawn_failure_registers_nothing() {
    let (registry, launcher) = harness();
    let err = launcher
        .spawn("/definitely/not/a/binary", &[], SILENT)
        .unwrap_err();
    assert!(matches!(err, LaunchError::Spawn { .. }));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn empty_argument_entries_are_dropped() {
    let (registry, launcher) = harness();
    // An empty entry between real args would make `sh -c` misparse.
    let mut process = launcher
        .spawn("sh", &["", "-c", "", "exit 0"], SILENT)
        .unwrap();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Completed);
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn terminating_the_root_also_kills_its_child() {
    let (registry, launcher) = harness();

    // The shell reports its child's pid, then waits on it.
    let mut process = launcher
        .spawn("sh", &["-c", "sleep 30 & echo $!; wait"], SILENT)
        .unwrap();
    process.wait_ready().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let child_pid: i32 = process
        .stdout()
        .trim()
        .parse()
        .expect("child pid on stdout");

    terminate_all(&registry, TermSignal::default()).await;
    assert!(registry.is_empty());

    // The grandchild must vanish from the process table, not just the root.
    let mut gone = false;
    for _ in 0..40 {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(child_pid), None) {
            Err(nix::errno::Errno::ESRCH) => {
                gone = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    assert!(gone, "child pid {child_pid} survived tree termination");
}

#[tokio::test]
async fn naturally_exited_processes_are_reported_already_gone() {
    let (registry, launcher) = harness();
    let mut process = launcher.spawn("true", &[], SILENT).unwrap();
    process.wait_ready().await.unwrap();

    let report = terminate_all(&registry, TermSignal::default()).await;
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, TerminationOutcome::AlreadyGone);
    assert!(report.is_clean());
}

#[tokio::test]
async fn exec_resolves_with_output_and_status_for_failures() {
    let (registry, launcher) = harness();
    let done = launcher
        .exec("sh", &["-c", "echo out; echo err >&2; exit 5"], SILENT)
        .await
        .unwrap();

    // A completion API: non-zero exits come back as data, not errors.
    assert_eq!(done.status.code(), Some(5));
    assert!(!done.success());
    assert!(done.stdout.contains("out"));
    assert!(done.stderr.contains("err"));

    // The exec child was tracked while running and drains with teardown.
    let report = terminate_all(&registry, TermSignal::default()).await;
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, TerminationOutcome::AlreadyGone);
    assert!(registry.is_empty());
}
