//! Readiness heuristic timing, observed on real processes.

#![cfg(unix)]

use harness_process::{terminate_all, Launcher, ProcessRegistry, Readiness, SpawnOptions, TermSignal};
use std::time::{Duration, Instant};

const SILENT: SpawnOptions = SpawnOptions { silent: true };

// Wide enough that shell startup time cannot blur the comparison.
const GRACE: Duration = Duration::from_millis(400);

fn harness() -> (ProcessRegistry, Launcher) {
    let registry = ProcessRegistry::new();
    let launcher = Launcher::new(registry.clone()).with_stdout_grace(GRACE);
    (registry, launcher)
}

#[tokio::test]
async fn stderr_first_resolves_without_the_grace_delay() {
    let (registry, launcher) = harness();

    let mut process = launcher
        .spawn("sh", &["-c", "echo up >&2; sleep 10"], SILENT)
        .unwrap();
    let started = Instant::now();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Ready);
    let latency = started.elapsed();

    assert!(
        latency < GRACE,
        "stderr readiness should not wait out the grace delay, took {latency:?}"
    );
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn stdout_first_resolves_only_after_the_grace_delay() {
    let (registry, launcher) = harness();

    // Identical to the stderr case except for the announcing stream.
    let mut process = launcher
        .spawn("sh", &["-c", "echo up; sleep 10"], SILENT)
        .unwrap();
    let started = Instant::now();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Ready);
    let latency = started.elapsed();

    assert!(
        latency >= GRACE,
        "stdout readiness must absorb the grace delay, took {latency:?}"
    );
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn output_is_buffered_verbatim_even_when_silent() {
    let (registry, launcher) = harness();

    let mut process = launcher
        .spawn(
            "sh",
            &["-c", "printf 'warn: odd config\\n' >&2; printf 'hello\\n'; sleep 10"],
            SILENT,
        )
        .unwrap();
    process.wait_ready().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(process.stdout().contains("hello"));
    assert!(process.stderr().contains("warn: odd config"));
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn clean_exit_during_the_grace_window_counts_as_completed() {
    let (registry, launcher) = harness();

    // Prints a banner, then exits 0 well inside the grace window.
    let mut process = launcher
        .spawn("sh", &["-c", "echo done"], SILENT)
        .unwrap();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Completed);
    terminate_all(&registry, TermSignal::default()).await;
}

#[tokio::test]
async fn backend_announcing_on_stderr_is_ready_immediately() {
    let (registry, launcher) = harness();
    let backend = e2e_tests::testbackend_path();

    let mut process = launcher
        .spawn(
            &backend.display().to_string(),
            &["--port", "4330", "--announce-stderr"],
            SILENT,
        )
        .unwrap();
    let started = Instant::now();
    assert_eq!(process.wait_ready().await.unwrap(), Readiness::Ready);
    assert!(started.elapsed() < Duration::from_secs(5));

    // The banner promised a live listener.
    let response = reqwest::get("http://localhost:4330/").await.unwrap();
    assert_eq!(response.status(), 200);

    terminate_all(&registry, TermSignal::default()).await;
}
