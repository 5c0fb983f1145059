//! End-to-end runs against a real Docker daemon.
//!
//! Run with `cargo test -p sandcastle-core --test docker_e2e -- --ignored`.

use sandcastle_core::docker::DockerRuntime;
use sandcastle_core::protocol::ExecuteRequest;
use sandcastle_core::{Orchestrator, Outcome, SandboxConfig, SandcastleError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn orchestrator() -> Orchestrator {
    let config = SandboxConfig::builder()
        .build_context(concat!(env!("CARGO_MANIFEST_DIR"), "/../../docker"))
        .single_flight_builds(true)
        .build();
    Orchestrator::new(Arc::new(DockerRuntime::connect().unwrap()), config)
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn python_hello() {
    let result = orchestrator()
        .execute(&ExecuteRequest::new("print(\"hi\")", "python"))
        .await
        .unwrap();

    assert_eq!(result.output, "hi");
    assert_eq!(result.outcome, Outcome::Completed);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn python_busy_loop_hits_the_limit() {
    let started = Instant::now();
    let err = orchestrator()
        .execute(&ExecuteRequest::new("while True: pass", "python"))
        .await
        .unwrap_err();

    assert!(matches!(err, SandcastleError::Timeout { .. }));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(4800), "{waited:?}");
    assert!(waited <= Duration::from_secs(10), "{waited:?}");
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn python_memory_hog_is_contained() {
    let started = Instant::now();
    let outcome = orchestrator()
        .execute(&ExecuteRequest::new("x = bytearray(1 << 33)\nprint(len(x))", "python"))
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let result = outcome.unwrap();
    assert!(
        result.outcome == Outcome::Crashed || !result.output.is_empty(),
        "{result:?}"
    );
}
