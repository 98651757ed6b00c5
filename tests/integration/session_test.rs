//! Connection session integration tests.
//!
//! Tests reset and shutdown against queries that are still running.

use std::time::Duration;

use litexplore::error::EngineError;
use litexplore::query::{QueryRequest, RemoteExecutor};

use super::fake_remote::FakeRemote;

/// Scenario: Reset while a query is running
/// Given a query whose engine takes a second to finish
/// When reset is called while the query is in flight
/// Then reset only completes after the query has finished
/// And the query still returns its rows
/// And the session directory is replaced
#[tokio::test]
async fn test_reset_waits_for_in_flight_query() {
    let remote = FakeRemote::new(
        r#"echo $$ > "$DIR/pid"
printf '{"n":1}\n'
sleep 1
printf '{"n":2}\n'"#,
    );
    let executor = remote.default_executor();
    let dir_before = executor.channels().session().dir().await.unwrap();

    let query = tokio::spawn({
        let executor = executor.clone();
        let target = remote.target();
        async move { executor.execute(&target, &QueryRequest::new("select n")).await }
    });

    remote.wait_for("pid").await;
    executor.reset().await.unwrap();
    assert!(query.is_finished());

    let outcome = query.await.unwrap().unwrap();
    assert_eq!(outcome.row_count(), 2);
    assert!(!outcome.timed_out);

    let dir_after = executor.channels().session().dir().await.unwrap();
    assert_ne!(dir_before, dir_after);
    assert!(!dir_before.exists());
    assert!(dir_after.exists());
}

/// Scenario: Reset closes master connections
/// Given a host whose control socket exists
/// When reset is called
/// Then ssh is asked to exit that master connection
#[tokio::test]
async fn test_reset_closes_open_masters() {
    let remote = FakeRemote::new(r#"cat > /dev/null"#);
    let executor = remote.default_executor();
    executor
        .execute(&remote.target(), &QueryRequest::new("select 1"))
        .await
        .unwrap();

    let control_path = remote
        .ssh_args()
        .iter()
        .find_map(|arg| arg.strip_prefix("ControlPath=").map(str::to_string))
        .unwrap();
    std::fs::write(&control_path, "").unwrap();

    executor.reset().await.unwrap();

    let exits = remote.read("master_exit").unwrap();
    assert!(exits.contains("db-box -O exit"));
    assert!(exits.contains(&control_path));
}

/// Scenario: Queries after reset get a fresh session
#[tokio::test]
async fn test_query_after_reset() {
    let remote = FakeRemote::new(r#"printf '{"n":1}\n'"#);
    let executor = remote.default_executor();
    let target = remote.target();

    executor.reset().await.unwrap();
    let outcome = executor
        .execute(&target, &QueryRequest::new("select 1"))
        .await
        .unwrap();
    assert_eq!(outcome.row_count(), 1);

    let dir = executor.channels().session().dir().await.unwrap();
    assert!(remote
        .ssh_args()
        .iter()
        .any(|arg| arg.starts_with(&format!("ControlPath={}", dir.display()))));
}

/// Scenario: Shutdown ends the session
/// Given an executor that has been shut down
/// When a query is attempted
/// Then a Configuration error is returned without starting ssh
#[tokio::test]
async fn test_query_after_shutdown_fails() {
    let remote = FakeRemote::new(r#"printf '{"n":1}\n'"#);
    let executor = remote.executor(10, Duration::from_secs(5));
    let dir = executor.channels().session().dir().await.unwrap();

    executor.shutdown().await.unwrap();
    assert!(!dir.exists());

    let err = executor
        .execute(&remote.target(), &QueryRequest::new("select 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert!(remote.read("args").is_none());
}
