//! Query execution integration tests.
//!
//! Tests the bounded read path (row cap, time budget, error classification)
//! and the run-to-completion path against a fake remote engine.

use std::time::{Duration, Instant};

use futures::future::try_join_all;
use litexplore::error::EngineError;
use litexplore::query::{build_script, QueryRequest, RemoteExecutor};
use litexplore::types::Value;
use pretty_assertions::assert_eq;

use super::fake_remote::{process_alive, FakeRemote};

const TWO_ROWS: &str = r#"cat > "$DIR/script"
printf '%s\n' '[{"id":1,"name":"alice"},' '{"id":2,"name":null}]'"#;

/// Scenario: Query with fewer rows than the cap
/// Given an engine that prints two rows and exits
/// When execute is called
/// Then both rows are returned in order
/// And the outcome is neither truncated nor timed out
#[tokio::test]
async fn test_rows_under_cap() {
    let remote = FakeRemote::new(TWO_ROWS);
    let executor = remote.default_executor();

    let outcome = executor
        .execute(&remote.target(), &QueryRequest::new("select * from users"))
        .await
        .unwrap();

    assert_eq!(outcome.row_count(), 2);
    assert!(!outcome.truncated);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.rows[0].get("id"), Some(&Value::Integer(1)));
    assert_eq!(outcome.rows[0].get_text("name"), Some("alice"));
    assert_eq!(outcome.rows[1].get("name"), Some(&Value::Null));
}

/// Scenario: The engine receives the parameter prelude and the SQL
/// Given a query with two parameters
/// When execute is called
/// Then the engine's stdin is exactly the built script
/// And the remote command opens the database read-only
#[tokio::test]
async fn test_engine_receives_script_and_command() {
    let remote = FakeRemote::new(TWO_ROWS);
    let executor = remote.default_executor();
    let request = QueryRequest::new("select * from users where id = :id and name = :name")
        .with_param("name", "O'Brien")
        .with_param("id", 7i64);

    executor.execute(&remote.target(), &request).await.unwrap();

    let expected = build_script(&request.sql, &request.params).unwrap();
    assert_eq!(remote.read("script").unwrap(), expected);
    assert_eq!(
        remote.read("remote_cmd").unwrap().trim_end(),
        "'sqlite3' -json 'file:///srv/app.sqlite?mode=ro'"
    );

    let args = remote.ssh_args();
    assert!(args.contains(&"ControlMaster=auto".to_string()));
    assert!(args.contains(&"ControlPersist=5m".to_string()));
    assert!(args.iter().any(|arg| arg.starts_with("ControlPath=")));
    assert!(args.contains(&"db-box".to_string()));
}

/// Scenario: Write requests open the database read-write
#[tokio::test]
async fn test_write_request_drops_read_only_mode() {
    let remote = FakeRemote::new(r#"cat > /dev/null"#);
    let executor = remote.default_executor();

    let outcome = executor
        .execute(
            &remote.target(),
            &QueryRequest::new("delete from sessions").writable(true),
        )
        .await
        .unwrap();

    assert!(outcome.is_empty());
    assert_eq!(
        remote.read("remote_cmd").unwrap().trim_end(),
        "'sqlite3' -json 'file:///srv/app.sqlite'"
    );
}

/// Scenario: Result larger than the cap
/// Given an engine that prints rows forever
/// When execute is called with a cap of 5
/// Then exactly 5 rows are returned with truncated set
/// And the engine process is gone
#[tokio::test]
async fn test_row_cap_truncates_and_terminates() {
    let remote = FakeRemote::new(
        r#"echo $$ > "$DIR/pid"
i=0
while :; do
  i=$((i+1))
  printf '{"n":%d},\n' "$i"
done"#,
    );
    let executor = remote.executor(5, Duration::from_secs(10));

    let outcome = executor
        .execute(&remote.target(), &QueryRequest::new("select n from numbers"))
        .await
        .unwrap();

    assert_eq!(outcome.row_count(), 5);
    assert!(outcome.truncated);
    assert!(!outcome.timed_out);
    let numbers: Vec<_> = outcome.rows.iter().map(|row| row.get("n").cloned()).collect();
    assert_eq!(
        numbers,
        (1..=5).map(|n| Some(Value::Integer(n))).collect::<Vec<_>>()
    );
    assert!(!process_alive(remote.engine_pid()));
}

/// Scenario: Result exactly the size of the cap
/// Given an engine that prints 3 rows and exits
/// When execute is called with a cap of 3
/// Then the outcome is reported as truncated
#[tokio::test]
async fn test_cap_reached_exactly_is_truncated() {
    let remote = FakeRemote::new(r#"printf '{"n":1}\n{"n":2}\n{"n":3}\n'"#);
    let executor = remote.executor(3, Duration::from_secs(10));

    let outcome = executor
        .execute(&remote.target(), &QueryRequest::new("select n"))
        .await
        .unwrap();

    assert_eq!(outcome.row_count(), 3);
    assert!(outcome.truncated);
}

/// Scenario: Engine stalls after a few rows
/// Given an engine that prints two rows and then hangs
/// When execute is called with a 300ms budget
/// Then the two rows come back with timed_out set
/// And the call returns promptly
/// And the engine process is gone
#[tokio::test]
async fn test_timeout_keeps_partial_rows_and_terminates() {
    let remote = FakeRemote::new(
        r#"echo $$ > "$DIR/pid"
printf '{"n":1}\n{"n":2}\n'
exec sleep 30"#,
    );
    let executor = remote.executor(100, Duration::from_millis(300));

    let start = Instant::now();
    let outcome = executor
        .execute(&remote.target(), &QueryRequest::new("select n"))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(outcome.timed_out);
    assert!(!outcome.truncated);
    assert_eq!(outcome.row_count(), 2);
    assert!(!process_alive(remote.engine_pid()));

    match outcome.into_rows() {
        Err(EngineError::Timeout { rows }) => assert_eq!(rows.len(), 2),
        other => panic!("expected timeout, got {other:?}"),
    }
}

/// Scenario: Engine that keeps talking past the budget
/// Given an engine that prints rows slowly and never stops
/// When execute is called with a 300ms budget and a large cap
/// Then the read stops at the deadline with timed_out set
#[tokio::test]
async fn test_timeout_with_steady_output() {
    let remote = FakeRemote::new(
        r#"while :; do
  printf '{"n":1}\n'
  sleep 0.05
done"#,
    );
    let executor = remote.executor(1_000_000, Duration::from_millis(300));

    let outcome = executor
        .execute(&remote.target(), &QueryRequest::new("select n"))
        .await
        .unwrap();

    assert!(outcome.timed_out);
    assert!(!outcome.truncated);
}

/// Scenario: Table holding infinite reals
/// Given an engine that prints 9.0e+999 and -9.0e+999 between finite rows
/// When execute and execute_once are called
/// Then every row survives with the infinities as reals
#[tokio::test]
async fn test_infinite_reals_survive_both_paths() {
    let remote = FakeRemote::new(
        r#"cat > /dev/null
printf '%s\n' '[{"x":1},' '{"x":9.0e+999},' '{"x":-9.0e+999},' '{"x":3}]'"#,
    );
    let executor = remote.default_executor();
    let request = QueryRequest::new("select x from measurements");
    let expected = vec![
        Some(Value::Integer(1)),
        Some(Value::Real(f64::INFINITY)),
        Some(Value::Real(f64::NEG_INFINITY)),
        Some(Value::Integer(3)),
    ];

    let outcome = executor.execute(&remote.target(), &request).await.unwrap();
    assert!(!outcome.truncated);
    let values: Vec<_> = outcome.rows.iter().map(|row| row.get("x").cloned()).collect();
    assert_eq!(values, expected);

    let rows = executor
        .execute_once(&remote.target(), &request)
        .await
        .unwrap()
        .unwrap();
    let values: Vec<_> = rows.iter().map(|row| row.get("x").cloned()).collect();
    assert_eq!(values, expected);
}

/// Scenario: Malformed line in the middle of the output
/// Given an engine whose second line is not JSON
/// When execute is called
/// Then a Decode error is returned and no rows survive
#[tokio::test]
async fn test_malformed_line_is_decode_error() {
    let remote = FakeRemote::new(r#"printf '{"n":1}\nnot json\n{"n":3}\n'"#);
    let executor = remote.default_executor();

    let err = executor
        .execute(&remote.target(), &QueryRequest::new("select n"))
        .await
        .unwrap_err();

    match err {
        EngineError::Decode { line, .. } => assert_eq!(line, "not json"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

/// Scenario: Engine rejects the SQL
/// Given an engine that reports a parse error on stderr
/// When execute is called with "selct 1"
/// Then a Syntax error carrying "selct 1" is returned
#[tokio::test]
async fn test_parse_error_is_syntax_error() {
    let remote = FakeRemote::new(
        r#"cat > /dev/null
echo 'Parse error near line 4: near "selct": syntax error' >&2
exit 1"#,
    );
    let executor = remote.default_executor();

    let err = executor
        .execute(&remote.target(), &QueryRequest::new("selct 1"))
        .await
        .unwrap_err();

    match err {
        EngineError::Syntax { message, query } => {
            assert_eq!(query, "selct 1");
            assert!(message.contains("near \"selct\""));
        }
        other => panic!("expected syntax error, got {other:?}"),
    }
}

/// Scenario: ssh fails for a reason unrelated to the SQL
#[tokio::test]
async fn test_unclassified_failure_is_connectivity_error() {
    let remote = FakeRemote::new(
        r#"echo 'ssh: connect to host db-box port 22: Connection refused' >&2
exit 255"#,
    );
    let executor = remote.default_executor();

    let err = executor
        .execute(&remote.target(), &QueryRequest::new("select 1"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Connectivity(_)));
    assert!(err.is_session_fatal());
}

/// Scenario: Invalid parameter name
/// Given a request with a parameter name containing a space
/// When execute is called
/// Then a Validation error is returned
/// And the fake ssh was never started
#[tokio::test]
async fn test_invalid_param_never_spawns() {
    let remote = FakeRemote::new(TWO_ROWS);
    let executor = remote.default_executor();
    let request = QueryRequest::new("select :x").with_param("x y", 1i64);

    let err = executor.execute(&remote.target(), &request).await.unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert!(remote.read("args").is_none());
}

/// Scenario: Several queries at once on one executor
/// Given five concurrent queries against the same host
/// When they all complete
/// Then each returns its full result
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries() {
    let remote = FakeRemote::new(
        r#"cat > /dev/null
sleep 0.2
printf '{"n":1}\n{"n":2}\n'"#,
    );
    let executor = remote.default_executor();
    let target = remote.target();

    let start = Instant::now();
    let outcomes = try_join_all((0..5).map(|i| {
        let executor = executor.clone();
        let target = target.clone();
        async move {
            executor
                .execute(&target, &QueryRequest::new(format!("select {i}")))
                .await
        }
    }))
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|outcome| outcome.row_count() == 2));
    assert!(start.elapsed() < Duration::from_secs(5));
}

/// Scenario: Run-to-completion returns all rows
/// Given an engine that prints a JSON array of three rows
/// When execute_once is called
/// Then all three rows are returned
#[tokio::test]
async fn test_execute_once_returns_rows() {
    let remote = FakeRemote::new(
        r#"cat > /dev/null
printf '%s\n' '[{"n":1},' '{"n":2},' '{"n":3}]'"#,
    );
    let executor = remote.executor(1, Duration::from_secs(10));

    let rows = executor
        .execute_once(&remote.target(), &QueryRequest::new("select n"))
        .await
        .unwrap()
        .unwrap();

    // The row cap only applies to the bounded path.
    assert_eq!(rows.len(), 3);
}

/// Scenario: Run-to-completion with no output
#[tokio::test]
async fn test_execute_once_empty_output_is_none() {
    let remote = FakeRemote::new(r#"cat > /dev/null"#);
    let executor = remote.default_executor();

    let rows = executor
        .execute_once(&remote.target(), &QueryRequest::new("PRAGMA foreign_key_list([t])"))
        .await
        .unwrap();

    assert_eq!(rows, None);
}

/// Scenario: Run-to-completion with a failing engine
/// Given an engine that reports a parse error and exits non-zero
/// When execute_once is called
/// Then a Connectivity error is returned, not a Syntax error
#[tokio::test]
async fn test_execute_once_failure_is_connectivity_error() {
    let remote = FakeRemote::new(
        r#"cat > /dev/null
echo 'Parse error near line 4: oops' >&2
exit 1"#,
    );
    let executor = remote.default_executor();

    let err = executor
        .execute_once(&remote.target(), &QueryRequest::new("selct"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Connectivity(_)));
    assert!(err.to_string().contains("Parse error"));
}
