//! Protocol and pool tests against a scripted stand-in adapter.
//!
//! A small shell script plays the adapter's role: it announces ready,
//! answers PING, exits on EXIT, and replies to everything else with a
//! canned JSON line. That exercises the whole line protocol without a
//! database.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use oraguard_executor::{
    AdapterSpec, ConnectionPool, ExecutorConnection, ExecutorError, PoolConfig,
};

const WELL_BEHAVED_ADAPTER: &str = r#"#!/bin/sh
echo '{"status":"ready","message":"stand-in adapter"}'
while IFS= read -r line; do
  case "$line" in
    PING) echo '{"status":"alive","connected":true}' ;;
    EXIT) exit 0 ;;
    *CREDS*) echo "{\"success\":true,\"rows\":[{\"USER\":\"$ORACLE_USER\"}],\"count\":1}" ;;
    *SLOW*) sleep 2; echo '{"success":true,"rows":[],"count":0}' ;;
    *BROKEN*) echo 'this is not json' ;;
    *FAIL*) echo '{"success":false,"error":"ORA-00942: table or view does not exist"}' ;;
    *) echo '{"success":true,"rows":[{"ID":1,"NAME":"ok"}],"count":1}' ;;
  esac
done
"#;

/// Writes `script` to a temp dir and returns a spec that runs it via sh.
fn adapter(dir: &TempDir, script: &str) -> AdapterSpec {
    let path = dir.path().join("adapter.sh");
    fs::write(&path, script).unwrap();
    AdapterSpec {
        command: PathBuf::from("/bin/sh"),
        args: vec![path.to_string_lossy().into_owned()],
        work_dir: None,
        env: vec![("ORACLE_USER".to_string(), "scott".to_string())],
    }
}

fn connection(dir: &TempDir, script: &str) -> ExecutorConnection {
    ExecutorConnection::new(0, adapter(dir, script), Duration::from_secs(1))
}

#[test]
fn handshake_and_query_round_trip() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    let response = conn.execute("SELECT * FROM users WHERE id = 1").unwrap();
    assert!(response.success);
    assert_eq!(response.count, 1);
    assert_eq!(response.rows[0]["NAME"], "ok");

    conn.stop();
    assert!(!conn.is_alive());
}

#[test]
fn multiline_queries_travel_as_one_request_line() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    // A row-limit-wrapped ORDER BY query spans lines; the adapter must
    // see exactly one request and send exactly one response.
    let wrapped = "SELECT * FROM (\n    SELECT * FROM u ORDER BY id\n) WHERE ROWNUM <= 10";
    let response = conn.execute(wrapped).unwrap();
    assert!(response.success);

    // The channel is still in lockstep afterwards.
    let response = conn.execute("SELECT 1 FROM dual").unwrap();
    assert!(response.success);
    conn.stop();
}

#[test]
fn ping_reports_liveness() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    assert!(!conn.ping(), "not started yet");

    conn.start().unwrap();
    assert!(conn.ping());

    conn.stop();
    assert!(!conn.ping());
}

#[test]
fn credentials_reach_the_child_through_the_environment() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    let response = conn.execute("CREDS").unwrap();
    assert_eq!(response.rows[0]["USER"], "scott");
    conn.stop();
}

#[test]
fn driver_failure_is_a_normal_response() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    let response = conn.execute("FAIL").unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().contains("ORA-00942"));
    conn.stop();
}

#[test]
fn slow_response_times_out() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    match conn.execute("SLOW") {
        Err(ExecutorError::Timeout(_)) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
    conn.stop();
}

#[test]
fn malformed_response_is_a_transport_error() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    match conn.execute("BROKEN") {
        Err(e @ ExecutorError::MalformedResponse(_)) => assert!(e.is_transport()),
        other => panic!("expected malformed response, got {other:?}"),
    }
    conn.stop();
}

#[test]
fn handshake_failure_when_adapter_exits_early() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, "#!/bin/sh\nexit 1\n");
    match conn.start() {
        Err(ExecutorError::Handshake(_)) => {}
        other => panic!("expected handshake failure, got {other:?}"),
    }
}

#[test]
fn handshake_failure_on_wrong_status() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, "#!/bin/sh\necho '{\"status\":\"starting\"}'\nsleep 5\n");
    match conn.start() {
        Err(ExecutorError::Handshake(message)) => assert!(message.contains("starting")),
        other => panic!("expected handshake failure, got {other:?}"),
    }
}

#[test]
fn dead_connection_can_be_restarted() {
    let dir = TempDir::new().unwrap();
    let conn = connection(&dir, WELL_BEHAVED_ADAPTER);
    conn.start().unwrap();

    conn.execute("EXIT").err().expect("child exits without replying");
    assert!(!conn.is_alive());

    conn.restart().unwrap();
    assert!(conn.is_alive());
    assert!(conn.execute("SELECT 1 FROM dual").unwrap().success);
    conn.stop();
}

#[test]
fn pool_starts_executes_and_reports_health() {
    let dir = TempDir::new().unwrap();
    let pool = ConnectionPool::new(
        adapter(&dir, WELL_BEHAVED_ADAPTER),
        PoolConfig {
            query_timeout: Duration::from_secs(1),
            ..PoolConfig::default()
        },
    )
    .unwrap();
    assert_eq!(pool.size(), 2);

    let response = pool.execute("SELECT * FROM dual").unwrap();
    assert!(response.success);

    let health = pool.health_check();
    assert_eq!(health.total_connections, 2);
    assert_eq!(health.healthy, 2);
    assert!(health.all_healthy);

    pool.shutdown();
}

#[test]
fn pool_construction_fails_when_an_adapter_cannot_start() {
    let dir = TempDir::new().unwrap();
    let result = ConnectionPool::new(adapter(&dir, "#!/bin/sh\nexit 1\n"), PoolConfig::default());
    assert!(result.is_err());
}

#[test]
fn pool_restarts_a_connection_after_transport_failure() {
    let dir = TempDir::new().unwrap();
    let pool = ConnectionPool::new(
        adapter(&dir, WELL_BEHAVED_ADAPTER),
        PoolConfig {
            size: 1,
            query_timeout: Duration::from_secs(1),
            ..PoolConfig::default()
        },
    )
    .unwrap();

    // Killing the child mid-call surfaces a transport error...
    assert!(pool.execute("EXIT").is_err());

    // ...but the connection comes back for the next caller.
    let response = pool.execute("SELECT 1 FROM dual").unwrap();
    assert!(response.success);

    let health = pool.health_check();
    assert_eq!(health.healthy, 1);
    pool.shutdown();
}

#[test]
fn concurrent_callers_never_interleave_protocol_frames() {
    let dir = TempDir::new().unwrap();
    let pool = std::sync::Arc::new(
        ConnectionPool::new(
            adapter(&dir, WELL_BEHAVED_ADAPTER),
            PoolConfig {
                query_timeout: Duration::from_secs(2),
                ..PoolConfig::default()
            },
        )
        .unwrap(),
    );

    // Eight threads hammer a two-connection pool. If two calls ever
    // shared a connection's stdin, the adapter would fall out of
    // lockstep and some caller would read a mismatched or missing line.
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let response = pool.execute("SELECT * FROM dual").unwrap();
                    assert!(response.success);
                    assert_eq!(response.count, 1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    pool.shutdown();
}

#[test]
fn pool_exhaustion_when_all_connections_are_claimed() {
    let dir = TempDir::new().unwrap();
    let pool = std::sync::Arc::new(
        ConnectionPool::new(
            adapter(&dir, WELL_BEHAVED_ADAPTER),
            PoolConfig {
                size: 1,
                max_wait: Duration::from_millis(200),
                retry_interval: Duration::from_millis(20),
                query_timeout: Duration::from_secs(5),
            },
        )
        .unwrap(),
    );

    let background = {
        let pool = pool.clone();
        thread::spawn(move || pool.execute("SLOW"))
    };
    // Give the background query time to claim the only connection.
    thread::sleep(Duration::from_millis(100));

    match pool.execute("SELECT 1 FROM dual") {
        Err(ExecutorError::PoolExhausted(_)) => {}
        other => panic!("expected pool exhaustion, got {other:?}"),
    }

    background.join().unwrap().unwrap();
    pool.shutdown();
}
