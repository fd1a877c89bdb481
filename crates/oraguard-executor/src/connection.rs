//! One long-lived adapter subprocess and its per-call discipline.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::protocol::{PingResponse, QueryResponse, ReadyResponse, EXIT_COMMAND, PING_COMMAND};

/// Grace period between `EXIT` and a kill.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How the adapter child is launched.
///
/// Credentials belong in `env`, never in `args`: argv is visible to
/// every process on the host.
#[derive(Debug, Clone)]
pub struct AdapterSpec {
    /// Adapter executable.
    pub command: PathBuf,
    /// Arguments (connect descriptor, driver options).
    pub args: Vec<String>,
    /// Working directory for the child.
    pub work_dir: Option<PathBuf>,
    /// Extra environment entries, layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Live channel to a running child.
struct Channel {
    child: Child,
    stdin: ChildStdin,
    /// Lines from the child's stdout, fed by the reader thread. A
    /// disconnect means the child closed stdout, i.e. it is gone.
    lines: Receiver<String>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct ConnectionState {
    channel: Option<Channel>,
    last_used: Instant,
}

/// One executor connection: a child process, its stdio channel, and a
/// busy flag the pool uses for admission.
///
/// The inner mutex strictly serializes requests on this connection; the
/// adapter runtime is thread-hostile and must never see interleaved
/// writes.
pub struct ExecutorConnection {
    id: usize,
    spec: AdapterSpec,
    query_timeout: Duration,
    busy: AtomicBool,
    state: Mutex<ConnectionState>,
}

impl ExecutorConnection {
    /// Creates a connection record; call [`start`](Self::start) to
    /// launch the child.
    pub fn new(id: usize, spec: AdapterSpec, query_timeout: Duration) -> Self {
        Self {
            id,
            spec,
            query_timeout,
            busy: AtomicBool::new(false),
            state: Mutex::new(ConnectionState {
                channel: None,
                last_used: Instant::now(),
            }),
        }
    }

    /// Connection identifier, unique within its pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Launches the child and waits for its ready handshake.
    pub fn start(&self) -> ExecutorResult<()> {
        let mut state = self.lock_state();
        if let Some(channel) = state.channel.as_mut() {
            if matches!(channel.child.try_wait(), Ok(None)) {
                warn!(connection_id = self.id, "connection already started");
                return Ok(());
            }
            state.channel = None;
        }

        info!(connection_id = self.id, "starting executor connection");
        let mut command = Command::new(&self.spec.command);
        command
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.spec.work_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(ExecutorError::Spawn)?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (sender, lines) = mpsc::channel();
        // Detached on purpose: the reader exits on child EOF or when the
        // receiver side of the channel is dropped.
        let _reader = thread::Builder::new()
            .name(format!("executor-{}-reader", self.id))
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if sender.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(ExecutorError::Spawn)?;

        let channel = Channel { child, stdin, lines };

        // The connection is not live until the child says so.
        let ready_line = match channel.lines.recv_timeout(self.query_timeout) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ExecutorError::Handshake(format!(
                    "no ready line within {:?}",
                    self.query_timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ExecutorError::Handshake(
                    "adapter exited before announcing ready".to_string(),
                ));
            }
        };
        let ready: ReadyResponse = serde_json::from_str(&ready_line)
            .map_err(|e| ExecutorError::Handshake(format!("unparseable ready line: {e}")))?;
        if !ready.is_ready() {
            return Err(ExecutorError::Handshake(format!(
                "unexpected ready status: {}",
                ready.status
            )));
        }

        info!(
            connection_id = self.id,
            detail = ready.message.as_deref().unwrap_or(""),
            "executor connection ready"
        );
        state.channel = Some(channel);
        state.last_used = Instant::now();
        Ok(())
    }

    /// Sends one SQL request and reads exactly one response line.
    pub fn execute(&self, query: &str) -> ExecutorResult<QueryResponse> {
        let mut state = self.lock_state();
        let id = self.id;
        let channel = state.channel.as_mut().ok_or(ExecutorError::NotRunning(id))?;
        if !matches!(channel.child.try_wait(), Ok(None)) {
            state.channel = None;
            return Err(ExecutorError::NotRunning(id));
        }

        // The protocol is line-delimited; SQL newlines are collapsed so
        // a wrapped query still travels as a single request line.
        let request = query.replace(['\r', '\n'], " ");
        writeln!(channel.stdin, "{request}").map_err(ExecutorError::StdinWrite)?;
        channel.stdin.flush().map_err(ExecutorError::StdinWrite)?;

        let line = match channel.lines.recv_timeout(self.query_timeout) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                warn!(connection_id = id, "query timed out");
                return Err(ExecutorError::Timeout(self.query_timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                state.channel = None;
                return Err(ExecutorError::ConnectionDied(id));
            }
        };

        let response: QueryResponse =
            serde_json::from_str(&line).map_err(ExecutorError::MalformedResponse)?;
        state.last_used = Instant::now();
        debug!(
            connection_id = id,
            success = response.success,
            rows = response.count,
            "query round trip complete"
        );
        Ok(response)
    }

    /// Probes the child with `PING`.
    pub fn ping(&self) -> bool {
        let mut state = self.lock_state();
        let Some(channel) = state.channel.as_mut() else {
            return false;
        };
        if !matches!(channel.child.try_wait(), Ok(None)) {
            return false;
        }
        if writeln!(channel.stdin, "{PING_COMMAND}").is_err() || channel.stdin.flush().is_err() {
            return false;
        }
        match channel.lines.recv_timeout(self.query_timeout) {
            Ok(line) => serde_json::from_str::<PingResponse>(&line)
                .map(|ping| ping.is_healthy())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Asks the child to exit, waits briefly, then kills it.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        let Some(mut channel) = state.channel.take() else {
            return;
        };

        info!(connection_id = self.id, "stopping executor connection");
        let _ = writeln!(channel.stdin, "{EXIT_COMMAND}");
        let _ = channel.stdin.flush();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match channel.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(50));
                }
                _ => break,
            }
        }
        // Grace expired; Channel::drop kills the child.
        drop(channel);
    }

    /// Stops and relaunches the child.
    pub fn restart(&self) -> ExecutorResult<()> {
        warn!(connection_id = self.id, "restarting executor connection");
        self.stop();
        self.start()
    }

    /// Whether the child process is currently running.
    pub fn is_alive(&self) -> bool {
        let mut state = self.lock_state();
        state
            .channel
            .as_mut()
            .is_some_and(|channel| matches!(channel.child.try_wait(), Ok(None)))
    }

    /// Claims the connection for one call. Returns false if another
    /// caller holds it.
    pub(crate) fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases a claim taken by [`try_claim`](Self::try_claim).
    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().expect("connection lock poisoned")
    }
}
