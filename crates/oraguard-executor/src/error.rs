//! Executor error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors raised by executor connections and the pool.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The adapter process could not be spawned.
    #[error("failed to spawn adapter process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The adapter did not complete its startup handshake.
    #[error("adapter startup handshake failed: {0}")]
    Handshake(String),

    /// The connection has no running child.
    #[error("connection {0} is not running")]
    NotRunning(usize),

    /// Writing the request line to the child failed.
    #[error("failed to write to adapter stdin: {0}")]
    StdinWrite(#[source] std::io::Error),

    /// No response line arrived within the query timeout.
    #[error("query timeout after {0:?}")]
    Timeout(Duration),

    /// The child exited while a response was pending.
    #[error("connection {0} died unexpectedly")]
    ConnectionDied(usize),

    /// The child's response line was not valid protocol JSON.
    #[error("malformed adapter response: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    /// No executor became available within the pool's wait budget.
    #[error("No available connections after {}s", .0.as_secs())]
    PoolExhausted(Duration),
}

impl ExecutorError {
    /// True for errors that mean the connection itself is suspect and
    /// should be restarted before it serves another call.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NotRunning(_)
                | Self::StdinWrite(_)
                | Self::Timeout(_)
                | Self::ConnectionDied(_)
                | Self::MalformedResponse(_)
        )
    }
}
