//! Executor subprocess management for the oraguard gateway.
//!
//! Each connection owns a long-lived database-adapter child process
//! speaking a line-delimited JSON protocol over stdin/stdout. The pool
//! keeps a small fixed set of them, hands out whichever is free, and
//! restarts any that die. Credentials reach the child only through its
//! environment, never through argv.

mod connection;
mod error;
mod pool;
mod protocol;

pub use connection::{AdapterSpec, ExecutorConnection};
pub use error::{ExecutorError, ExecutorResult};
pub use pool::{ConnectionPool, PoolConfig, PoolHealth};
pub use protocol::{PingResponse, QueryResponse, ReadyResponse, EXIT_COMMAND, PING_COMMAND};
