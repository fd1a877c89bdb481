//! Bounded pool of executor connections.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::connection::{AdapterSpec, ExecutorConnection};
use crate::error::{ExecutorError, ExecutorResult};
use crate::protocol::QueryResponse;

/// Pool sizing and timing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of executor connections. Two is an operator policy cap,
    /// not a tuning default: each child owns a heavyweight runtime.
    pub size: usize,
    /// Total time a caller may wait for a free connection.
    pub max_wait: Duration,
    /// Sleep between busy-scan passes.
    pub retry_interval: Duration,
    /// Per-call response timeout handed to each connection.
    pub query_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            max_wait: Duration::from_secs(30),
            retry_interval: Duration::from_millis(100),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Health report across all connections.
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub total_connections: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub all_healthy: bool,
}

/// Fixed-size set of executor connections with busy-scan admission and
/// restart-on-failure.
pub struct ConnectionPool {
    connections: Vec<Arc<ExecutorConnection>>,
    /// Guards the selection scan only; calls run outside it so one slow
    /// query never blocks admission to the other connection.
    scan_lock: Mutex<()>,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Starts all executors. Any startup failure aborts construction.
    pub fn new(spec: AdapterSpec, config: PoolConfig) -> ExecutorResult<Self> {
        let mut connections: Vec<Arc<ExecutorConnection>> = Vec::with_capacity(config.size);
        for id in 0..config.size {
            let connection =
                Arc::new(ExecutorConnection::new(id, spec.clone(), config.query_timeout));
            if let Err(e) = connection.start() {
                error!(connection_id = id, error = %e, "failed to start connection");
                for started in &connections {
                    started.stop();
                }
                return Err(e);
            }
            connections.push(connection);
        }
        info!(size = config.size, "connection pool initialized");
        Ok(Self {
            connections,
            scan_lock: Mutex::new(()),
            config,
        })
    }

    /// Number of connections in the pool.
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Executes a query on the first free connection.
    ///
    /// Busy-scan admission: claim a free connection under the scan
    /// lock, call outside it. When every connection is claimed, sleep
    /// and rescan until `max_wait` elapses. A transport failure
    /// restarts the connection so the next caller finds it fresh, and
    /// surfaces to this caller.
    pub fn execute(&self, query: &str) -> ExecutorResult<QueryResponse> {
        let started = Instant::now();
        loop {
            let claimed = {
                let _scan = self.scan_lock.lock().expect("pool lock poisoned");
                self.connections
                    .iter()
                    .find(|connection| connection.try_claim())
                    .cloned()
            };

            if let Some(connection) = claimed {
                let result = self.call_on(&connection, query);
                connection.release();
                return result;
            }

            if started.elapsed() >= self.config.max_wait {
                warn!(
                    max_wait_secs = self.config.max_wait.as_secs(),
                    "pool exhausted: no connection became available"
                );
                return Err(ExecutorError::PoolExhausted(self.config.max_wait));
            }
            thread::sleep(self.config.retry_interval);
        }
    }

    /// Pings every connection.
    pub fn health_check(&self) -> PoolHealth {
        let mut healthy = 0;
        let mut unhealthy = 0;
        for connection in &self.connections {
            if connection.ping() {
                healthy += 1;
            } else {
                unhealthy += 1;
                warn!(connection_id = connection.id(), "connection is unhealthy");
            }
        }
        PoolHealth {
            total_connections: self.connections.len(),
            healthy,
            unhealthy,
            all_healthy: unhealthy == 0,
        }
    }

    /// Stops every connection.
    pub fn shutdown(&self) {
        info!("shutting down connection pool");
        for connection in &self.connections {
            connection.stop();
        }
        info!("connection pool shutdown complete");
    }

    fn call_on(
        &self,
        connection: &Arc<ExecutorConnection>,
        query: &str,
    ) -> ExecutorResult<QueryResponse> {
        // A claimed-but-dead connection gets one restart before the call.
        if !connection.is_alive() {
            connection.restart()?;
        }

        match connection.execute(query) {
            Ok(response) => Ok(response),
            Err(e) if e.is_transport() => {
                warn!(
                    connection_id = connection.id(),
                    error = %e,
                    "connection failed during call"
                );
                if let Err(restart_error) = connection.restart() {
                    error!(
                        connection_id = connection.id(),
                        error = %restart_error,
                        "failed to restart connection"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
