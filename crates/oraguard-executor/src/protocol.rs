//! Line-delimited JSON protocol spoken by adapter children.
//!
//! The adapter emits one `ready` line on startup, then answers each
//! request line with exactly one JSON line. Two command words are
//! reserved; every other line is treated as SQL.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Liveness probe command.
pub const PING_COMMAND: &str = "PING";

/// Graceful shutdown command.
pub const EXIT_COMMAND: &str = "EXIT";

/// Startup handshake line: `{"status":"ready","message":…}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ReadyResponse {
    /// Whether the adapter declared itself ready.
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Reply to `PING`: `{"status":"alive","connected":bool}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    pub status: String,
    #[serde(default)]
    pub connected: bool,
}

impl PingResponse {
    /// Alive and holding a live database session.
    pub fn is_healthy(&self) -> bool {
        self.status == "alive" && self.connected
    }
}

/// Reply to a SQL line.
///
/// Row objects map uppercase column names to JSON values, exactly as
/// the adapter's driver produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
