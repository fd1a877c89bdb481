//! The gateway's tagged error union.
//!
//! Every way a request can fail is a distinct variant, so the boundary
//! can format each one differently (a rate-limit denial carries a retry
//! hint, a blocked query carries its score) and callers never have to
//! parse message strings.

use oraguard_approval::ApprovalError;
use oraguard_config::ConfigError;
use oraguard_executor::ExecutorError;
use oraguard_validator::IdentifierError;
use thiserror::Error;

/// Errors surfaced by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The validator marked the query unsafe.
    #[error("{message}")]
    ValidationBlocked {
        message: String,
        complexity_score: u32,
        warnings: Vec<String>,
    },

    /// Missing, expired, unknown, or mismatched approval token.
    #[error(transparent)]
    ApprovalDenied(#[from] ApprovalError),

    /// The sliding window is saturated.
    #[error(
        "Rate limit exceeded: maximum {max_requests} requests per {window_secs} seconds. \
         Try again shortly."
    )]
    RateLimited {
        max_requests: usize,
        window_secs: u64,
    },

    /// The circuit breaker refused the call.
    #[error(
        "Circuit breaker is OPEN. Database appears to be down. Retry in {retry_after_secs} \
         seconds."
    )]
    CircuitOpen { retry_after_secs: u64 },

    /// No executor became available within the pool's wait budget.
    #[error("{0}")]
    PoolExhausted(#[source] ExecutorError),

    /// The executor subprocess died, or its protocol broke.
    #[error("executor transport failure: {0}")]
    ExecutorTransport(#[source] ExecutorError),

    /// The database rejected the query; the message is the driver's.
    #[error("Error executing query: {0}")]
    QueryRuntime(String),

    /// A schema or table name failed the identifier whitelist.
    #[error("invalid identifier: {0}")]
    IdentifierRejected(#[from] IdentifierError),

    /// A resource URI the gateway does not serve.
    #[error("unknown resource URI: {0}")]
    UnknownResource(String),

    /// Startup-time failure; fatal.
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl GatewayError {
    /// Sorts a pool-path error into the pool-exhausted or transport
    /// bucket.
    pub(crate) fn from_executor(e: ExecutorError) -> Self {
        match e {
            ExecutorError::PoolExhausted(_) => Self::PoolExhausted(e),
            _ => Self::ExecutorTransport(e),
        }
    }
}
