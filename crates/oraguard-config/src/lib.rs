//! Configuration management for oraguard.
//!
//! Hierarchical loading from multiple sources:
//! 1. `ORACLE_*` connection variables (contract with the operator)
//! 2. Environment variables (`ORAGUARD_*` prefix)
//! 3. `oraguard.local.toml` (gitignored, local overrides)
//! 4. `oraguard.toml` (git-tracked, project config)
//! 5. Built-in defaults (lowest precedence)
//!
//! Credentials live in the environment only; they are forwarded to the
//! adapter child's environment and never placed on a command line.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

/// Main oraguard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OraguardConfig {
    pub database: DatabaseConfig,
    pub validator: ValidatorSection,
    pub approval: ApprovalSection,
    pub rate_limit: RateLimitSection,
    pub breaker: BreakerSection,
    pub pool: PoolSection,
    pub adapter: AdapterSection,
}

impl OraguardConfig {
    /// Checks that everything needed to reach the database is present.
    ///
    /// Called once at startup; a failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.service_name.is_empty() {
            return Err(ConfigError::MissingSetting("database.service_name"));
        }
        if self.database.user.is_empty() {
            return Err(ConfigError::MissingSetting("database.user"));
        }
        if self.database.password.is_empty() {
            return Err(ConfigError::MissingSetting("database.password"));
        }
        if self.pool.size == 0 {
            return Err(ConfigError::MissingSetting("pool.size"));
        }
        Ok(())
    }
}

/// Oracle endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub user: String,
    /// Never logged, never placed in argv.
    pub password: String,
}

impl DatabaseConfig {
    /// Thin-driver connect URL handed to the adapter as an argument.
    /// Contains no secrets.
    pub fn connect_url(&self) -> String {
        format!(
            "jdbc:oracle:thin:@{}:{}/{}",
            self.host, self.port, self.service_name
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10006,
            service_name: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

/// Query validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSection {
    pub max_complexity: u32,
    pub max_rows: u32,
    pub allow_cross_joins: bool,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            max_complexity: 50,
            max_rows: 10_000,
            allow_cross_joins: false,
        }
    }
}

/// Approval-token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    pub token_expiry_secs: u64,
}

impl ApprovalSection {
    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_secs)
    }
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self { token_expiry_secs: 300 }
    }
}

/// Sliding-window admission policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RateLimitSection {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

impl BreakerSection {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 2,
        }
    }
}

/// Executor pool sizing and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub size: usize,
    pub max_wait_secs: u64,
    pub query_timeout_secs: u64,
}

impl PoolSection {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            size: 2,
            max_wait_secs: 30,
            query_timeout_secs: 5,
        }
    }
}

/// How the database-adapter child is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSection {
    /// Adapter executable.
    pub command: PathBuf,
    /// Extra arguments placed before the connect URL.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub work_dir: Option<PathBuf>,
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            command: PathBuf::from("oraguard-adapter"),
            args: Vec::new(),
            work_dir: None,
        }
    }
}
