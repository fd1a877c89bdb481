//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration. All of
/// these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Source merging or deserialization failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A required setting is absent from every source.
    #[error("missing required setting: {0} (set it in oraguard.toml or the environment)")]
    MissingSetting(&'static str),

    /// An environment variable held an unusable value.
    #[error("invalid value for {variable}: {reason}")]
    InvalidEnvironment {
        variable: &'static str,
        reason: String,
    },
}
