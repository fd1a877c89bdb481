//! The oraguard request pipeline.
//!
//! Composes the protective chain between an untrusted caller and the
//! database: rate limiting, approval verification, static validation,
//! row-limit wrapping, circuit breaking, and the executor pool. The
//! pipeline owns one of each collaborator; nothing here is a process
//! global.

mod error;
mod payload;
mod pipeline;

pub use error::GatewayError;
pub use payload::{
    ApprovalGrant, DescribeResponse, ExecuteResponse, ExecuteValidation, GatewayHealth,
    ListTablesResponse, PreviewResponse, SafetyLimits, ValidationSummary,
};
pub use pipeline::Gateway;

/// Resource URI reporting connection liveness.
pub const CONNECTION_RESOURCE_URI: &str = "oracle://connection";

/// Resource URI reporting database version and session info.
pub const INFO_RESOURCE_URI: &str = "oracle://info";
