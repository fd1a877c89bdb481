//! Agent-facing payload records.
//!
//! Typed at the boundary, JSON only at serialization time. Field names
//! are contract: agents key off them.

use serde::Serialize;
use serde_json::{Map, Value};

use oraguard_executor::PoolHealth;
use oraguard_resilience::BreakerSnapshot;

/// Response to `preview_query`.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    /// Always true; distinguishes previews from execution results.
    pub preview_mode: bool,
    /// The query exactly as it must be passed to `query_oracle`.
    pub query_to_execute: String,
    /// The row-limited form that will actually run, when wrapping
    /// changes the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_query_with_limit: Option<String>,
    pub validation: ValidationSummary,
    pub safety_limits: SafetyLimits,
    /// Present only for safe queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalGrant>,
    pub next_steps: String,
}

/// Validation verdict included in previews.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub is_safe: bool,
    pub complexity_score: u32,
    pub max_complexity: u32,
    pub complexity_explanation: String,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Limits the gateway will enforce at execution time.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyLimits {
    pub max_rows: u32,
    pub row_limit_will_be_applied: bool,
    pub allow_cross_joins: bool,
}

/// A granted approval token.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalGrant {
    pub token: String,
    pub expires_in_seconds: u64,
    pub message: String,
}

/// Response to `query_oracle`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub row_count: usize,
    pub rows: Vec<Map<String, Value>>,
    pub validation: ExecuteValidation,
}

/// Validation echo attached to execution results.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteValidation {
    pub complexity_score: u32,
    pub warnings: Vec<String>,
    /// The row cap, when wrapping changed the query text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit_applied: Option<u32>,
}

/// Response to `describe_table`.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeResponse {
    pub table_name: String,
    /// Column rows exactly as the catalog returned them.
    pub columns: Vec<Map<String, Value>>,
    pub primary_keys: Vec<String>,
}

/// Response to `list_tables`.
#[derive(Debug, Clone, Serialize)]
pub struct ListTablesResponse {
    pub schema: String,
    pub table_count: usize,
    pub tables: Vec<Map<String, Value>>,
}

/// Aggregate health for operators.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub pool: PoolHealth,
    pub breaker: BreakerSnapshot,
}
