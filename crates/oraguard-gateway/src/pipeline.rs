//! The request pipeline: rate limit, approval, validation, row cap,
//! breaker, pool.

use serde_json::{Map, Value};
use tracing::{info, warn};

use oraguard_approval::ApprovalTracker;
use oraguard_config::OraguardConfig;
use oraguard_executor::{AdapterSpec, ConnectionPool, PoolConfig, QueryResponse};
use oraguard_resilience::{
    BreakerConfig, BreakerError, CircuitBreaker, RateLimitConfig, RateLimiter,
};
use oraguard_validator::{validate_identifier, QueryValidator, ValidatorConfig};

use crate::error::GatewayError;
use crate::payload::{
    ApprovalGrant, DescribeResponse, ExecuteResponse, ExecuteValidation, GatewayHealth,
    ListTablesResponse, PreviewResponse, SafetyLimits, ValidationSummary,
};
use crate::{CONNECTION_RESOURCE_URI, INFO_RESOURCE_URI};

/// The read-only SQL safety gateway.
///
/// Owns one of each protective component. All methods take `&self`;
/// internal locking lives inside the components themselves.
pub struct Gateway {
    validator: QueryValidator,
    approvals: ApprovalTracker,
    rate_limiter: RateLimiter,
    breaker: CircuitBreaker,
    pool: ConnectionPool,
}

impl Gateway {
    /// Builds the pipeline and starts the executor pool.
    ///
    /// Fails fast: missing credentials or an unstartable adapter abort
    /// construction, and nothing else in the process should proceed.
    pub fn new(config: &OraguardConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let mut args = config.adapter.args.clone();
        args.push(config.database.connect_url());
        let spec = AdapterSpec {
            command: config.adapter.command.clone(),
            args,
            work_dir: config.adapter.work_dir.clone(),
            // Credentials travel in the child environment only; argv is
            // world-readable on most systems.
            env: vec![
                ("ORACLE_USER".to_string(), config.database.user.clone()),
                ("ORACLE_PASSWORD".to_string(), config.database.password.clone()),
            ],
        };

        let pool = ConnectionPool::new(
            spec,
            PoolConfig {
                size: config.pool.size,
                max_wait: config.pool.max_wait(),
                query_timeout: config.pool.query_timeout(),
                ..PoolConfig::default()
            },
        )
        .map_err(|e| {
            GatewayError::Configuration(format!("failed to start executor pool: {e}"))
        })?;

        Ok(Self {
            validator: QueryValidator::new(ValidatorConfig {
                max_complexity: config.validator.max_complexity,
                max_rows: config.validator.max_rows,
                allow_cross_joins: config.validator.allow_cross_joins,
            }),
            approvals: ApprovalTracker::new(config.approval.token_expiry()),
            rate_limiter: RateLimiter::new(RateLimitConfig {
                max_requests: config.rate_limit.max_requests,
                window: config.rate_limit.window(),
            }),
            breaker: CircuitBreaker::new(BreakerConfig {
                failure_threshold: config.breaker.failure_threshold,
                recovery_timeout: config.breaker.recovery_timeout(),
                success_threshold: config.breaker.success_threshold,
            }),
            pool,
        })
    }

    /// Validates a query and, when safe, issues an approval token.
    ///
    /// Pure gatekeeping: previews never touch the database.
    pub fn preview(&self, query: &str) -> PreviewResponse {
        let report = self.validator.validate(query);
        let query_preview: String = query.chars().take(100).collect();
        info!(
            is_safe = report.is_safe,
            score = report.complexity_score,
            query_preview = %query_preview,
            "query previewed"
        );

        let max_complexity = self.validator.max_complexity();
        let validation = ValidationSummary {
            is_safe: report.is_safe,
            complexity_score: report.complexity_score,
            max_complexity,
            complexity_explanation: format!(
                "Score {} of {} allowed. Higher scores indicate more expensive queries.",
                report.complexity_score, max_complexity
            ),
            warnings: report.warnings.clone(),
            error_message: report.error_message.clone(),
        };

        if !report.is_safe {
            return PreviewResponse {
                preview_mode: true,
                query_to_execute: query.to_string(),
                safe_query_with_limit: None,
                validation,
                safety_limits: SafetyLimits {
                    max_rows: self.validator.max_rows(),
                    row_limit_will_be_applied: false,
                    allow_cross_joins: self.validator.allows_cross_joins(),
                },
                approval: None,
                next_steps: "Revise the query to address the error above, then preview again."
                    .to_string(),
            };
        }

        let wrapped = self.validator.wrap_with_row_limit(query);
        let will_wrap = wrapped != query.trim();
        let expires_in_seconds = self.approvals.token_expiry().as_secs();
        let token = self.approvals.generate_token(query);

        PreviewResponse {
            preview_mode: true,
            query_to_execute: query.to_string(),
            safe_query_with_limit: will_wrap.then_some(wrapped),
            validation,
            safety_limits: SafetyLimits {
                max_rows: self.validator.max_rows(),
                row_limit_will_be_applied: will_wrap,
                allow_cross_joins: self.validator.allows_cross_joins(),
            },
            approval: Some(ApprovalGrant {
                token,
                expires_in_seconds,
                message: format!(
                    "Approval granted. Execute this exact query with the token within \
                     {expires_in_seconds} seconds. The token is single use."
                ),
            }),
            next_steps:
                "Call query_oracle with this exact query and the approval token to execute it."
                    .to_string(),
        }
    }

    /// Executes an approved query.
    pub fn execute(&self, query: &str, token: &str) -> Result<ExecuteResponse, GatewayError> {
        if let Err(denied) = self.approvals.verify_and_consume(query, token) {
            warn!(reason = %denied, "approval denied");
            return Err(denied.into());
        }

        if !self.rate_limiter.admit() {
            warn!(
                max_requests = self.rate_limiter.max_requests(),
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimited {
                max_requests: self.rate_limiter.max_requests(),
                window_secs: self.rate_limiter.window().as_secs(),
            });
        }

        // Re-validate what actually arrived: the approval binding stops
        // swaps, this stops an unsafe query that somehow carries a
        // matching token.
        let report = self.validator.validate(query);
        if !report.is_safe {
            let message = report
                .error_message
                .clone()
                .unwrap_or_else(|| "query failed validation".to_string());
            warn!(score = report.complexity_score, reason = %message, "query blocked");
            return Err(GatewayError::ValidationBlocked {
                message,
                complexity_score: report.complexity_score,
                warnings: report.warnings,
            });
        }
        info!(score = report.complexity_score, "query approved");

        let wrapped = self.validator.wrap_with_row_limit(query);
        let row_limit_applied =
            (wrapped != query.trim()).then_some(self.validator.max_rows());
        if row_limit_applied.is_some() {
            info!(max_rows = self.validator.max_rows(), "row limit applied");
        }

        let response = self.run_query(&wrapped)?;
        if !response.success {
            let message = response.error.unwrap_or_else(|| "Unknown error".to_string());
            warn!(error = %message, "query failed");
            return Err(GatewayError::QueryRuntime(message));
        }

        info!(rows = response.count, "query succeeded");
        Ok(ExecuteResponse {
            success: true,
            row_count: response.count,
            rows: response.rows,
            validation: ExecuteValidation {
                complexity_score: report.complexity_score,
                warnings: report.warnings,
                row_limit_applied,
            },
        })
    }

    /// Describes a table: columns, then primary keys.
    pub fn describe_table(&self, table_name: &str) -> Result<DescribeResponse, GatewayError> {
        let table = validate_identifier(table_name).inspect_err(|e| {
            warn!(identifier = table_name, reason = %e, "identifier rejected");
        })?;

        let columns_query = format!(
            "SELECT column_name, data_type, data_length, nullable, data_default \
             FROM user_tab_columns WHERE table_name = '{table}' ORDER BY column_id"
        );
        let columns = self.query_rows(&columns_query)?;

        // Primary-key lookup is best effort: a table without a PK
        // constraint makes the inner query come back empty or erring,
        // and the description is still useful.
        let pk_query = format!(
            "SELECT column_name FROM user_cons_columns WHERE constraint_name = \
             (SELECT constraint_name FROM user_constraints \
              WHERE table_name = '{table}' AND constraint_type = 'P')"
        );
        let primary_keys = match self.query_rows(&pk_query) {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.get("COLUMN_NAME"))
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect(),
            Err(e) => {
                warn!(table = %table, error = %e, "primary key lookup failed");
                Vec::new()
            }
        };

        Ok(DescribeResponse {
            table_name: table,
            columns,
            primary_keys,
        })
    }

    /// Lists accessible tables, optionally filtered by schema.
    pub fn list_tables(&self, schema: Option<&str>) -> Result<ListTablesResponse, GatewayError> {
        let (schema_label, query) = match schema {
            Some(name) => {
                let owner = validate_identifier(name).inspect_err(|e| {
                    warn!(identifier = name, reason = %e, "identifier rejected");
                })?;
                let query = format!(
                    "SELECT table_name, owner FROM all_tables WHERE owner = '{owner}' \
                     ORDER BY table_name"
                );
                (owner, query)
            }
            None => (
                "current_user".to_string(),
                "SELECT table_name, 'USER' as owner FROM user_tables ORDER BY table_name"
                    .to_string(),
            ),
        };

        let tables = self.query_rows(&query)?;
        Ok(ListTablesResponse {
            schema: schema_label,
            table_count: tables.len(),
            tables,
        })
    }

    /// Serves the `oracle://connection` and `oracle://info` resources.
    pub fn read_resource(&self, uri: &str) -> Result<Value, GatewayError> {
        match uri {
            CONNECTION_RESOURCE_URI => {
                let status = if self.test_connection() {
                    "Oracle database connection is active"
                } else {
                    "Oracle database connection is down"
                };
                Ok(Value::String(status.to_string()))
            }
            INFO_RESOURCE_URI => {
                let info_query = "SELECT banner as version, USER as current_user, \
                                  SYS_CONTEXT('USERENV', 'DB_NAME') as db_name, \
                                  SYS_CONTEXT('USERENV', 'HOST') as host \
                                  FROM v$version WHERE banner LIKE 'Oracle%'";
                match self.query_rows(info_query) {
                    Ok(rows) => Ok(rows
                        .into_iter()
                        .next()
                        .map(Value::Object)
                        .unwrap_or_else(|| Value::Object(Map::new()))),
                    Err(e) => {
                        let mut error = Map::new();
                        error.insert("error".to_string(), Value::String(e.to_string()));
                        Ok(Value::Object(error))
                    }
                }
            }
            other => Err(GatewayError::UnknownResource(other.to_string())),
        }
    }

    /// Whether a trivial probe query round-trips.
    pub fn test_connection(&self) -> bool {
        self.pool
            .execute("SELECT 'OK' as status FROM DUAL")
            .ok()
            .filter(|response| response.success)
            .and_then(|response| {
                response
                    .rows
                    .first()
                    .and_then(|row| row.get("STATUS"))
                    .map(|status| status.as_str() == Some("OK"))
            })
            .unwrap_or(false)
    }

    /// Pool and breaker health for operators.
    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            pool: self.pool.health_check(),
            breaker: self.breaker.snapshot(),
        }
    }

    /// Stops all executor connections.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Runs a query through the breaker into the pool.
    fn run_query(&self, query: &str) -> Result<QueryResponse, GatewayError> {
        self.breaker
            .call(|| self.pool.execute(query))
            .map_err(|e| match e {
                BreakerError::Open { retry_after_secs } => {
                    warn!(retry_after_secs, "circuit open: request rejected");
                    GatewayError::CircuitOpen { retry_after_secs }
                }
                BreakerError::Inner(inner) => GatewayError::from_executor(inner),
            })
    }

    /// Runs a catalog query and surfaces driver failures as errors.
    fn query_rows(&self, query: &str) -> Result<Vec<Map<String, Value>>, GatewayError> {
        let response = self.run_query(query)?;
        if !response.success {
            return Err(GatewayError::QueryRuntime(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        Ok(response.rows)
    }
}
