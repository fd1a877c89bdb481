//! Query validation: blocked-keyword screening, cartesian detection,
//! complexity scoring, and ROWNUM row-limit wrapping.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

// ============================================================================
// Compiled Patterns
// ============================================================================
//
// All patterns run over an uppercased, comment-stripped copy of the query,
// so they are written in uppercase and compiled exactly once per process.

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--[^\n]*").unwrap());

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static SELECT_OR_WITH_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(SELECT|WITH)\b").unwrap());

/// Write operations and set operators that are refused outright.
/// `UNION ALL` is listed before `UNION` so the report names the full form.
static BLOCKED_KEYWORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bDROP\b", "DROP"),
        (r"\bTRUNCATE\b", "TRUNCATE"),
        (r"\bDELETE\b", "DELETE"),
        (r"\bINSERT\b", "INSERT"),
        (r"\bUPDATE\b", "UPDATE"),
        (r"\bMERGE\b", "MERGE"),
        (r"\bALTER\b", "ALTER"),
        (r"\bCREATE\b", "CREATE"),
        (r"\bEXEC\b", "EXEC"),
        (r"\bEXECUTE\b", "EXECUTE"),
        (r"\bCALL\b", "CALL"),
        (r"\bGRANT\b", "GRANT"),
        (r"\bREVOKE\b", "REVOKE"),
        (r"\bUNION\s+ALL\b", "UNION ALL"),
        (r"\bUNION\b", "UNION"),
    ]
    .iter()
    .map(|(pattern, name)| (Regex::new(pattern).unwrap(), *name))
    .collect()
});

/// Explicit cross-join markers, rejected unless `allow_cross_joins` is set.
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [(r"\bCROSS\s+JOIN\b", "CROSS JOIN"), (r"\bCARTESIAN\b", "CARTESIAN")]
        .iter()
        .map(|(pattern, name)| (Regex::new(pattern).unwrap(), *name))
        .collect()
});

/// FROM span, terminated by the next clause keyword or end of query.
static FROM_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\bFROM\s+(.*?)(?:\bWHERE\b|\bGROUP\b|\bORDER\b|\bHAVING\b|$)").unwrap()
});

/// Single-line parenthesized spans, removed from the FROM span before
/// comma and JOIN counting so subqueries don't inflate the table count.
static PAREN_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.*?\)").unwrap());

static JOIN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bJOIN\b").unwrap());

static WHERE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bWHERE\b").unwrap());

static JOIN_WITH_ON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bJOIN\b.*\bON\b").unwrap());

static SELECT_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bSELECT\s+\*").unwrap());

/// `(` immediately followed by `SELECT` marks a subquery; counting bare
/// SELECT keywords would also pick up string literals.
static SUBQUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*SELECT\s+").unwrap());

static CTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bWITH\s+\w+\s+AS\s*\(").unwrap());

static WINDOW_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(ROW_NUMBER|DENSE_RANK|PERCENT_RANK|CUME_DIST|FIRST_VALUE|LAST_VALUE|NTILE|RANK|LAG|LEAD)\s*\(",
    )
    .unwrap()
});

/// Aliased table references after FROM or JOIN; captures the table name
/// so repeated names can be flagged as self-joins.
static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:FROM|JOIN)\s+([A-Z_][A-Z0-9_]*)\s+(?:AS\s+)?[A-Z_][A-Z0-9_]*").unwrap()
});

static LEADING_WILDCARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"LIKE\s+['"]%"#).unwrap());

static OR_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bOR\b").unwrap());

static ROWNUM_CONSTRAINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bROWNUM\s*[<>=]+\s*\d+").unwrap());

// ============================================================================
// Validation Report
// ============================================================================

/// Result of validating one query. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Whether the query may be executed.
    pub is_safe: bool,
    /// Explanation when the query was refused.
    pub error_message: Option<String>,
    /// Non-fatal observations accumulated during scoring.
    pub warnings: Vec<String>,
    /// Additive complexity estimate.
    pub complexity_score: u32,
}

impl ValidationReport {
    fn unsafe_with(message: String) -> Self {
        Self {
            is_safe: false,
            error_message: Some(message),
            warnings: Vec::new(),
            complexity_score: 0,
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Limits applied during validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorConfig {
    /// Maximum allowed complexity score before a query is refused.
    pub max_complexity: u32,
    /// Row cap injected via ROWNUM wrapping.
    pub max_rows: u32,
    /// Allow explicit CROSS JOIN / CARTESIAN markers.
    pub allow_cross_joins: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_complexity: 50,
            max_rows: 10_000,
            allow_cross_joins: false,
        }
    }
}

/// Validates SQL text for safety before it reaches the database.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    config: ValidatorConfig,
}

impl QueryValidator {
    /// Creates a validator with the given limits.
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// The row cap applied by [`QueryValidator::wrap_with_row_limit`].
    pub fn max_rows(&self) -> u32 {
        self.config.max_rows
    }

    /// The complexity ceiling queries are scored against.
    pub fn max_complexity(&self) -> u32 {
        self.config.max_complexity
    }

    /// Whether explicit cross joins are tolerated.
    pub fn allows_cross_joins(&self) -> bool {
        self.config.allow_cross_joins
    }

    /// Removes `-- …` and `/* … */` spans.
    ///
    /// Runs before any rule fires so a blocked keyword cannot hide
    /// behind a comment, and a commented-out ROWNUM cannot satisfy the
    /// row-limit check.
    pub fn strip_comments(&self, query: &str) -> String {
        let without_line = LINE_COMMENT.replace_all(query, "");
        BLOCK_COMMENT.replace_all(&without_line, "").into_owned()
    }

    /// Validates a query, producing a safety report.
    pub fn validate(&self, query: &str) -> ValidationReport {
        let stripped = self.strip_comments(query);
        let upper = stripped.to_uppercase();
        let mut warnings = Vec::new();
        let mut score: u32 = 0;

        // Write operations and set operators fail fast.
        for (pattern, name) in BLOCKED_KEYWORDS.iter() {
            if pattern.is_match(&upper) {
                return ValidationReport::unsafe_with(format!(
                    "Blocked operation detected: {name}. Only SELECT queries are allowed."
                ));
            }
        }

        if !SELECT_OR_WITH_START.is_match(&upper) {
            return ValidationReport::unsafe_with(
                "Only SELECT queries (including CTEs with WITH clause) are allowed.".to_string(),
            );
        }

        if !self.config.allow_cross_joins {
            for (pattern, name) in DANGEROUS_PATTERNS.iter() {
                if pattern.is_match(&upper) {
                    return ValidationReport::unsafe_with(format!(
                        "Dangerous pattern detected: {name}. Cross joins and cartesian products \
                         are not allowed."
                    ));
                }
            }
        }

        score += self.implicit_cartesian_penalty(&upper, &mut warnings);

        let table_count = self.count_tables(&upper);
        score += table_count as u32 * 5;
        if table_count > 1 {
            warnings.push(format!(
                "Query involves {table_count} tables. Ensure proper JOIN conditions exist."
            ));
        }

        if table_count > 1 && !WHERE_KEYWORD.is_match(&upper) {
            if !JOIN_WITH_ON.is_match(&upper) {
                return ValidationReport::unsafe_with(
                    "Multi-table query without WHERE clause or JOIN ON conditions detected. \
                     This could create a cartesian product."
                        .to_string(),
                );
            }
            warnings.push(
                "Multi-table query without WHERE clause. Ensure JOIN conditions are sufficient."
                    .to_string(),
            );
        }

        if table_count > 1 && SELECT_STAR.is_match(&upper) {
            score += 10;
            warnings.push(
                "SELECT * with multiple tables can be expensive. Consider specifying columns."
                    .to_string(),
            );
        }

        let subquery_count = SUBQUERY.find_iter(&upper).count() as u32;
        if subquery_count > 0 {
            score += subquery_count * 10;
            warnings
                .push(format!("Query contains {subquery_count} subquery(ies). Monitor performance."));
            if subquery_count > 2 {
                score += (subquery_count - 2) * 5;
                warnings.push(format!(
                    "Deep nesting detected ({subquery_count} subqueries). This can significantly \
                     impact performance."
                ));
            }
        }

        let cte_count = CTE.find_iter(&upper).count() as u32;
        if cte_count > 0 {
            score += cte_count * 8;
            warnings.push(format!(
                "Query contains {cte_count} CTE(s) (WITH clause). CTEs can be expensive if not \
                 materialized."
            ));
        }

        let window_count = WINDOW_FUNCTION.find_iter(&upper).count() as u32;
        if window_count > 0 {
            score += window_count * 12;
            warnings.push(format!(
                "Query contains {window_count} window function(s). Window functions can be very \
                 expensive on large datasets."
            ));
        }

        let self_join_count = self.count_self_joins(&upper);
        if self_join_count > 0 {
            score += self_join_count * 15;
            warnings.push(format!(
                "Query contains {self_join_count} self-join(s). Self-joins can create large \
                 intermediate result sets."
            ));
        }

        let wildcard_count = LEADING_WILDCARD.find_iter(&upper).count() as u32;
        if wildcard_count > 0 {
            score += wildcard_count * 10;
            warnings.push(format!(
                "Query contains {wildcard_count} LIKE pattern(s) with leading wildcard ('%...'). \
                 This prevents index usage and causes full table scans."
            ));
        }

        let or_count = OR_KEYWORD.find_iter(&upper).count() as u32;
        if or_count > 2 {
            score += (or_count - 2) * 4;
            warnings.push(format!(
                "Query contains {or_count} OR condition(s). Multiple ORs can prevent index usage \
                 and degrade performance."
            ));
        }

        if upper.contains("DISTINCT") {
            score += 5;
            warnings.push("DISTINCT can be expensive on large result sets.".to_string());
        }

        // Presence check per token, not occurrence count.
        let aggregates = ["COUNT", "SUM", "AVG", "MAX", "MIN", "GROUP BY"];
        score += aggregates.iter().filter(|agg| upper.contains(*agg)).count() as u32 * 3;

        if score > self.config.max_complexity {
            return ValidationReport {
                is_safe: false,
                error_message: Some(format!(
                    "Query complexity score ({score}) exceeds maximum allowed ({}). Simplify the \
                     query.",
                    self.config.max_complexity
                )),
                warnings,
                complexity_score: score,
            };
        }

        ValidationReport {
            is_safe: true,
            error_message: None,
            warnings,
            complexity_score: score,
        }
    }

    /// Wraps a query with a ROWNUM cap, preserving ORDER BY semantics.
    ///
    /// Idempotent: a query that already carries a `ROWNUM <op> <n>`
    /// predicate is returned unchanged (modulo trimming).
    pub fn wrap_with_row_limit(&self, query: &str) -> String {
        let trimmed = query.trim();
        let upper = trimmed.to_uppercase();
        let max_rows = self.config.max_rows;

        if ROWNUM_CONSTRAINT.is_match(&upper) {
            return trimmed.to_string();
        }

        if upper.contains("ORDER BY") {
            // ROWNUM is assigned before ORDER BY sorts, so the cap must
            // go on an outer query to keep the requested ordering.
            return format!("SELECT * FROM (\n    {trimmed}\n) WHERE ROWNUM <= {max_rows}");
        }

        if upper.contains("WHERE") {
            format!("{trimmed} AND ROWNUM <= {max_rows}")
        } else {
            format!("{trimmed} WHERE ROWNUM <= {max_rows}")
        }
    }

    /// Penalizes comma-separated tables in the FROM clause (old-style
    /// joins) and warns; these are the usual source of accidental
    /// cartesian products.
    fn implicit_cartesian_penalty(&self, upper: &str, warnings: &mut Vec<String>) -> u32 {
        let Some(captures) = FROM_SPAN.captures(upper) else {
            return 0;
        };
        let from_clause = PAREN_SPAN.replace_all(&captures[1], "");
        let comma_count = from_clause.matches(',').count() as u32;
        if comma_count == 0 {
            return 0;
        }
        warnings.push(format!(
            "Detected {} comma-separated tables in FROM clause. This can create cartesian \
             products. Use explicit JOIN syntax.",
            comma_count + 1
        ));
        comma_count * 20
    }

    /// Tables in the FROM span: 1 + commas + JOIN occurrences, with
    /// parenthesized spans subtracted first.
    fn count_tables(&self, upper: &str) -> usize {
        let Some(captures) = FROM_SPAN.captures(upper) else {
            return 1;
        };
        let from_clause = PAREN_SPAN.replace_all(&captures[1], "");
        let comma_count = from_clause.matches(',').count();
        let join_count = JOIN_KEYWORD.find_iter(&from_clause).count();
        1 + comma_count + join_count
    }

    /// Number of table names referenced more than once after FROM/JOIN.
    fn count_self_joins(&self, upper: &str) -> u32 {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for captures in TABLE_REFERENCE.captures_iter(upper) {
            *counts.entry(captures.get(1).unwrap().as_str()).or_default() += 1;
        }
        counts.values().filter(|&&count| count > 1).count() as u32
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}
