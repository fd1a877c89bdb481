//! Static SQL safety analysis for the oraguard gateway.
//!
//! Pattern-based validation over a restricted SELECT dialect:
//! - blocked write/DDL keywords (comment stripping defeats hiding them)
//! - cross-join and implicit-cartesian rejection
//! - additive complexity scoring with a configurable ceiling
//! - ROWNUM row-limit wrapping
//! - identifier whitelisting for system-catalog splicing
//!
//! Deliberately not a SQL parser: the gateway has to survive Oracle
//! dialect quirks that a strict AST would choke on, and every rule here
//! is monotone, so hiding more syntax in a query can only raise its
//! score.

mod identifier;
mod query;

pub use identifier::{IdentifierError, validate_identifier};
pub use query::{QueryValidator, ValidationReport, ValidatorConfig};
