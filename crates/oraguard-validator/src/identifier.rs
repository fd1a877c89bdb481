//! Identifier whitelisting for system-catalog queries.
//!
//! `describe_table` and `list_tables` splice their argument into catalog
//! SQL where bind variables are unavailable, so the name must be proven
//! harmless before it gets anywhere near a query string.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Oracle's classic identifier limit.
const MAX_IDENTIFIER_LENGTH: usize = 30;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]*$").unwrap());

/// Why an identifier was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Empty input.
    #[error("identifier must not be empty")]
    Empty,

    /// Longer than the 30-character Oracle limit.
    #[error("identifier exceeds {MAX_IDENTIFIER_LENGTH} characters: {0} characters")]
    TooLong(usize),

    /// Contains a character outside `[A-Za-z0-9_$#]` or does not start
    /// with a letter.
    #[error("identifier contains invalid characters: {0:?}")]
    InvalidCharacters(String),
}

/// Validates a schema or table name and returns it uppercased, ready to
/// splice into a catalog query.
pub fn validate_identifier(identifier: &str) -> Result<String, IdentifierError> {
    if identifier.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong(identifier.len()));
    }
    if !IDENTIFIER.is_match(identifier) {
        return Err(IdentifierError::InvalidCharacters(identifier.to_string()));
    }
    Ok(identifier.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("USERS"; "plain")]
    #[test_case("MY_TABLE"; "underscore")]
    #[test_case("TABLE123"; "digits")]
    #[test_case("TABLE$NAME"; "dollar")]
    #[test_case("TABLE#NAME"; "hash")]
    #[test_case("v$version"; "lowercase system view")]
    fn accepts_valid_identifiers(name: &str) {
        let upper = validate_identifier(name).unwrap();
        assert_eq!(upper, name.to_uppercase());
    }

    #[test_case("USERS' OR '1'='1"; "quote injection")]
    #[test_case("USERS; DROP TABLE X"; "statement injection")]
    #[test_case("USERS--"; "comment injection")]
    #[test_case("TAB LE"; "embedded space")]
    #[test_case("1TABLE"; "leading digit")]
    #[test_case("_TABLE"; "leading underscore")]
    fn rejects_hostile_identifiers(name: &str) {
        assert!(matches!(
            validate_identifier(name),
            Err(IdentifierError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validate_identifier(""), Err(IdentifierError::Empty));
    }

    #[test]
    fn rejects_over_thirty_characters() {
        let name = "A".repeat(31);
        assert_eq!(validate_identifier(&name), Err(IdentifierError::TooLong(31)));
        let name = "A".repeat(30);
        assert!(validate_identifier(&name).is_ok());
    }
}
