//! Approval-token tracking for the two-step preview/execute workflow.
//!
//! `preview` issues a cryptographically random token bound to a
//! fingerprint of the previewed query; `execute` must present the token
//! together with the same query. Tokens are single use and expire after
//! a configurable window, so an approval can never be replayed or
//! transplanted onto a different query.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Default token lifetime.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(300);

/// Why an approval was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// No token was supplied with the execute call.
    #[error(
        "No approval token provided. You must call preview_query first to get an approval \
         token, then include that token when calling query_oracle."
    )]
    MissingToken,

    /// The token is unknown, already consumed, or expired.
    #[error(
        "Invalid or expired approval token. The token may have expired or been used already \
         (one-time use). Call preview_query again to get a new token."
    )]
    InvalidOrExpired,

    /// The query differs from the one that was previewed.
    #[error(
        "Query does not match approved query. The query you're trying to execute is different \
         from the one you previewed. Make sure you're using the exact same query."
    )]
    QueryMismatch,
}

/// One outstanding approval, keyed by its token.
#[derive(Debug, Clone)]
struct ApprovalRecord {
    /// SHA-256 of the normalized query, hex encoded.
    query_fingerprint: String,
    created_at: Instant,
    /// First 100 characters, kept for audit logging.
    query_preview: String,
}

/// Issues, verifies, and consumes single-use approval tokens.
///
/// All operations hold the tracker's lock, so no two calls can consume
/// the same token. Expired records are swept opportunistically on every
/// operation; the table stays small enough that the O(n) scan is noise.
#[derive(Debug)]
pub struct ApprovalTracker {
    token_expiry: Duration,
    approvals: Mutex<HashMap<String, ApprovalRecord>>,
}

impl ApprovalTracker {
    /// Creates a tracker whose tokens live for `token_expiry`.
    pub fn new(token_expiry: Duration) -> Self {
        Self {
            token_expiry,
            approvals: Mutex::new(HashMap::new()),
        }
    }

    /// The configured token lifetime.
    pub fn token_expiry(&self) -> Duration {
        self.token_expiry
    }

    /// Generates a token for `query` and records the binding.
    ///
    /// The token is 128 bits from the OS RNG, rendered as 32 hex
    /// characters.
    pub fn generate_token(&self, query: &str) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let record = ApprovalRecord {
            query_fingerprint: fingerprint(query),
            created_at: Instant::now(),
            query_preview: preview_of(query),
        };

        let mut approvals = self.approvals.lock().expect("approval lock poisoned");
        approvals.insert(token.clone(), record);
        Self::sweep_expired(&mut approvals, self.token_expiry);
        debug!(outstanding = approvals.len(), "approval token issued");

        token
    }

    /// Verifies `token` against `query` and consumes it on success.
    pub fn verify_and_consume(&self, query: &str, token: &str) -> Result<(), ApprovalError> {
        let mut approvals = self.approvals.lock().expect("approval lock poisoned");
        Self::sweep_expired(&mut approvals, self.token_expiry);

        if token.is_empty() {
            return Err(ApprovalError::MissingToken);
        }

        let Some(record) = approvals.get(token) else {
            return Err(ApprovalError::InvalidOrExpired);
        };

        if fingerprint(query) != record.query_fingerprint {
            return Err(ApprovalError::QueryMismatch);
        }

        let consumed = approvals.remove(token).expect("record present under lock");
        debug!(query_preview = %consumed.query_preview, "approval token consumed");
        Ok(())
    }

    /// Number of outstanding (unconsumed, unexpired) approvals.
    pub fn outstanding(&self) -> usize {
        let mut approvals = self.approvals.lock().expect("approval lock poisoned");
        Self::sweep_expired(&mut approvals, self.token_expiry);
        approvals.len()
    }

    fn sweep_expired(approvals: &mut HashMap<String, ApprovalRecord>, expiry: Duration) {
        let now = Instant::now();
        approvals.retain(|_, record| now.duration_since(record.created_at) <= expiry);
    }
}

impl Default for ApprovalTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_EXPIRY)
    }
}

/// SHA-256 over the whitespace-normalized, lowercased query.
///
/// Cosmetic edits between preview and execute (spacing, case) keep the
/// binding intact; any semantic edit changes the fingerprint.
pub fn fingerprint(query: &str) -> String {
    let normalized = query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// First 100 characters, respecting char boundaries.
fn preview_of(query: &str) -> String {
    query.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn tracker() -> ApprovalTracker {
        ApprovalTracker::default()
    }

    const QUERY: &str = "SELECT * FROM users WHERE id = 123";

    #[test]
    fn token_is_32_hex_characters() {
        let token = tracker().generate_token(QUERY);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique() {
        let t = tracker();
        let a = t.generate_token(QUERY);
        let b = t.generate_token(QUERY);
        assert_ne!(a, b);
    }

    #[test]
    fn valid_token_verifies_once() {
        let t = tracker();
        let token = t.generate_token(QUERY);
        assert_eq!(t.verify_and_consume(QUERY, &token), Ok(()));
        assert_eq!(
            t.verify_and_consume(QUERY, &token),
            Err(ApprovalError::InvalidOrExpired)
        );
    }

    #[test]
    fn token_is_bound_to_the_previewed_query() {
        let t = tracker();
        let token = t.generate_token(QUERY);
        assert_eq!(
            t.verify_and_consume("SELECT * FROM users WHERE id = 456", &token),
            Err(ApprovalError::QueryMismatch)
        );
        // Mismatch must not consume: the original query still verifies.
        assert_eq!(t.verify_and_consume(QUERY, &token), Ok(()));
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let t = tracker();

        let token = t.generate_token(QUERY);
        assert_eq!(
            t.verify_and_consume("SELECT   *   FROM   users   WHERE   id   =   123", &token),
            Ok(())
        );

        let token = t.generate_token(QUERY);
        assert_eq!(
            t.verify_and_consume("select * from users where id = 123", &token),
            Ok(())
        );
    }

    #[test]
    fn missing_token_is_rejected() {
        let t = tracker();
        assert_eq!(t.verify_and_consume(QUERY, ""), Err(ApprovalError::MissingToken));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let t = tracker();
        assert_eq!(
            t.verify_and_consume(QUERY, "00000000000000000000000000000000"),
            Err(ApprovalError::InvalidOrExpired)
        );
    }

    #[test]
    fn tokens_expire() {
        let t = ApprovalTracker::new(Duration::from_millis(20));
        let token = t.generate_token(QUERY);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            t.verify_and_consume(QUERY, &token),
            Err(ApprovalError::InvalidOrExpired)
        );
        assert_eq!(t.outstanding(), 0);
    }

    #[test]
    fn multiple_tokens_coexist() {
        let t = tracker();
        let q1 = "SELECT * FROM users WHERE id = 123";
        let q2 = "SELECT * FROM orders WHERE id = 456";
        let q3 = "SELECT * FROM products WHERE id = 789";

        let t1 = t.generate_token(q1);
        let t2 = t.generate_token(q2);
        let t3 = t.generate_token(q3);
        assert_eq!(t.outstanding(), 3);

        assert_eq!(t.verify_and_consume(q1, &t1), Ok(()));
        assert_eq!(t.verify_and_consume(q2, &t2), Ok(()));
        assert_eq!(t.verify_and_consume(q3, &t3), Ok(()));
        assert_eq!(t.outstanding(), 0);
    }

    #[test]
    fn fingerprint_ignores_cosmetic_differences() {
        assert_eq!(fingerprint("SELECT 1 FROM dual"), fingerprint("  select 1\n from DUAL "));
        assert_ne!(fingerprint("SELECT 1 FROM dual"), fingerprint("SELECT 2 FROM dual"));
    }
}
