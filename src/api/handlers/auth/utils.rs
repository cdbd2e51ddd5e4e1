//! Small helpers for input validation and opaque token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

pub(super) const MIN_PASSWORD_LEN: usize = 8;
pub(super) const MAX_PASSWORD_LEN: usize = 512;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Length-only password policy; composition rules are the frontend's concern.
pub(super) fn valid_password(password: &str) -> bool {
    (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len())
}

/// Create a new password reset token for email links.
///
/// The raw value is only mailed to the user; the database stores a hash.
pub(super) fn generate_reset_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a reset token so raw values never touch the database.
pub(super) fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend reset link included in outbound emails.
///
/// The base URL comes from configuration, never from request headers, so a
/// poisoned Host header can't steer victims to an attacker's page.
pub(super) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_password_checks_length_bounds() {
        assert!(!valid_password("short"));
        assert!(valid_password("longenough"));
        assert!(!valid_password(&"x".repeat(MAX_PASSWORD_LEN + 1)));
    }

    #[test]
    fn generate_reset_token_has_32_bytes_of_entropy() {
        let decoded_len = generate_reset_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_reset_token_stable() {
        let first = hash_reset_token("token");
        let second = hash_reset_token("token");
        let different = hash_reset_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn build_reset_url_trims_trailing_slash() {
        let url = build_reset_url("https://chiavi.dev/", "token");
        assert_eq!(url, "https://chiavi.dev/reset-password#token=token");
    }

    #[test]
    fn unique_violation_ignores_non_database_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
