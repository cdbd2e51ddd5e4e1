//! Password hashing with a memory-hard KDF.
//!
//! Stored format is `saltB64.derivedKeyHex`: a fresh 32-byte random salt,
//! base64url-encoded, followed by the hex-encoded scrypt output. Comparison
//! re-derives the key from the embedded salt; a malformed stored value fails
//! closed instead of panicking.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use scrypt::Params;

const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;

// N=2^15, r=8, p=1: ~32 MiB per derivation, interactive-login friendly.
fn kdf_params() -> Result<Params> {
    Params::new(15, 8, 1, KEY_LEN).map_err(|err| anyhow!("invalid scrypt parameters: {err}"))
}

fn derive_key(password: &str, salt: &[u8]) -> Result<String> {
    let params = kdf_params()?;
    let mut output = [0u8; KEY_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut output)
        .map_err(|err| anyhow!("scrypt derivation failed: {err}"))?;
    Ok(hex::encode(output))
}

/// Hash a password for storage.
///
/// # Errors
/// Returns an error if random salt generation or key derivation fails.
pub(super) fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate password salt")?;
    let derived = derive_key(password, &salt)?;
    Ok(format!("{}.{derived}", URL_SAFE_NO_PAD.encode(salt)))
}

/// Compare a stored hash against a supplied password.
///
/// Malformed stored values (missing separator, bad salt encoding, wrong
/// digest length) compare as a mismatch.
///
/// # Errors
/// Returns an error only if key derivation itself fails.
pub(super) fn compare_password(stored: &str, supplied: &str) -> Result<bool> {
    let Some((salt_b64, stored_hex)) = stored.split_once('.') else {
        return Ok(false);
    };
    let Ok(salt) = URL_SAFE_NO_PAD.decode(salt_b64) else {
        return Ok(false);
    };
    if stored_hex.len() != KEY_LEN * 2 {
        return Ok(false);
    }

    let derived_hex = derive_key(supplied, &salt)?;
    Ok(digests_match(stored_hex, &derived_hex))
}

// Equal-length hex digests; compare without short-circuiting.
fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_matches() {
        let stored = hash_password("Secret123").unwrap();
        assert!(compare_password(&stored, "Secret123").unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let stored = hash_password("Secret123").unwrap();
        assert!(!compare_password(&stored, "Secret124").unwrap());
    }

    #[test]
    fn salts_are_random() {
        let first = hash_password("Secret123").unwrap();
        let second = hash_password("Secret123").unwrap();
        assert_ne!(first, second);
        // Both still verify despite different salts.
        assert!(compare_password(&first, "Secret123").unwrap());
        assert!(compare_password(&second, "Secret123").unwrap());
    }

    #[test]
    fn stored_format_is_salt_dot_hex() {
        let stored = hash_password("Secret123").unwrap();
        let (salt_b64, key_hex) = stored.split_once('.').unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(salt_b64).unwrap().len(), SALT_LEN);
        assert_eq!(key_hex.len(), KEY_LEN * 2);
        assert!(key_hex.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn malformed_stored_values_fail_closed() {
        assert!(!compare_password("no-separator", "pw").unwrap());
        assert!(!compare_password("!!!bad-base64!!!.abcd", "pw").unwrap());
        assert!(!compare_password("QUJD.deadbeef", "pw").unwrap());
        assert!(!compare_password("", "pw").unwrap());
    }

    #[test]
    fn digests_match_requires_equal_length() {
        assert!(!digests_match("abcd", "abc"));
        assert!(digests_match("abcd", "abcd"));
        assert!(!digests_match("abcd", "abce"));
    }
}
