//! Identity providers behind the credential check.
//!
//! Providers are a closed enum rather than a trait object: the set is known
//! at compile time and the authenticate path stays a plain async fn. Adding
//! a federated variant later means a new arm here plus a capability answer
//! in `supports_registration`.

use anyhow::Result;
use sqlx::PgPool;
use tracing::debug;

use super::password;
use super::storage::{self, SafeUser};

pub(super) enum IdentityProvider {
    /// Password credentials stored locally in `user_credentials`.
    Local,
}

impl IdentityProvider {
    /// Whether this provider owns the credential and can mint new accounts.
    pub(super) fn supports_registration(&self) -> bool {
        match self {
            Self::Local => true,
        }
    }

    /// Check a password against the stored credential.
    ///
    /// Every mismatch collapses to `None`: unknown email, wrong password,
    /// and malformed stored hash are indistinguishable to the caller. When
    /// the email has no account we still run one key derivation so the
    /// unknown-email path costs about the same as a real comparison.
    ///
    /// # Errors
    /// Returns an error only on database or key-derivation failure.
    pub(super) async fn authenticate(
        &self,
        pool: &PgPool,
        email_normalized: &str,
        password: &str,
    ) -> Result<Option<SafeUser>> {
        match self {
            Self::Local => {
                let Some(found) =
                    storage::lookup_user_with_credential(pool, email_normalized).await?
                else {
                    password::hash_password(password)?;
                    debug!("authentication failed: unknown email");
                    return Ok(None);
                };

                if password::compare_password(&found.password_hash, password)? {
                    Ok(Some(found.user))
                } else {
                    debug!("authentication failed: password mismatch");
                    Ok(None)
                }
            }
        }
    }
}
