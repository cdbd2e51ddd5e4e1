//! # Chiavi (Credential & Session Lifecycle Authority)
//!
//! `chiavi` manages username/password credentials and the bearer-token
//! sessions derived from them, exposed through OAuth2-flavored endpoints.
//!
//! ## Refresh-token rotation
//!
//! Every login starts a token *family*. Each refresh rotates the presented
//! token out (single use) and mints a descendant carrying the same family id.
//! Presenting an already-rotated token is treated as theft: the whole family
//! is revoked in one bulk update and the caller gets a generic 401.
//!
//! - **Hash-only storage:** raw refresh and reset tokens are never persisted;
//!   the database holds a SHA-256 digest used as the lookup key.
//! - **Derived state:** a token is Live, Expired, or Revoked depending on its
//!   `expires_at`/`revoked_at` timestamps. `revoked_at` is set once and never
//!   cleared.
//!
//! ## Password reset
//!
//! Reset requests always return the same message and are padded to a minimum
//! wall-clock duration, so neither the response body nor its latency reveals
//! whether an account exists. Redeeming a reset token is a single
//! transaction: consume the token, store the new credential hash, revoke
//! every refresh token for the user, and enqueue a confirmation email.

pub mod api;
pub mod cli;
#[cfg(test)]
pub(crate) mod test_support;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
