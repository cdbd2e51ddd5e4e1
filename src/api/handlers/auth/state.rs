//! Auth configuration and shared request state.

use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};

use super::provider::IdentityProvider;
use super::tokens::TokenCodec;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 900;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 900;
const DEFAULT_RESET_FLOOR_MS: u64 = 500;

/// Immutable configuration for the auth handlers, built once at startup.
#[derive(Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_secret: SecretString,
    refresh_token_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    reset_floor_ms: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        frontend_base_url: String,
        access_token_secret: SecretString,
        refresh_token_secret: SecretString,
    ) -> Self {
        Self {
            frontend_base_url,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            reset_floor_ms: DEFAULT_RESET_FLOOR_MS,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds.max(1);
        self
    }

    /// Minimum handler time for reset requests; `0` disables the floor.
    #[must_use]
    pub fn with_reset_floor_ms(mut self, millis: u64) -> Self {
        self.reset_floor_ms = millis;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn reset_floor_ms(&self) -> u64 {
        self.reset_floor_ms
    }
}

/// Shared state handed to every auth handler via an `Extension`.
pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    provider: IdentityProvider,
}

impl AuthState {
    /// Build the handler state from a validated config.
    ///
    /// # Errors
    /// Returns an error if either signing secret is empty or if the two
    /// secrets are identical, which would make access and refresh tokens
    /// interchangeable.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let access = config.access_token_secret.expose_secret();
        let refresh = config.refresh_token_secret.expose_secret();
        if access.is_empty() || refresh.is_empty() {
            return Err(anyhow!("token signing secrets must not be empty"));
        }
        if access == refresh {
            return Err(anyhow!(
                "access and refresh token secrets must be distinct"
            ));
        }

        let codec = TokenCodec::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        );

        Ok(Self {
            config,
            codec,
            provider: IdentityProvider::Local,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub(super) fn provider(&self) -> &IdentityProvider {
        &self.provider
    }
}
