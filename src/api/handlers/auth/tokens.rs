//! Signed token triad issuance and verification.
//!
//! Access and identity tokens are stateless: trusted purely by signature and
//! expiry. Refresh tokens additionally have a persisted record keyed by the
//! SHA-256 digest of the whole token, so raw refresh tokens never touch the
//! database. Verification is pinned to HS256; any other algorithm in the
//! header is a verification failure, not a fallback.

use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::storage::SafeUser;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct AccessClaims {
    pub(super) sub: String,
    pub(super) email: String,
    pub(super) iat: i64,
    pub(super) exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct RefreshClaims {
    pub(super) sub: String,
    pub(super) email: String,
    /// Unique per minted token; the digest of the whole token is the storage
    /// key, so the jti only guarantees distinct digests across rotations.
    pub(super) jti: String,
    pub(super) iat: i64,
    pub(super) exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct IdClaims {
    pub(super) sub: String,
    pub(super) email: String,
    pub(super) given_name: String,
    pub(super) family_name: String,
    pub(super) iat: i64,
    pub(super) exp: i64,
}

/// The three bearer credentials returned to a caller on login or refresh.
pub(super) struct TokenTriad {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    pub(super) id_token: String,
    pub(super) expires_in: i64,
}

pub(super) struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenCodec {
    pub(super) fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        let access_bytes = access_secret.expose_secret().as_bytes();
        let refresh_bytes = refresh_secret.expose_secret().as_bytes();
        Self {
            access_encoding: EncodingKey::from_secret(access_bytes),
            access_decoding: DecodingKey::from_secret(access_bytes),
            refresh_encoding: EncodingKey::from_secret(refresh_bytes),
            refresh_decoding: DecodingKey::from_secret(refresh_bytes),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub(super) fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Mint the access/refresh/id triad for a user.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub(super) fn issue_triad(&self, user: &SafeUser) -> Result<TokenTriad, jsonwebtoken::errors::Error> {
        let now = unix_now();
        let sub = user.id.to_string();
        let header = Header::new(Algorithm::HS256);

        let access = AccessClaims {
            sub: sub.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + self.access_ttl_seconds,
        };
        let refresh = RefreshClaims {
            sub: sub.clone(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.refresh_ttl_seconds,
        };
        let id = IdClaims {
            sub,
            email: user.email.clone(),
            given_name: user.given_name.clone(),
            family_name: user.family_name.clone(),
            iat: now,
            exp: now + self.access_ttl_seconds,
        };

        Ok(TokenTriad {
            access_token: encode(&header, &access, &self.access_encoding)?,
            refresh_token: encode(&header, &refresh, &self.refresh_encoding)?,
            id_token: encode(&header, &id, &self.access_encoding)?,
            expires_in: self.access_ttl_seconds,
        })
    }

    /// Verify an access token. All failures (bad signature, wrong algorithm,
    /// expiry) collapse into `None`; the distinction is logged only.
    pub(super) fn verify_access(&self, token: &str) -> Option<AccessClaims> {
        match decode::<AccessClaims>(token, &self.access_decoding, &validation()) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("access token rejected: {err}");
                None
            }
        }
    }

    /// Verify a refresh token; same collapse rule as `verify_access`.
    pub(super) fn verify_refresh(&self, token: &str) -> Option<RefreshClaims> {
        match decode::<RefreshClaims>(token, &self.refresh_decoding, &validation()) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("refresh token rejected: {err}");
                None
            }
        }
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

#[allow(clippy::cast_possible_wrap)]
fn unix_now() -> i64 {
    get_current_timestamp() as i64
}

/// Deterministic digest of a raw token, used as the refresh-token storage key.
pub(super) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
