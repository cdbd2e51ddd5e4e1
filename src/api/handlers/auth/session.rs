//! Session lifecycle: login, refresh rotation, and revocation.
//!
//! Refresh rotation treats the conditional single-row revoke as the
//! linearization point. Whoever flips `revoked_at` first owns the rotation;
//! everyone else presenting the same token — a replayed copy or the loser of
//! a benign double-refresh — lands on the reuse path and the whole family is
//! revoked. The HTTP answer to every failure is the same generic 401.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::principal;
use super::state::AuthState;
use super::storage::{self, RefreshTokenRecord, SafeUser};
use super::tokens::{self, TokenTriad};
use super::types::{
    LoginRequest, MessageResponse, RefreshRequest, RevokeRequest, TokenTriadResponse,
    GENERIC_AUTH_FAILURE,
};
use super::utils;

/// Derived lifecycle state of a stored refresh token. Revocation wins over
/// expiry: a revoked token that has also aged out still counts as reuse.
#[derive(Debug, PartialEq, Eq)]
enum TokenState {
    Live,
    Expired,
    Revoked,
}

fn token_state(record: &RefreshTokenRecord) -> TokenState {
    if record.revoked {
        TokenState::Revoked
    } else if record.expired {
        TokenState::Expired
    } else {
        TokenState::Live
    }
}

/// Outcome of presenting a refresh token for rotation. Every rejection shape
/// is the same variant; the distinction lives only in the security log.
pub(super) enum RotationOutcome {
    Rotated(TokenTriad),
    Rejected,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse::new(GENERIC_AUTH_FAILURE)),
    )
        .into_response()
}

fn internal_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Mint a triad and persist the refresh token under a fresh family.
pub(super) async fn create_session(
    state: &AuthState,
    pool: &PgPool,
    user: &SafeUser,
) -> anyhow::Result<TokenTriad> {
    let triad = state.codec().issue_triad(user)?;
    let family_id = Uuid::new_v4();
    storage::insert_refresh_token(
        pool,
        user.id,
        &tokens::hash_token(&triad.refresh_token),
        family_id,
        state.codec().refresh_ttl_seconds(),
    )
    .await?;
    Ok(triad)
}

/// Mint a triad whose refresh token continues an existing family.
async fn rotate_session(
    state: &AuthState,
    pool: &PgPool,
    user: &SafeUser,
    family_id: Uuid,
) -> anyhow::Result<TokenTriad> {
    let triad = state.codec().issue_triad(user)?;
    storage::insert_refresh_token(
        pool,
        user.id,
        &tokens::hash_token(&triad.refresh_token),
        family_id,
        state.codec().refresh_ttl_seconds(),
    )
    .await?;
    Ok(triad)
}

/// Rotate a presented refresh token: verify, look up, single-use revoke,
/// mint a descendant in the same family.
///
/// # Errors
/// Returns an error only on database or signing failure; every protocol
/// rejection is `RotationOutcome::Rejected`.
pub(super) async fn rotate_refresh_token(
    state: &AuthState,
    pool: &PgPool,
    presented: &str,
) -> anyhow::Result<RotationOutcome> {
    // Signature and expiry first; an unverifiable token never touches the
    // store.
    if state.codec().verify_refresh(presented).is_none() {
        return Ok(RotationOutcome::Rejected);
    }

    let token_hash = tokens::hash_token(presented);
    let Some(record) = storage::find_refresh_token(pool, &token_hash).await? else {
        return Ok(RotationOutcome::Rejected);
    };

    match token_state(&record) {
        TokenState::Expired => return Ok(RotationOutcome::Rejected),
        TokenState::Revoked => {
            // A previously rotated-away or revoked token came back: someone
            // holds a stale copy. Kill the whole family.
            return reuse_detected(pool, &record).await;
        }
        TokenState::Live => {}
    }

    if !storage::revoke_refresh_token(pool, &token_hash).await? {
        // Lost the race: another presenter of this same token rotated it
        // between our read and our revoke. Same treatment as replay.
        return reuse_detected(pool, &record).await;
    }

    let Some(user) = storage::lookup_safe_user(pool, record.user_id).await? else {
        return Ok(RotationOutcome::Rejected);
    };

    let triad = rotate_session(state, pool, &user, record.family_id).await?;
    info!(
        security_event = "TOKEN_ROTATED",
        user_id = %user.id,
        family_id = %record.family_id
    );
    Ok(RotationOutcome::Rotated(triad))
}

async fn reuse_detected(
    pool: &PgPool,
    record: &RefreshTokenRecord,
) -> anyhow::Result<RotationOutcome> {
    let revoked = storage::revoke_family(pool, record.family_id).await?;
    warn!(
        security_event = "TOKEN_REUSE_DETECTED",
        user_id = %record.user_id,
        family_id = %record.family_id,
        revoked,
    );
    Ok(RotationOutcome::Rejected)
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created", body = TokenTriadResponse),
        (status = 400, description = "Malformed request", body = MessageResponse),
        (status = 401, description = "Authentication failed", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = utils::normalize_email(&payload.email);
    if !utils::valid_email(&email) || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse::new("invalid request")),
        )
            .into_response();
    }

    let user = match state
        .provider()
        .authenticate(&pool, &email, &payload.password)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized(),
        Err(err) => {
            error!("login failed: {err}");
            return internal_error();
        }
    };

    match create_session(&state, &pool, &user).await {
        Ok(triad) => {
            info!(security_event = "LOGIN", user_id = %user.id);
            (StatusCode::OK, Json(TokenTriadResponse::from(triad))).into_response()
        }
        Err(err) => {
            error!("session creation failed: {err}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenTriadResponse),
        (status = 401, description = "Refresh token rejected", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<RefreshRequest>,
) -> impl IntoResponse {
    match rotate_refresh_token(&state, &pool, &payload.refresh_token).await {
        Ok(RotationOutcome::Rotated(triad)) => {
            (StatusCode::OK, Json(TokenTriadResponse::from(triad))).into_response()
        }
        Ok(RotationOutcome::Rejected) => unauthorized(),
        Err(err) => {
            error!("refresh failed: {err}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/revoke",
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Caller not authenticated", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn revoke(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    Json(payload): Json<RevokeRequest>,
) -> impl IntoResponse {
    let Some(principal) = principal::authorize(&headers, &state) else {
        return unauthorized();
    };

    // Unknown, expired, or someone else's token all no-op: the answer is the
    // same 200 so logout can't be used to probe the token store.
    let token_hash = tokens::hash_token(&payload.refresh_token);
    match storage::revoke_owned_refresh_token(&pool, &token_hash, principal.user_id).await {
        Ok(revoked) => {
            if revoked {
                info!(
                    security_event = "SESSION_REVOKED",
                    user_id = %principal.user_id,
                    email = %principal.email,
                );
            }
            (
                StatusCode::OK,
                Json(MessageResponse::new("session revoked")),
            )
                .into_response()
        }
        Err(err) => {
            error!("session revoke failed: {err}");
            internal_error()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/revoke-all",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Caller not authenticated", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn revoke_all(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(principal) = principal::authorize(&headers, &state) else {
        return unauthorized();
    };

    match storage::revoke_all_for_user(&pool, principal.user_id).await {
        Ok(revoked) => {
            info!(
                security_event = "SESSIONS_REVOKED",
                user_id = %principal.user_id,
                email = %principal.email,
                revoked,
            );
            (
                StatusCode::OK,
                Json(MessageResponse::new("all sessions revoked")),
            )
                .into_response()
        }
        Err(err) => {
            error!("bulk session revoke failed: {err}");
            internal_error()
        }
    }
}
