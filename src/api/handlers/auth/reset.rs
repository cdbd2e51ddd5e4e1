//! Password reset request and confirmation.
//!
//! The request endpoint is enumeration-resistant twice over: the response
//! body is the same whether or not the email has an account, and the handler
//! never returns before a configured time floor, so the scrypt-shaped timing
//! difference between the two paths is hidden. Redemption is a single
//! transaction: consume the token, store the new hash, revoke every session,
//! and enqueue the confirmation email together.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info};

use super::password;
use super::state::AuthState;
use super::storage;
use super::types::{MessageResponse, ResetConfirmRequest, ResetRequest, GENERIC_AUTH_FAILURE};
use super::utils;
use crate::api::email::{TEMPLATE_PASSWORD_RESET, TEMPLATE_PASSWORD_RESET_CONFIRMATION};

/// One answer for every reset request, known account or not.
const RESET_REQUEST_MESSAGE: &str =
    "If that address has an account, a reset link is on its way";

#[utoipa::path(
    post,
    path = "/v1/auth/reset/request",
    request_body = ResetRequest,
    responses(
        (status = 202, description = "Request accepted", body = MessageResponse),
        (status = 400, description = "Malformed request", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn request_reset(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<ResetRequest>,
) -> impl IntoResponse {
    let started = Instant::now();

    let email = utils::normalize_email(&payload.email);
    if !utils::valid_email(&email) {
        // Shape rejection leaks nothing about accounts, so it skips the floor.
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse::new("invalid request")),
        )
            .into_response();
    }

    // Errors past this point are logged and swallowed: the caller always
    // gets the same accepted response.
    if let Err(err) = issue_reset_token(&state, &pool, &email).await {
        error!("reset token issuance failed: {err}");
    }

    let floor = Duration::from_millis(state.config().reset_floor_ms());
    if let Some(remaining) = remaining_floor(floor, started.elapsed()) {
        sleep(remaining).await;
    }

    (
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(RESET_REQUEST_MESSAGE)),
    )
        .into_response()
}

/// Mint and store a reset token for the address, invalidating any prior one.
/// Returns the raw token when the address has an account, `None` otherwise;
/// the handler treats both the same.
pub(super) async fn issue_reset_token(
    state: &AuthState,
    pool: &PgPool,
    email: &str,
) -> anyhow::Result<Option<String>> {
    let Some(user) = storage::lookup_safe_user_by_email(pool, email).await? else {
        return Ok(None);
    };

    let token = utils::generate_reset_token()?;
    let reset_url = utils::build_reset_url(state.config().frontend_base_url(), &token);
    let payload = serde_json::json!({
        "given_name": user.given_name,
        "reset_url": reset_url,
    })
    .to_string();

    let mut tx = pool.begin().await?;
    // At most one usable reset token per user.
    storage::invalidate_reset_tokens(&mut tx, user.id).await?;
    storage::insert_reset_token(
        &mut tx,
        user.id,
        &utils::hash_reset_token(&token),
        state.config().reset_token_ttl_seconds(),
    )
    .await?;
    storage::enqueue_email(&mut tx, &user.email, TEMPLATE_PASSWORD_RESET, &payload).await?;
    tx.commit().await?;

    info!(security_event = "RESET_REQUESTED", user_id = %user.id);
    Ok(Some(token))
}

fn remaining_floor(floor: Duration, elapsed: Duration) -> Option<Duration> {
    floor.checked_sub(elapsed)
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset/confirm",
    request_body = ResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Malformed request", body = MessageResponse),
        (status = 401, description = "Token rejected", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    tag = "auth"
)]
pub async fn confirm_reset(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<ResetConfirmRequest>,
) -> impl IntoResponse {
    if !utils::valid_password(&payload.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse::new(
                "password must be between 8 and 512 characters",
            )),
        )
            .into_response();
    }

    match redeem_reset_token(&pool, &payload.token, &payload.new_password).await {
        Ok(Some(_)) => (
            StatusCode::OK,
            Json(MessageResponse::new("password updated")),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::new(GENERIC_AUTH_FAILURE)),
        )
            .into_response(),
        Err(err) => {
            error!("reset confirmation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Redeem a reset token inside one transaction. Returns the number of
/// refresh tokens revoked, or `None` when the token is unknown, expired,
/// already used, or points at a user with no password credential — the
/// caller maps all of those to the one generic 401.
pub(super) async fn redeem_reset_token(
    pool: &PgPool,
    token: &str,
    new_password: &str,
) -> anyhow::Result<Option<u64>> {
    let token_hash = utils::hash_reset_token(token);
    let new_hash = password::hash_password(new_password)?;

    let mut tx = pool.begin().await?;

    let Some(user_id) = storage::consume_reset_token(&mut tx, &token_hash).await? else {
        return Ok(None);
    };

    if !storage::update_password_hash(&mut tx, user_id, &new_hash).await? {
        // Token owner has no password credential. Dropping the transaction
        // rolls the consumption back; the caller sees the same rejection as
        // for an unknown token.
        return Ok(None);
    }

    // New password means every outstanding session is stale.
    let revoked = storage::revoke_all_for_user_tx(&mut tx, user_id).await?;

    if let Some(user) = storage::lookup_safe_user(pool, user_id).await? {
        let payload = serde_json::json!({ "given_name": user.given_name }).to_string();
        storage::enqueue_email(
            &mut tx,
            &user.email,
            TEMPLATE_PASSWORD_RESET_CONFIRMATION,
            &payload,
        )
        .await?;
    }

    tx.commit().await?;

    info!(
        security_event = "PASSWORD_RESET",
        user_id = %user_id,
        sessions_revoked = revoked,
    );

    Ok(Some(revoked))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_sleeps_for_the_remainder() {
        let floor = Duration::from_millis(500);
        assert_eq!(
            remaining_floor(floor, Duration::from_millis(120)),
            Some(Duration::from_millis(380))
        );
    }

    #[test]
    fn slow_handlers_skip_the_sleep() {
        let floor = Duration::from_millis(500);
        assert_eq!(remaining_floor(floor, Duration::from_millis(500)), None);
        assert_eq!(remaining_floor(floor, Duration::from_millis(900)), None);
    }

    #[test]
    fn zero_floor_never_sleeps() {
        assert_eq!(remaining_floor(Duration::ZERO, Duration::from_millis(1)), None);
    }

    #[test]
    fn accepted_message_is_account_agnostic() {
        assert!(!RESET_REQUEST_MESSAGE.contains("account exists"));
        assert!(RESET_REQUEST_MESSAGE.starts_with("If that address"));
    }
}
