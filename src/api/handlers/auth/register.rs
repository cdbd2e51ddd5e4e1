//! Account registration for providers that own the credential.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::password;
use super::state::AuthState;
use super::storage::{self, RegisterOutcome};
use super::types::{MessageResponse, RegisterRequest};
use super::utils;

fn validate(payload: &RegisterRequest, email_normalized: &str) -> Result<(), &'static str> {
    if !utils::valid_email(email_normalized) {
        return Err("invalid email address");
    }
    if !utils::valid_password(&payload.password) {
        return Err("password must be between 8 and 512 characters");
    }
    if payload.given_name.trim().is_empty() || payload.family_name.trim().is_empty() {
        return Err("given name and family name are required");
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = MessageResponse),
        (status = 400, description = "Malformed request", body = MessageResponse),
        (status = 403, description = "Registration not supported", body = MessageResponse),
        (status = 409, description = "Email already registered", body = MessageResponse),
        (status = 500, description = "Internal error"),
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let email = utils::normalize_email(&payload.email);
    if let Err(reason) = validate(&payload, &email) {
        return (StatusCode::BAD_REQUEST, Json(MessageResponse::new(reason))).into_response();
    }

    if !state.provider().supports_registration() {
        return (
            StatusCode::FORBIDDEN,
            Json(MessageResponse::new(
                "registration is not supported by this identity provider",
            )),
        )
            .into_response();
    }

    let password_hash = match password::hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("password hashing failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match storage::insert_user(
        &pool,
        &email,
        &password_hash,
        payload.given_name.trim(),
        payload.family_name.trim(),
    )
    .await
    {
        Ok(RegisterOutcome::Created(user_id)) => {
            info!(security_event = "USER_REGISTERED", user_id = %user_id);
            (
                StatusCode::CREATED,
                Json(MessageResponse::new("account created")),
            )
                .into_response()
        }
        Ok(RegisterOutcome::Conflict) => (
            StatusCode::CONFLICT,
            Json(MessageResponse::new("email already registered")),
        )
            .into_response(),
        Err(err) => {
            error!("registration failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, given: &str, family: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            given_name: given.to_string(),
            family_name: family.to_string(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_input() {
        let payload = request("a@example.com", "longenough", "Alice", "Doe");
        assert!(validate(&payload, "a@example.com").is_ok());
    }

    #[test]
    fn validate_rejects_bad_email() {
        let payload = request("nope", "longenough", "Alice", "Doe");
        assert_eq!(validate(&payload, "nope"), Err("invalid email address"));
    }

    #[test]
    fn validate_rejects_short_password() {
        let payload = request("a@example.com", "short", "Alice", "Doe");
        assert!(validate(&payload, "a@example.com").is_err());
    }

    #[test]
    fn validate_rejects_blank_names() {
        let payload = request("a@example.com", "longenough", "  ", "Doe");
        assert_eq!(
            validate(&payload, "a@example.com"),
            Err("given name and family name are required")
        );
    }
}
