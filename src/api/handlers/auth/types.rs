//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::tokens::TokenTriad;

/// One message for every authentication failure. Never vary it by cause:
/// distinct messages would let a caller probe which step rejected them.
pub(super) const GENERIC_AUTH_FAILURE: &str = "invalid credentials";

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct RegisterRequest {
    pub(super) email: String,
    pub(super) password: String,
    pub(super) given_name: String,
    pub(super) family_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct LoginRequest {
    pub(super) email: String,
    pub(super) password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct RefreshRequest {
    pub(super) refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct RevokeRequest {
    pub(super) refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct ResetRequest {
    pub(super) email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct ResetConfirmRequest {
    pub(super) token: String,
    pub(super) new_password: String,
}

/// Bearer token triad returned by login and refresh.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct TokenTriadResponse {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    pub(super) id_token: String,
    pub(super) token_type: String,
    pub(super) expires_in: i64,
}

impl From<TokenTriad> for TokenTriadResponse {
    fn from(triad: TokenTriad) -> Self {
        Self {
            access_token: triad.access_token,
            refresh_token: triad.refresh_token,
            id_token: triad.id_token,
            token_type: "Bearer".to_string(),
            expires_in: triad.expires_in,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct MessageResponse {
    pub(super) message: String,
}

impl MessageResponse {
    pub(super) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triad_response_sets_bearer_type() {
        let response = TokenTriadResponse::from(TokenTriad {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            id_token: "i".to_string(),
            expires_in: 900,
        });
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 900);
    }

    #[test]
    fn triad_response_serializes_all_fields() {
        let response = TokenTriadResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            id_token: "i".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 900);
        assert_eq!(json["access_token"], "a");
        assert_eq!(json["refresh_token"], "r");
        assert_eq!(json["id_token"], "i");
    }

    #[test]
    fn login_request_deserializes() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@example.com","password":"pw"}"#).unwrap();
        assert_eq!(request.email, "a@example.com");
        assert_eq!(request.password, "pw");
    }

    #[test]
    fn reset_confirm_request_deserializes() {
        let request: ResetConfirmRequest =
            serde_json::from_str(r#"{"token":"t","new_password":"longenough"}"#).unwrap();
        assert_eq!(request.token, "t");
        assert_eq!(request.new_password, "longenough");
    }
}
