//! Bearer-token authorization for endpoints that require a live access token.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use super::state::AuthState;

/// The authenticated caller, as proven by a verified access token.
#[derive(Debug)]
pub(super) struct Principal {
    pub(super) user_id: Uuid,
    pub(super) email: String,
}

/// Verify the `Authorization: Bearer` header and return the caller.
///
/// Missing header, wrong scheme, bad signature, expiry, and a non-UUID
/// subject all collapse to `None`; handlers answer each with the same 401.
pub(super) fn authorize(headers: &HeaderMap, state: &AuthState) -> Option<Principal> {
    let token = bearer_token(headers)?;
    let claims = state.codec().verify_access(token)?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;
    Some(Principal {
        user_id,
        email: claims.email,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{AuthConfig, AuthState};
    use axum::http::HeaderValue;
    use secrecy::SecretString;

    fn test_state() -> AuthState {
        AuthState::new(AuthConfig::new(
            "https://chiavi.dev".to_string(),
            SecretString::from("access-secret"),
            SecretString::from("refresh-secret"),
        ))
        .unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn missing_header_yields_none() {
        assert!(authorize(&HeaderMap::new(), &test_state()).is_none());
    }

    #[test]
    fn non_bearer_scheme_yields_none() {
        let state = test_state();
        assert!(authorize(&headers_with("Basic abc"), &state).is_none());
        assert!(authorize(&headers_with("Bearer "), &state).is_none());
    }

    #[test]
    fn garbage_token_yields_none() {
        assert!(authorize(&headers_with("Bearer not-a-jwt"), &test_state()).is_none());
    }

    #[test]
    fn verified_access_token_yields_principal() {
        use crate::api::handlers::auth::storage::SafeUser;

        let state = test_state();
        let user = SafeUser {
            id: uuid::Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            given_name: "Alice".to_string(),
            family_name: "Doe".to_string(),
        };
        let triad = state.codec().issue_triad(&user).unwrap();

        let principal = authorize(
            &headers_with(&format!("Bearer {}", triad.access_token)),
            &state,
        )
        .unwrap();
        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.email, "alice@example.com");

        // A refresh token is not an access token.
        assert!(authorize(
            &headers_with(&format!("Bearer {}", triad.refresh_token)),
            &state
        )
        .is_none());
    }

    #[test]
    fn bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers_with("bearer abc")), None);
    }
}
