use super::handlers::{auth, health};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{Contact, ComponentsBuilder, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
/// Routes added outside (like `/`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::session::login))
        .routes(routes!(auth::session::refresh))
        .routes(routes!(auth::session::revoke))
        .routes(routes!(auth::session::revoke_all))
        .routes(routes!(auth::reset::request_reset))
        .routes(routes!(auth::reset::confirm_reset));

    let mut chiavi_tag = Tag::new("chiavi");
    chiavi_tag.description = Some("Credential and session lifecycle API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, token rotation, and password reset".to_string());

    let openapi = router.get_openapi_mut();
    openapi.tags = Some(vec![chiavi_tag, auth_tag]);

    // Revocation endpoints reference this scheme via #[utoipa::path(security)].
    openapi
        .components
        .get_or_insert_with(|| ComponentsBuilder::new().build())
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Chiavi"));
            assert_eq!(contact.email.as_deref(), Some("team@chiavi.dev"));
        }
    }

    #[test]
    fn openapi_registers_auth_routes() {
        let spec = openapi();
        let paths = spec.paths.paths;
        for path in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/revoke",
            "/v1/auth/revoke-all",
            "/v1/auth/reset/request",
            "/v1/auth/reset/confirm",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Chiavi <team@chiavi.dev>"),
            (Some("Team Chiavi"), Some("team@chiavi.dev"))
        );
        assert_eq!(parse_author("Solo Author"), (Some("Solo Author"), None));
        assert_eq!(parse_author("<only@email>"), (None, Some("only@email")));
    }
}
