use axum::response::Json;
use utoipa::OpenApi;

use super::auth::{AccessToken, ErrorBody, Principal};
use super::handlers::{admin, code, health, login, session};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        code::image_code,
        code::sms_code,
        login::login,
        session::session,
        session::signout,
        session::session_invalid,
        admin::admin_sessions,
    ),
    components(schemas(
        AccessToken,
        ErrorBody,
        Principal,
        health::Health,
        code::SmsCodeResponse,
        login::LoginForm,
        login::LoginResponse,
        session::SessionResponse,
        admin::ActiveSessions,
    )),
    tags(
        (name = "auth", description = "Form login"),
        (name = "code", description = "Image and SMS challenge codes"),
        (name = "session", description = "Browser sessions"),
        (name = "admin", description = "Operator endpoints"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/code/image",
            "/code/sms",
            "/login",
            "/session",
            "/signout",
            "/session/invalid",
            "/admin/sessions",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
