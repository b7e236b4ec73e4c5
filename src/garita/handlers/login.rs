use axum::{
    extract::{rejection::FormRejection, Extension, Form},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{extract_session_id, invalid_request, session_cookie, SESSION_HEADER};
use crate::garita::auth::{AccessToken, AuthState, ErrorBody, LoginOutcome, LoginRequest};

/// Login form. Either `username` + `password` (+ `imageCode`) or
/// `mobile` + `code`.
#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "imageCode")]
    pub image_code: Option<String>,
    pub mobile: Option<String>,
    pub code: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub authorities: BTreeSet<String>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<AccessToken>,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            user_id: outcome.principal.id,
            username: outcome.principal.username,
            authorities: outcome.principal.authorities,
            session_id: outcome.session.session_id().to_string(),
            token: outcome.token,
        }
    }
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Logged in, session cookie set", body = LoginResponse),
        (status = 400, description = "Challenge code or client credentials rejected", body = ErrorBody),
        (status = 415, description = "Body is not a urlencoded form", body = ErrorBody),
        (status = 401, description = "Credentials rejected", body = ErrorBody),
        (status = 403, description = "Account locked", body = ErrorBody),
        (status = 409, description = "Session limit reached", body = ErrorBody),
        (status = 503, description = "User or client directory unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> impl IntoResponse {
    let Form(params) = match form {
        Ok(form) => form,
        Err(rejection) => return invalid_request(rejection.status(), rejection.body_text()),
    };

    let mut request = LoginRequest::new(method, uri.path());
    request.params = params;
    request.session_id = extract_session_id(&headers);
    request.authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let outcome = match auth_state.gateway().login(&request).await {
        Ok(outcome) => outcome,
        Err(err) => return err.into_response(),
    };

    let response = LoginResponse::from(outcome);
    let max_age = auth_state.sessions().policy().idle_ttl().as_secs();

    let mut response_headers = HeaderMap::new();
    match session_cookie(&response.session_id, Some(max_age)) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    if let Ok(value) = HeaderValue::from_str(&response.session_id) {
        response_headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    }

    (StatusCode::OK, response_headers, Json(response)).into_response()
}
