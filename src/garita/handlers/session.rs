//! Session status, logout and the session-invalid target.

use axum::{
    extract::{Extension, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clear_session_cookie, extract_session_id, require_session};
use crate::garita::auth::{AuthError, AuthState, ErrorBody, SessionEnd};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: Uuid,
    pub username: String,
    pub authorities: BTreeSet<String>,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct InvalidSessionParams {
    /// `expired` or `invalidated`
    pub reason: Option<String>,
}

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 303, description = "Session ended, redirect to the session-invalid target")
    ),
    tag = "session"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_session(&headers, &auth_state).await {
        Ok(record) => {
            let principal = record.principal();
            let response = SessionResponse {
                session_id: record.session_id().to_string(),
                user_id: principal.id,
                username: principal.username.clone(),
                authorities: principal.authorities.clone(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(AuthError::SessionInvalid(end)) => {
            debug!("session {end}, redirecting");
            redirect_to_invalid(auth_state.config().session_invalid_url(), end)
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/signout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "session"
)]
pub async fn signout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(session_id) = extract_session_id(&headers) {
        if auth_state.sessions().invalidate(&session_id).await {
            debug!("session signed out");
        }
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    match clear_session_cookie() {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/session/invalid",
    params(InvalidSessionParams),
    responses(
        (status = 401, description = "Session expired or invalidated", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn session_invalid(Query(params): Query<InvalidSessionParams>) -> impl IntoResponse {
    let end = match params.reason.as_deref() {
        Some("expired") => SessionEnd::Expired,
        _ => SessionEnd::Invalidated,
    };
    AuthError::SessionInvalid(end).into_response()
}

fn redirect_to_invalid(target: &str, end: SessionEnd) -> axum::response::Response {
    let separator = if target.contains('?') { '&' } else { '?' };
    match HeaderValue::from_str(&format!("{target}{separator}reason={end}")) {
        Ok(location) => (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response(),
        Err(err) => {
            error!("Invalid session-invalid target {target}: {err}");
            AuthError::SessionInvalid(end).into_response()
        }
    }
}
