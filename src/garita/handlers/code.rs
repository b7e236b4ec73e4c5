//! Challenge code issuance endpoints.

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{extract_session_id, invalid_request, session_cookie, valid_mobile, SESSION_HEADER};
use crate::garita::auth::{AuthError, AuthState, ErrorBody};

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct SmsCodeParams {
    pub mobile: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SmsCodeResponse {
    pub mobile: String,
    pub expires_in: u64,
}

#[utoipa::path(
    get,
    path = "/code/image",
    responses(
        (status = 200, description = "JPEG challenge bound to the browser session", body = Vec<u8>, content_type = "image/jpeg"),
        (status = 503, description = "Image could not be rendered", body = ErrorBody)
    ),
    tag = "code"
)]
#[instrument(skip_all)]
pub async fn image_code(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // A browser without a session gets a fresh id to bind the code to.
    let (session_id, is_new) = match extract_session_id(&headers) {
        Some(session_id) => (session_id, false),
        None => (Uuid::new_v4().simple().to_string(), true),
    };

    let issued = match auth_state.challenges().issue_image_code(&session_id).await {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue image code: {err:#}");
            return AuthError::Infrastructure("image rendering failed".to_string()).into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response_headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    if is_new {
        match session_cookie(&session_id, None) {
            Ok(cookie) => {
                response_headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }

    (StatusCode::OK, response_headers, issued.image).into_response()
}

#[utoipa::path(
    get,
    path = "/code/sms",
    params(SmsCodeParams),
    responses(
        (status = 200, description = "Code stored and handed to the SMS sender", body = SmsCodeResponse),
        (status = 400, description = "Missing or invalid mobile number", body = ErrorBody)
    ),
    tag = "code"
)]
#[instrument(skip_all)]
pub async fn sms_code(
    auth_state: Extension<Arc<AuthState>>,
    params: Result<Query<SmsCodeParams>, QueryRejection>,
) -> impl IntoResponse {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return invalid_request(rejection.status(), rejection.body_text()),
    };

    let mobile = params.mobile.trim();
    if !valid_mobile(mobile) {
        let body = ErrorBody {
            error: "InvalidMobile".to_string(),
            message: "Mobile number must be 6 to 15 digits".to_string(),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let code = auth_state.challenges().issue_sms_code(mobile).await;
    let expires_in = code
        .expires_at()
        .saturating_duration_since(code.created_at())
        .as_secs();

    (
        StatusCode::OK,
        Json(SmsCodeResponse {
            mobile: mobile.to_string(),
            expires_in,
        }),
    )
        .into_response()
}
