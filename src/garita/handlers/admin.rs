//! Operator endpoints, restricted to principals holding the admin authority.

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{invalid_request, require_session};
use crate::garita::auth::{require_authority, AuthState, ErrorBody, ADMIN_AUTHORITY};

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct AdminSessionsParams {
    /// Count only the sessions of this principal.
    pub user_id: Option<Uuid>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ActiveSessions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub active: usize,
}

#[utoipa::path(
    get,
    path = "/admin/sessions",
    params(AdminSessionsParams),
    responses(
        (status = 200, description = "Number of active sessions", body = ActiveSessions),
        (status = 401, description = "No live session", body = ErrorBody),
        (status = 403, description = "Session lacks the admin authority", body = ErrorBody)
    ),
    tag = "admin"
)]
#[instrument(skip_all)]
pub async fn admin_sessions(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    params: Result<Query<AdminSessionsParams>, QueryRejection>,
) -> impl IntoResponse {
    let record = match require_session(&headers, &auth_state).await {
        Ok(record) => record,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_authority(record.principal(), ADMIN_AUTHORITY) {
        return err.into_response();
    }

    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return invalid_request(rejection.status(), rejection.body_text()),
    };

    let active = match params.user_id {
        Some(user_id) => auth_state.sessions().active_sessions(user_id).await.len(),
        None => auth_state.sessions().len().await,
    };

    (
        StatusCode::OK,
        Json(ActiveSessions {
            user_id: params.user_id,
            active,
        }),
    )
        .into_response()
}
