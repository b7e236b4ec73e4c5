//! Failure taxonomy for the login gateway.
//!
//! Every user-facing failure carries a stable code (`CodeMissing`,
//! `BadCredentials`, ...) and a human readable message. Configuration
//! problems are a separate type because they are detected at startup.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use super::provider::RequestKind;

/// Reason a challenge code was rejected by a pre-authentication stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("Verification code must not be blank")]
    Blank,
    #[error("Verification code not found or already used")]
    Missing,
    #[error("Verification code expired")]
    Expired,
    #[error("Verification code does not match")]
    Mismatch,
}

impl ChallengeError {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Blank => "CodeBlank",
            Self::Missing => "CodeMissing",
            Self::Expired => "CodeExpired",
            Self::Mismatch => "CodeMismatch",
        }
    }
}

/// How a session stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Evicted by a newer login or idle past its TTL.
    Expired,
    /// Logged out, or never issued by this registry.
    Invalidated,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Invalidated => write!(f, "invalidated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    ValidateCode(#[from] ChallengeError),
    #[error("Unknown account")]
    UnknownAccount,
    #[error("Bad credentials")]
    BadCredentials,
    #[error("Account is locked")]
    AccountLocked,
    #[error("Maximum number of sessions reached for this account")]
    TooManySessions,
    #[error("Access denied, missing authority {0}")]
    AccessDenied(String),
    #[error("Session {0}, please log in again")]
    SessionInvalid(SessionEnd),
    #[error("Missing client credentials")]
    MissingClientCredentials,
    #[error("Malformed client credentials")]
    MalformedCredentials,
    #[error("Unknown client")]
    UnknownClient,
    #[error("Invalid client secret")]
    InvalidClientSecret,
    #[error("Client may not use the {0} grant")]
    UnauthorizedGrant(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl AuthError {
    /// Stable identifier exposed to clients in the `error` field.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ValidateCode(reason) => reason.code(),
            Self::UnknownAccount => "UnknownAccount",
            Self::BadCredentials => "BadCredentials",
            Self::AccountLocked => "AccountLocked",
            Self::TooManySessions => "TooManySessions",
            Self::AccessDenied(_) => "AccessDenied",
            Self::SessionInvalid(_) => "SessionInvalid",
            Self::MissingClientCredentials => "MissingClientCredentials",
            Self::MalformedCredentials => "MalformedCredentials",
            Self::UnknownClient => "UnknownClient",
            Self::InvalidClientSecret => "InvalidClientSecret",
            Self::UnauthorizedGrant(_) => "UnauthorizedGrant",
            Self::Infrastructure(_) => "InfrastructureError",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::ValidateCode(_) | Self::MalformedCredentials => StatusCode::BAD_REQUEST,
            Self::UnknownAccount
            | Self::BadCredentials
            | Self::SessionInvalid(_)
            | Self::MissingClientCredentials
            | Self::UnknownClient
            | Self::InvalidClientSecret
            | Self::UnauthorizedGrant(_) => StatusCode::UNAUTHORIZED,
            Self::AccountLocked | Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::TooManySessions => StatusCode::CONFLICT,
            Self::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Failure payload returned by every auth endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&AuthError> for ErrorBody {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::from(&self))).into_response()
    }
}

/// Wiring problems found while assembling the authenticator registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no authenticator supports {0} requests")]
    Unsupported(RequestKind),
    #[error("more than one authenticator supports {0} requests")]
    Ambiguous(RequestKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_errors_keep_their_own_codes() {
        let err = AuthError::from(ChallengeError::Expired);
        assert_eq!(err.code(), "CodeExpired");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Verification code expired");
    }

    #[test]
    fn every_failure_has_a_distinct_code() {
        let errors = [
            AuthError::from(ChallengeError::Blank),
            AuthError::from(ChallengeError::Missing),
            AuthError::from(ChallengeError::Expired),
            AuthError::from(ChallengeError::Mismatch),
            AuthError::UnknownAccount,
            AuthError::BadCredentials,
            AuthError::AccountLocked,
            AuthError::TooManySessions,
            AuthError::AccessDenied("admin".to_string()),
            AuthError::SessionInvalid(SessionEnd::Expired),
            AuthError::MissingClientCredentials,
            AuthError::MalformedCredentials,
            AuthError::UnknownClient,
            AuthError::InvalidClientSecret,
            AuthError::UnauthorizedGrant("sms".to_string()),
            AuthError::Infrastructure("store down".to_string()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(AuthError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(errors
            .iter()
            .all(|err| err.status() != StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn session_invalid_message_names_the_reason() {
        let err = AuthError::SessionInvalid(SessionEnd::Expired);
        assert_eq!(err.to_string(), "Session expired, please log in again");
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "SessionInvalid");
    }
}
