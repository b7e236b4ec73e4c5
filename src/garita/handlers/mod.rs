pub mod admin;
pub use self::admin::admin_sessions;

pub mod code;
pub use self::code::{image_code, sms_code};

pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod session;
pub use self::session::{session, session_invalid, signout};

// common functions for the handlers
use axum::{
    http::{
        header::{InvalidHeaderValue, COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use regex::Regex;

use crate::garita::auth::{AuthError, AuthState, ErrorBody, SessionEnd, SessionRecord};

pub const SESSION_COOKIE_NAME: &str = "garita_session";
pub const SESSION_HEADER: &str = "x-session-id";

pub fn valid_mobile(mobile: &str) -> bool {
    Regex::new(r"^\+?[0-9]{6,15}$").is_ok_and(|re| re.is_match(mobile))
}

/// Browser session id, from the `X-Session-Id` header or the session cookie.
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(value.to_string());
    }

    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((key, val)) = pair.trim().split_once('=') {
                if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                    return Some(val.trim().to_string());
                }
            }
        }
    }
    None
}

/// Resolve the request's session and refresh it.
///
/// # Errors
/// Returns `SessionInvalid` when there is no session or it has ended.
pub async fn require_session(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<SessionRecord, AuthError> {
    match extract_session_id(headers) {
        Some(session_id) => auth_state.sessions().touch(&session_id).await,
        None => Err(AuthError::SessionInvalid(SessionEnd::Invalidated)),
    }
}

/// `{error, message}` body for requests the extractors could not parse.
pub fn invalid_request(status: StatusCode, message: String) -> Response {
    let body = ErrorBody {
        error: "InvalidRequest".to_string(),
        message,
    };
    (status, Json(body)).into_response()
}

/// `HttpOnly` session cookie. Without `max_age` it lives as long as the browser.
pub fn session_cookie(
    session_id: &str,
    max_age: Option<u64>,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(seconds) = max_age {
        cookie.push_str(&format!("; Max-Age={seconds}"));
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie() -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mobile() {
        assert!(valid_mobile("17777777777"));
        assert!(valid_mobile("+15550100"));
        assert!(!valid_mobile("555-0100"));
        assert!(!valid_mobile("12345"));
        assert!(!valid_mobile(""));
    }

    #[test]
    fn session_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; garita_session=from-cookie"));
        assert_eq!(extract_session_id(&headers), Some("from-cookie".to_string()));

        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(extract_session_id(&headers), Some("from-header".to_string()));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static(" "));
        headers.insert(COOKIE, HeaderValue::from_static("garita_session="));
        assert_eq!(extract_session_id(&headers), None);
    }

    #[test]
    fn cookies_are_http_only() -> Result<(), InvalidHeaderValue> {
        let cookie = session_cookie("abc", Some(60))?;
        assert_eq!(
            cookie.to_str().unwrap_or_default(),
            "garita_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        let cleared = clear_session_cookie()?;
        assert!(cleared.to_str().unwrap_or_default().ends_with("Max-Age=0"));
        Ok(())
    }
}
