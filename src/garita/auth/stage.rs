//! Pre-authentication stages.
//!
//! Stages run in order before any credential is checked. Each one decides on
//! its own whether a request concerns it (`applies`), and if so either lets it
//! through or rejects it with a typed failure. The first rejection wins.

use async_trait::async_trait;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::challenge::{ChallengeStore, CodeKind};
use super::error::AuthError;

pub const USERNAME_PARAM: &str = "username";
pub const PASSWORD_PARAM: &str = "password";
pub const MOBILE_PARAM: &str = "mobile";
pub const SMS_CODE_PARAM: &str = "code";
pub const IMAGE_CODE_PARAM: &str = "imageCode";

/// A login attempt as seen by the gateway, independent of the HTTP layer.
#[derive(Clone, Debug)]
pub struct LoginRequest {
    pub method: Method,
    pub path: String,
    pub session_id: Option<String>,
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
}

impl LoginRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            session_id: None,
            params: HashMap::new(),
            authorization: None,
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Trimmed, non-empty parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn is_sms_login(&self) -> bool {
        self.param(MOBILE_PARAM).is_some()
    }
}

/// Method + path predicate. Paths compare case-insensitively.
#[derive(Clone, Debug)]
pub struct RequestMatcher {
    method: Method,
    path: String,
}

impl RequestMatcher {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, request: &LoginRequest) -> bool {
        request.method == self.method && request.path.eq_ignore_ascii_case(&self.path)
    }
}

#[async_trait]
pub trait PreAuthStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, request: &LoginRequest) -> bool;

    /// # Errors
    /// Returns the failure that must short-circuit the login.
    async fn handle(&self, request: &LoginRequest) -> Result<(), AuthError>;
}

/// Image CAPTCHA check for username/password logins, keyed by session id.
pub struct ImageCodeStage {
    store: Arc<ChallengeStore>,
    matcher: RequestMatcher,
}

impl ImageCodeStage {
    pub fn new(store: Arc<ChallengeStore>, matcher: RequestMatcher) -> Self {
        Self { store, matcher }
    }
}

#[async_trait]
impl PreAuthStage for ImageCodeStage {
    fn name(&self) -> &'static str {
        "image-code"
    }

    fn applies(&self, request: &LoginRequest) -> bool {
        self.matcher.matches(request) && !request.is_sms_login()
    }

    async fn handle(&self, request: &LoginRequest) -> Result<(), AuthError> {
        let submitted = request.param(IMAGE_CODE_PARAM).unwrap_or_default();
        let key = request.session_id.as_deref().unwrap_or_default();
        self.store
            .verify_and_consume(CodeKind::Image, key, submitted)
            .await?;
        Ok(())
    }
}

/// SMS code check for mobile logins, keyed by the mobile number.
pub struct SmsCodeStage {
    store: Arc<ChallengeStore>,
    matcher: RequestMatcher,
}

impl SmsCodeStage {
    pub fn new(store: Arc<ChallengeStore>, matcher: RequestMatcher) -> Self {
        Self { store, matcher }
    }
}

#[async_trait]
impl PreAuthStage for SmsCodeStage {
    fn name(&self) -> &'static str {
        "sms-code"
    }

    fn applies(&self, request: &LoginRequest) -> bool {
        self.matcher.matches(request) && request.is_sms_login()
    }

    async fn handle(&self, request: &LoginRequest) -> Result<(), AuthError> {
        let submitted = request.param(SMS_CODE_PARAM).unwrap_or_default();
        let mobile = request.param(MOBILE_PARAM).unwrap_or_default();
        self.store
            .verify_and_consume(CodeKind::Sms, mobile, submitted)
            .await?;
        Ok(())
    }
}

/// Ordered list of stages.
#[derive(Clone, Default)]
pub struct StageChain {
    stages: Vec<Arc<dyn PreAuthStage>>,
}

impl StageChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn PreAuthStage>) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every applicable stage in order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the failure of the first stage that rejects the request.
    pub async fn run(&self, request: &LoginRequest) -> Result<(), AuthError> {
        for stage in &self.stages {
            if !stage.applies(request) {
                continue;
            }
            if let Err(err) = stage.handle(request).await {
                debug!(stage = stage.name(), "pre-authentication stage rejected request");
                return Err(err);
            }
            debug!(stage = stage.name(), "pre-authentication stage passed");
        }
        Ok(())
    }
}

/// Receives every failed login before the error is returned to the caller.
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, request: &LoginRequest, error: &AuthError);
}

#[derive(Clone, Debug)]
pub struct LogFailureHandler;

impl FailureHandler for LogFailureHandler {
    fn on_failure(&self, request: &LoginRequest, error: &AuthError) {
        warn!(
            path = %request.path,
            error = error.code(),
            "login failed: {error}"
        );
    }
}
