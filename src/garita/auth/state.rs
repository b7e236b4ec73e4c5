//! Auth state, configuration, and background sweeping.

use axum::http::Method;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

use super::challenge::{ChallengeStore, CodePolicy};
use super::client::{ClientCredentialValidator, ClientStore};
use super::error::ConfigError;
use super::gateway::LoginGateway;
use super::password::Sha256PasswordHasher;
use super::provider::{AuthenticatorRegistry, PasswordAuthenticator, SmsCodeAuthenticator};
use super::session::{SessionPolicy, SessionRegistry};
use super::sms::SmsSender;
use super::stage::{ImageCodeStage, LogFailureHandler, RequestMatcher, SmsCodeStage, StageChain};
use super::token::OpaqueTokenGenerator;
use super::users::UserStore;

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_SESSION_INVALID_URL: &str = "/session/invalid";
const DEFAULT_IMAGE_CODE_LENGTH: usize = 4;
const DEFAULT_IMAGE_CODE_TTL_SECONDS: u64 = 60;
const DEFAULT_SMS_CODE_LENGTH: usize = 6;
const DEFAULT_SMS_CODE_TTL_SECONDS: u64 = 60;
const DEFAULT_MAX_SESSIONS: usize = 1;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_TOKEN_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    login_path: String,
    image_code_length: usize,
    image_code_ttl_seconds: u64,
    sms_code_length: usize,
    sms_code_ttl_seconds: u64,
    max_sessions: usize,
    max_sessions_prevents_login: bool,
    session_ttl_seconds: u64,
    session_invalid_url: String,
    require_client_credentials: bool,
    token_ttl_seconds: u64,
    sweep_interval_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            image_code_length: DEFAULT_IMAGE_CODE_LENGTH,
            image_code_ttl_seconds: DEFAULT_IMAGE_CODE_TTL_SECONDS,
            sms_code_length: DEFAULT_SMS_CODE_LENGTH,
            sms_code_ttl_seconds: DEFAULT_SMS_CODE_TTL_SECONDS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_sessions_prevents_login: true,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_invalid_url: DEFAULT_SESSION_INVALID_URL.to_string(),
            require_client_credentials: false,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: String) -> Self {
        self.login_path = path;
        self
    }

    #[must_use]
    pub fn with_image_code_length(mut self, length: usize) -> Self {
        self.image_code_length = length;
        self
    }

    #[must_use]
    pub fn with_image_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.image_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_sms_code_length(mut self, length: usize) -> Self {
        self.sms_code_length = length;
        self
    }

    #[must_use]
    pub fn with_sms_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.sms_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub fn with_max_sessions_prevents_login(mut self, prevents_login: bool) -> Self {
        self.max_sessions_prevents_login = prevents_login;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_invalid_url(mut self, url: String) -> Self {
        self.session_invalid_url = url;
        self
    }

    #[must_use]
    pub fn with_required_client_credentials(mut self, required: bool) -> Self {
        self.require_client_credentials = required;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn session_invalid_url(&self) -> &str {
        &self.session_invalid_url
    }

    #[must_use]
    pub fn require_client_credentials(&self) -> bool {
        self.require_client_credentials
    }

    #[must_use]
    pub fn image_policy(&self) -> CodePolicy {
        CodePolicy::new(
            self.image_code_length,
            Duration::from_secs(self.image_code_ttl_seconds),
        )
    }

    #[must_use]
    pub fn sms_policy(&self) -> CodePolicy {
        CodePolicy::new(
            self.sms_code_length,
            Duration::from_secs(self.sms_code_ttl_seconds),
        )
    }

    #[must_use]
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::new(
            self.max_sessions,
            self.max_sessions_prevents_login,
            Duration::from_secs(self.session_ttl_seconds),
        )
    }

    pub(super) fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    pub(super) fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

pub struct AuthState {
    config: AuthConfig,
    challenges: Arc<ChallengeStore>,
    sessions: Arc<SessionRegistry>,
    gateway: LoginGateway,
}

impl AuthState {
    /// Wire the stores, stages and authenticators described by `config`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the authenticator registry is incomplete.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        clients: Arc<dyn ClientStore>,
        sms: Arc<dyn SmsSender>,
    ) -> Result<Self, ConfigError> {
        let challenges = Arc::new(ChallengeStore::new(
            config.image_policy(),
            config.sms_policy(),
            sms,
        ));
        let sessions = Arc::new(SessionRegistry::new(config.session_policy()));

        let matcher = RequestMatcher::new(Method::POST, config.login_path());
        let stages = StageChain::new()
            .with_stage(Arc::new(ImageCodeStage::new(
                challenges.clone(),
                matcher.clone(),
            )))
            .with_stage(Arc::new(SmsCodeStage::new(challenges.clone(), matcher)));

        let registry = AuthenticatorRegistry::new(vec![
            Arc::new(PasswordAuthenticator::new(
                users.clone(),
                Arc::new(Sha256PasswordHasher),
            )),
            Arc::new(SmsCodeAuthenticator::new(users)),
        ])?;

        let gateway = LoginGateway::new(
            stages,
            registry,
            ClientCredentialValidator::new(clients),
            sessions.clone(),
            Arc::new(OpaqueTokenGenerator::new(config.token_ttl())),
            Arc::new(LogFailureHandler),
        )
        .with_required_client_credentials(config.require_client_credentials());

        Ok(Self {
            config,
            challenges,
            sessions,
            gateway,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub fn gateway(&self) -> &LoginGateway {
        &self.gateway
    }

    /// Periodically purge expired challenge codes and idle sessions.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(state.config.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let codes = state.challenges.purge_expired().await;
                let sessions = state.sessions.purge_expired().await;
                if codes > 0 || sessions > 0 {
                    debug!(codes, sessions, "swept expired entries");
                }
            }
        })
    }
}
