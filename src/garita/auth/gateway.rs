//! The login pipeline: stages, credentials, client handshake, session, token.

use std::sync::Arc;
use tracing::{info, instrument};

use super::client::ClientCredentialValidator;
use super::error::AuthError;
use super::provider::{AuthenticationRequest, AuthenticatorRegistry, Principal};
use super::session::{SessionRecord, SessionRegistry};
use super::stage::{FailureHandler, LoginRequest, StageChain};
use super::token::{AccessToken, TokenGenerator, TokenParameters};

/// Result of a successful login.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub session: SessionRecord,
    pub token: Option<AccessToken>,
}

pub struct LoginGateway {
    stages: StageChain,
    registry: AuthenticatorRegistry,
    clients: ClientCredentialValidator,
    sessions: Arc<SessionRegistry>,
    tokens: Arc<dyn TokenGenerator>,
    failure_handler: Arc<dyn FailureHandler>,
    require_client_credentials: bool,
}

impl LoginGateway {
    pub fn new(
        stages: StageChain,
        registry: AuthenticatorRegistry,
        clients: ClientCredentialValidator,
        sessions: Arc<SessionRegistry>,
        tokens: Arc<dyn TokenGenerator>,
        failure_handler: Arc<dyn FailureHandler>,
    ) -> Self {
        Self {
            stages,
            registry,
            clients,
            sessions,
            tokens,
            failure_handler,
            require_client_credentials: false,
        }
    }

    /// Reject logins that do not present client credentials.
    #[must_use]
    pub fn with_required_client_credentials(mut self, required: bool) -> Self {
        self.require_client_credentials = required;
        self
    }

    /// Run one login attempt end to end. Every failure is reported to the
    /// failure handler before it is returned.
    ///
    /// # Errors
    /// Returns the first failure of the pipeline.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome, AuthError> {
        match self.try_login(request).await {
            Ok(outcome) => {
                info!(username = %outcome.principal.username, "login succeeded");
                Ok(outcome)
            }
            Err(err) => {
                self.failure_handler.on_failure(request, &err);
                Err(err)
            }
        }
    }

    async fn try_login(&self, request: &LoginRequest) -> Result<LoginOutcome, AuthError> {
        self.stages.run(request).await?;

        let credential = AuthenticationRequest::from_login(request)?;
        let principal = self.registry.authenticate(&credential).await?;

        // The handshake runs before admission so a rejected client never
        // takes a session slot.
        let client = if request.authorization.is_some() || self.require_client_credentials {
            let client = self
                .clients
                .validate(request.authorization.as_deref())
                .await?;
            let kind = credential.kind();
            if !client.allows(kind) {
                return Err(AuthError::UnauthorizedGrant(kind.grant_type().to_string()));
            }
            Some(client)
        } else {
            None
        };

        // A session this browser already holds for the same principal is
        // replaced instead of counting against the limit.
        let session = self
            .sessions
            .admit_replacing(&principal, request.session_id.as_deref())
            .await?;

        let token = client
            .map(|client| self.tokens.generate(&TokenParameters::new(&principal, &client)));

        Ok(LoginOutcome {
            principal,
            session,
            token,
        })
    }
}
