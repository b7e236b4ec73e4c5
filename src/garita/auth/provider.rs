//! Credential checks and the registry that routes requests to them.
//!
//! Each `Authenticator` declares the single request kind it handles. The
//! registry is built once at startup and refuses to start when a kind has no
//! authenticator or more than one, so dispatch never has to choose.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::{AuthError, ConfigError};
use super::password::PasswordHasher;
use super::retry::lookup_with_retry;
use super::stage::{LoginRequest, MOBILE_PARAM, PASSWORD_PARAM, SMS_CODE_PARAM, USERNAME_PARAM};
use super::users::{UserRecord, UserStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    UsernamePassword,
    SmsLogin,
}

impl RequestKind {
    pub const ALL: [Self; 2] = [Self::UsernamePassword, Self::SmsLogin];

    /// Grant type name a registered client must allow to log in this way.
    #[must_use]
    pub const fn grant_type(self) -> &'static str {
        match self {
            Self::UsernamePassword => "password",
            Self::SmsLogin => "sms",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePassword => write!(f, "username/password"),
            Self::SmsLogin => write!(f, "sms"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AuthenticationRequest {
    UsernamePassword {
        username: String,
        password: SecretString,
    },
    SmsLogin {
        mobile: String,
        code: String,
    },
}

impl AuthenticationRequest {
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::UsernamePassword { .. } => RequestKind::UsernamePassword,
            Self::SmsLogin { .. } => RequestKind::SmsLogin,
        }
    }

    /// Build the credential from login form fields. A `mobile` field selects
    /// the SMS variant.
    ///
    /// # Errors
    /// Returns `BadCredentials` when a required field is absent.
    pub fn from_login(request: &LoginRequest) -> Result<Self, AuthError> {
        if let Some(mobile) = request.param(MOBILE_PARAM) {
            let code = request.param(SMS_CODE_PARAM).ok_or(AuthError::BadCredentials)?;
            return Ok(Self::SmsLogin {
                mobile: mobile.to_string(),
                code: code.to_string(),
            });
        }

        let username = request
            .param(USERNAME_PARAM)
            .ok_or(AuthError::BadCredentials)?;
        // passwords are not trimmed
        let password = request
            .params
            .get(PASSWORD_PARAM)
            .filter(|password| !password.is_empty())
            .ok_or(AuthError::BadCredentials)?;
        Ok(Self::UsernamePassword {
            username: username.to_string(),
            password: SecretString::from(password.clone()),
        })
    }
}

/// Authenticated identity.
#[derive(ToSchema, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub authorities: BTreeSet<String>,
}

impl From<UserRecord> for Principal {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            authorities: user.authorities,
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn supports(&self) -> RequestKind;

    /// # Errors
    /// Returns the reason the credential was rejected.
    async fn authenticate(&self, request: &AuthenticationRequest) -> Result<Principal, AuthError>;
}

pub struct PasswordAuthenticator {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl PasswordAuthenticator {
    pub fn new(users: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { users, hasher }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    fn supports(&self) -> RequestKind {
        RequestKind::UsernamePassword
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, request: &AuthenticationRequest) -> Result<Principal, AuthError> {
        let AuthenticationRequest::UsernamePassword { username, password } = request else {
            return Err(AuthError::BadCredentials);
        };

        let user = lookup_with_retry("user", || self.users.find_by_username(username))
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        if !self
            .hasher
            .verify(username, password.expose_secret(), &user.password_hash)
        {
            return Err(AuthError::BadCredentials);
        }

        if user.locked {
            return Err(AuthError::AccountLocked);
        }

        debug!(username = %user.username, "password accepted");
        Ok(Principal::from(user))
    }
}

/// Resolves the principal for a mobile number. The code itself has already
/// been checked and consumed by the SMS stage.
pub struct SmsCodeAuthenticator {
    users: Arc<dyn UserStore>,
}

impl SmsCodeAuthenticator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for SmsCodeAuthenticator {
    fn supports(&self) -> RequestKind {
        RequestKind::SmsLogin
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, request: &AuthenticationRequest) -> Result<Principal, AuthError> {
        let AuthenticationRequest::SmsLogin { mobile, .. } = request else {
            return Err(AuthError::BadCredentials);
        };

        let user = lookup_with_retry("mobile", || self.users.find_by_mobile(mobile))
            .await?
            .ok_or(AuthError::UnknownAccount)?;

        if user.locked {
            return Err(AuthError::AccountLocked);
        }

        Ok(Principal::from(user))
    }
}

pub struct AuthenticatorRegistry {
    authenticators: HashMap<RequestKind, Arc<dyn Authenticator>>,
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("kinds", &self.authenticators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuthenticatorRegistry {
    /// # Errors
    /// Returns `ConfigError` unless every request kind has exactly one
    /// authenticator.
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>) -> Result<Self, ConfigError> {
        let mut by_kind: HashMap<RequestKind, Arc<dyn Authenticator>> = HashMap::new();
        for authenticator in authenticators {
            let kind = authenticator.supports();
            if by_kind.insert(kind, authenticator).is_some() {
                return Err(ConfigError::Ambiguous(kind));
            }
        }

        if let Some(kind) = RequestKind::ALL
            .into_iter()
            .find(|kind| !by_kind.contains_key(kind))
        {
            return Err(ConfigError::Unsupported(kind));
        }

        Ok(Self {
            authenticators: by_kind,
        })
    }

    /// Route `request` to the authenticator for its kind.
    ///
    /// # Errors
    /// Returns whatever the authenticator rejects the credential with.
    pub async fn authenticate(
        &self,
        request: &AuthenticationRequest,
    ) -> Result<Principal, AuthError> {
        let kind = request.kind();
        let authenticator = self
            .authenticators
            .get(&kind)
            .ok_or_else(|| AuthError::Infrastructure(format!("no authenticator for {kind}")))?;
        authenticator.authenticate(request).await
    }
}
