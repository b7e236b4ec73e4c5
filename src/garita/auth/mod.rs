//! Login gateway core.
//!
//! A login attempt flows through four layers, any of which can end it with a
//! typed [`AuthError`]:
//!
//! 1. **Challenge stages** check the image CAPTCHA (password logins, keyed by
//!    browser session) or the SMS one-time code (mobile logins, keyed by
//!    mobile number). Codes are single use and expire after their TTL.
//! 2. **Authenticators** verify the credential and resolve a [`Principal`].
//! 3. **Client handshake** (optional, or mandatory when configured) validates
//!    `Authorization: Basic base64(client_id:client_secret)`.
//! 4. **Session registry** admits the new session, either rejecting it or
//!    evicting the oldest one when the principal is at its session limit.
//!
//! Routes beyond login can additionally demand an authority of the session's
//! principal, see [`require_authority`].
//!
//! ## Session Ends
//!
//! A session id that stops working reports why: `expired` when it was evicted
//! by a newer login or sat idle beyond the session TTL, `invalidated` when it
//! was logged out or never existed.

pub(crate) mod access;
pub(crate) mod captcha;
pub(crate) mod challenge;
pub(crate) mod client;
mod error;
pub(crate) mod gateway;
pub(crate) mod password;
pub(crate) mod provider;
mod retry;
pub(crate) mod session;
pub(crate) mod sms;
pub(crate) mod stage;
mod state;
pub(crate) mod token;
pub(crate) mod users;

pub use access::{require_authority, ADMIN_AUTHORITY};
pub use challenge::{ChallengeCode, ChallengeStore, CodeKind, CodePolicy, IssuedImage};
pub use client::{ClientStore, InMemoryClientStore, RegisteredClient};
pub use error::{AuthError, ChallengeError, ConfigError, ErrorBody, SessionEnd};
pub use gateway::{LoginGateway, LoginOutcome};
pub use password::{PasswordHasher, Sha256PasswordHasher};
pub use provider::{Principal, RequestKind};
pub use session::{SessionPolicy, SessionRecord, SessionRegistry};
pub use sms::{LogSmsSender, SmsSender, WebhookSmsSender};
pub use stage::LoginRequest;
pub use state::{AuthConfig, AuthState, DEFAULT_LOGIN_PATH, DEFAULT_SESSION_INVALID_URL};
pub use token::AccessToken;
pub use users::{InMemoryUserStore, UserRecord, UserStore};

#[cfg(test)]
mod tests;
