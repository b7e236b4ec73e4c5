//! # Garita (browser login gateway)
//!
//! `garita` guards a form login endpoint. Every attempt walks the same path:
//!
//! 1. Pre-authentication stages check a single-use challenge code (image
//!    CAPTCHA keyed by the browser session, or an SMS code keyed by the mobile
//!    number).
//! 2. The authenticator registry verifies the credentials for the request
//!    variant (username/password or mobile/code) and produces a principal.
//! 3. The session registry admits the principal under the concurrent session
//!    policy, either rejecting the login or evicting the oldest session.
//! 4. When the caller presents `Authorization: Basic ...` client credentials,
//!    the client is validated and an access token is minted for it.
//!
//! Any failure short-circuits with a stable error code, see
//! [`garita::auth::AuthError`].

pub mod cli;
pub mod garita;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
