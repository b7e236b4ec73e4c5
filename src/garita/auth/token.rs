//! Access token issuance after a successful client handshake.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use super::client::RegisteredClient;
use super::provider::Principal;

const TOKEN_BYTES: usize = 32;

/// Everything a generator needs to mint a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenParameters {
    pub principal_id: Uuid,
    pub username: String,
    pub client_id: String,
    pub scopes: BTreeSet<String>,
}

impl TokenParameters {
    #[must_use]
    pub fn new(principal: &Principal, client: &RegisteredClient) -> Self {
        Self {
            principal_id: principal.id,
            username: principal.username.clone(),
            client_id: client.client_id.clone(),
            scopes: client.scopes.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
    pub user_name: String,
    pub client_id: String,
}

pub trait TokenGenerator: Send + Sync {
    fn generate(&self, parameters: &TokenParameters) -> AccessToken;
}

/// Random bearer tokens with no embedded claims.
#[derive(Clone, Debug)]
pub struct OpaqueTokenGenerator {
    ttl: Duration,
}

impl OpaqueTokenGenerator {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl TokenGenerator for OpaqueTokenGenerator {
    fn generate(&self, parameters: &TokenParameters) -> AccessToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        AccessToken {
            access_token: Base64UrlUnpadded::encode_string(&bytes),
            token_type: "bearer".to_string(),
            expires_in: self.ttl.as_secs(),
            scope: parameters
                .scopes
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            user_name: parameters.username.clone(),
            client_id: parameters.client_id.clone(),
        }
    }
}
