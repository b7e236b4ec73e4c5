//! Client credential handshake (`Authorization: Basic ...`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::error::AuthError;
use super::provider::RequestKind;
use super::password::constant_time_eq;
use super::retry::lookup_with_retry;

const BASIC_SCHEME: &str = "Basic ";

#[derive(Clone, Debug, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Grant types (`password`, `sms`) this client may log users in with.
    /// Empty allows all of them.
    #[serde(default)]
    pub allowed_grant_types: BTreeSet<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl RegisteredClient {
    #[must_use]
    pub fn allows(&self, kind: RequestKind) -> bool {
        self.allowed_grant_types.is_empty() || self.allowed_grant_types.contains(kind.grant_type())
    }
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing store is unreachable.
    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryClientStore {
    clients: HashMap<String, RegisteredClient>,
}

impl InMemoryClientStore {
    #[must_use]
    pub fn from_clients(clients: impl IntoIterator<Item = RegisteredClient>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|client| (client.client_id.clone(), client))
                .collect(),
        }
    }

    /// Load a JSON array of registered clients.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read clients file {}", path.display()))?;
        let clients: Vec<RegisteredClient> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse clients file {}", path.display()))?;
        Ok(Self::from_clients(clients))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn find_client(&self, client_id: &str) -> Result<Option<RegisteredClient>> {
        Ok(self.clients.get(client_id).cloned())
    }
}

/// Decoded `client_id` / `client_secret` pair.
#[derive(Debug)]
pub struct BasicCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Parse an `Authorization` header value.
///
/// # Errors
/// `MissingClientCredentials` when the header is absent or not Basic,
/// `MalformedCredentials` when the payload is not `base64(id:secret)`.
pub fn parse_basic(header: Option<&str>) -> Result<BasicCredentials, AuthError> {
    let header = header.ok_or(AuthError::MissingClientCredentials)?;
    let scheme = header
        .get(..BASIC_SCHEME.len())
        .ok_or(AuthError::MissingClientCredentials)?;
    if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
        return Err(AuthError::MissingClientCredentials);
    }

    let encoded = header[BASIC_SCHEME.len()..].trim();
    let decoded = Base64::decode_vec(encoded).map_err(|_| AuthError::MalformedCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredentials)?;
    let (client_id, client_secret) = decoded
        .split_once(':')
        .ok_or(AuthError::MalformedCredentials)?;

    Ok(BasicCredentials {
        client_id: client_id.to_string(),
        client_secret: SecretString::from(client_secret.to_string()),
    })
}

pub struct ClientCredentialValidator {
    clients: Arc<dyn ClientStore>,
}

impl ClientCredentialValidator {
    pub fn new(clients: Arc<dyn ClientStore>) -> Self {
        Self { clients }
    }

    /// Validate the `Authorization` header and return the matching client.
    ///
    /// # Errors
    /// Returns the handshake failure, see [`parse_basic`] for header errors.
    #[instrument(skip_all)]
    pub async fn validate(&self, header: Option<&str>) -> Result<RegisteredClient, AuthError> {
        let credentials = parse_basic(header)?;

        let client = lookup_with_retry("client", || {
            self.clients.find_client(&credentials.client_id)
        })
        .await?
        .ok_or(AuthError::UnknownClient)?;

        if !constant_time_eq(
            client.client_secret.expose_secret().as_bytes(),
            credentials.client_secret.expose_secret().as_bytes(),
        ) {
            return Err(AuthError::InvalidClientSecret);
        }

        debug!(client_id = %client.client_id, "client credentials accepted");
        Ok(client)
    }
}
