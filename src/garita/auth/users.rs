//! User directory consulted by the authenticators.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub mobile: Option<String>,
    /// Output of the configured `PasswordHasher` for this username.
    pub password_hash: String,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    #[serde(default)]
    pub locked: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing directory is unreachable.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// # Errors
    /// Returns an error if the backing directory is unreachable.
    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<UserRecord>>;
}

/// Read-only user directory held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserStore {
    by_username: HashMap<String, UserRecord>,
    by_mobile: HashMap<String, String>,
}

impl InMemoryUserStore {
    /// Later records win when usernames or mobiles repeat.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            if let Some(mobile) = &record.mobile {
                store
                    .by_mobile
                    .insert(mobile.clone(), record.username.clone());
            }
            store.by_username.insert(record.username.clone(), record);
        }
        store
    }

    /// Load a JSON array of users.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read users file {}", path.display()))?;
        let records: Vec<UserRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse users file {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.by_username.get(username).cloned())
    }

    async fn find_by_mobile(&self, mobile: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .by_mobile
            .get(mobile)
            .and_then(|username| self.by_username.get(username))
            .cloned())
    }
}
