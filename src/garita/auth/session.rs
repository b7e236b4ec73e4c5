//! Active browser sessions and the concurrent-session policy.
//!
//! Evicted and idle sessions leave a tombstone behind so that the next request
//! carrying their id learns the session *expired*, as opposed to an id that
//! was logged out or never issued.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::error::{AuthError, SessionEnd};
use super::provider::Principal;

const SESSION_ID_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    max_sessions: usize,
    prevents_login: bool,
    idle_ttl: Duration,
}

impl SessionPolicy {
    /// `max_sessions` is at least one.
    #[must_use]
    pub fn new(max_sessions: usize, prevents_login: bool, idle_ttl: Duration) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            prevents_login,
            idle_ttl,
        }
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    #[must_use]
    pub fn prevents_login(&self) -> bool {
        self.prevents_login
    }

    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    session_id: String,
    principal: Principal,
    created_at: Instant,
    last_access_at: Instant,
}

impl SessionRecord {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    #[must_use]
    pub fn principal_id(&self) -> Uuid {
        self.principal.id
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn last_access_at(&self) -> Instant {
        self.last_access_at
    }

    fn is_idle_at(&self, now: Instant, idle_ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_access_at) > idle_ttl
    }
}

#[derive(Default)]
struct Sessions {
    records: HashMap<String, SessionRecord>,
    // oldest first
    by_principal: HashMap<Uuid, Vec<String>>,
    tombstones: HashMap<String, Instant>,
}

impl Sessions {
    fn remove(&mut self, session_id: &str) -> Option<SessionRecord> {
        let record = self.records.remove(session_id)?;
        if let Some(ids) = self.by_principal.get_mut(&record.principal.id) {
            ids.retain(|id| id != session_id);
            if ids.is_empty() {
                self.by_principal.remove(&record.principal.id);
            }
        }
        Some(record)
    }

    fn expire(&mut self, session_id: &str, now: Instant) -> Option<SessionRecord> {
        let record = self.remove(session_id)?;
        self.tombstones.insert(session_id.to_string(), now);
        Some(record)
    }

    fn ended(&self, session_id: &str) -> AuthError {
        if self.tombstones.contains_key(session_id) {
            AuthError::SessionInvalid(SessionEnd::Expired)
        } else {
            AuthError::SessionInvalid(SessionEnd::Invalidated)
        }
    }
}

pub struct SessionRegistry {
    policy: SessionPolicy,
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(Sessions::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Open a new session for `principal`, applying the concurrent-session
    /// policy first.
    ///
    /// # Errors
    /// Returns `TooManySessions` when the principal is at its limit and the
    /// policy rejects new logins instead of evicting.
    pub async fn admit(&self, principal: &Principal) -> Result<SessionRecord, AuthError> {
        self.admit_replacing(principal, None).await
    }

    /// Like [`SessionRegistry::admit`], but `current` (the session the
    /// request arrived with) is released first when it belongs to the same
    /// principal. Release and admission share one critical section: either
    /// the new session replaces `current`, or nothing changes.
    ///
    /// # Errors
    /// Returns `TooManySessions` when the principal is at its limit and the
    /// policy rejects new logins instead of evicting.
    #[instrument(skip_all, fields(username = %principal.username))]
    pub async fn admit_replacing(
        &self,
        principal: &Principal,
        current: Option<&str>,
    ) -> Result<SessionRecord, AuthError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        let existing = sessions
            .by_principal
            .get(&principal.id)
            .cloned()
            .unwrap_or_default();

        let mut active = Vec::with_capacity(existing.len());
        let mut replaced = None;
        for session_id in existing {
            let idle = sessions
                .records
                .get(&session_id)
                .is_some_and(|record| record.is_idle_at(now, self.policy.idle_ttl));
            if idle {
                sessions.expire(&session_id, now);
            } else if current == Some(session_id.as_str()) {
                replaced = Some(session_id);
            } else {
                active.push(session_id);
            }
        }

        if active.len() >= self.policy.max_sessions && self.policy.prevents_login {
            return Err(AuthError::TooManySessions);
        }

        if let Some(session_id) = replaced {
            sessions.remove(&session_id);
            debug!("session replaced by a login from the same browser");
        }

        if active.len() >= self.policy.max_sessions {
            let excess = active.len() + 1 - self.policy.max_sessions;
            for session_id in active.iter().take(excess) {
                sessions.expire(session_id, now);
                info!("session evicted by a newer login");
            }
        }

        let record = SessionRecord {
            session_id: new_session_id(),
            principal: principal.clone(),
            created_at: now,
            last_access_at: now,
        };
        sessions
            .by_principal
            .entry(principal.id)
            .or_default()
            .push(record.session_id.clone());
        sessions
            .records
            .insert(record.session_id.clone(), record.clone());

        debug!("session admitted");
        Ok(record)
    }

    /// Current state of a session without refreshing it.
    ///
    /// # Errors
    /// Returns `SessionInvalid` with the reason the session ended.
    pub async fn lookup(&self, session_id: &str) -> Result<SessionRecord, AuthError> {
        self.access(session_id, false).await
    }

    /// Refresh `last_access_at` and return the session.
    ///
    /// # Errors
    /// Returns `SessionInvalid` with the reason the session ended.
    pub async fn touch(&self, session_id: &str) -> Result<SessionRecord, AuthError> {
        self.access(session_id, true).await
    }

    async fn access(&self, session_id: &str, refresh: bool) -> Result<SessionRecord, AuthError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        let idle = match sessions.records.get(session_id) {
            Some(record) => record.is_idle_at(now, self.policy.idle_ttl),
            None => return Err(sessions.ended(session_id)),
        };
        if idle {
            sessions.expire(session_id, now);
            return Err(AuthError::SessionInvalid(SessionEnd::Expired));
        }

        let record = sessions
            .records
            .get_mut(session_id)
            .ok_or(AuthError::SessionInvalid(SessionEnd::Invalidated))?;
        if refresh {
            record.last_access_at = now;
        }
        Ok(record.clone())
    }

    /// Log a session out. Returns `false` if it was not active.
    pub async fn invalidate(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.tombstones.remove(session_id);
        sessions.remove(session_id).is_some()
    }

    /// Active sessions of one principal, oldest first.
    pub async fn active_sessions(&self, principal_id: Uuid) -> Vec<SessionRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .by_principal
            .get(&principal_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| sessions.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expire idle sessions and forget tombstones older than the idle TTL.
    /// Returns the number of sessions expired.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let idle_ttl = self.policy.idle_ttl;
        let mut sessions = self.sessions.lock().await;

        let idle: Vec<String> = sessions
            .records
            .values()
            .filter(|record| record.is_idle_at(now, idle_ttl))
            .map(|record| record.session_id.clone())
            .collect();
        for session_id in &idle {
            sessions.expire(session_id, now);
        }

        sessions
            .tombstones
            .retain(|_, ended_at| now.saturating_duration_since(*ended_at) <= idle_ttl);

        idle.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn principal(username: &str) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: username.to_string(),
            authorities: BTreeSet::new(),
        }
    }

    fn registry(max_sessions: usize, prevents_login: bool) -> SessionRegistry {
        SessionRegistry::new(SessionPolicy::new(
            max_sessions,
            prevents_login,
            Duration::from_secs(1800),
        ))
    }

    #[test]
    fn session_ids_are_url_safe_and_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn policy_allows_at_least_one_session() {
        let policy = SessionPolicy::new(0, false, Duration::from_secs(1));
        assert_eq!(policy.max_sessions(), 1);
    }

    #[tokio::test]
    async fn second_login_evicts_the_first() -> Result<()> {
        let registry = registry(1, false);
        let alice = principal("alice");

        let first = registry.admit(&alice).await?;
        let second = registry.admit(&alice).await?;

        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.lookup(first.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Expired))
        );
        assert_eq!(
            registry.lookup(second.session_id()).await?.principal_id(),
            alice.id
        );
        Ok(())
    }

    #[tokio::test]
    async fn prevents_login_keeps_the_original_session() -> Result<()> {
        let registry = registry(1, true);
        let alice = principal("alice");

        let first = registry.admit(&alice).await?;
        assert_eq!(
            registry.admit(&alice).await.err(),
            Some(AuthError::TooManySessions)
        );
        assert!(registry.lookup(first.session_id()).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn eviction_removes_the_oldest_sessions() -> Result<()> {
        let registry = registry(2, false);
        let alice = principal("alice");

        let first = registry.admit(&alice).await?;
        let second = registry.admit(&alice).await?;
        let third = registry.admit(&alice).await?;

        let active: Vec<String> = registry
            .active_sessions(alice.id)
            .await
            .iter()
            .map(|record| record.session_id().to_string())
            .collect();
        assert_eq!(
            active,
            vec![second.session_id().to_string(), third.session_id().to_string()]
        );
        assert!(registry.lookup(first.session_id()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn principals_do_not_share_limits() -> Result<()> {
        let registry = registry(1, true);
        registry.admit(&principal("alice")).await?;
        registry.admit(&principal("bob")).await?;
        assert_eq!(registry.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn logout_invalidates_and_frees_the_slot() -> Result<()> {
        let registry = registry(1, true);
        let alice = principal("alice");

        let first = registry.admit(&alice).await?;
        assert!(registry.invalidate(first.session_id()).await);
        assert!(!registry.invalidate(first.session_id()).await);
        assert_eq!(
            registry.touch(first.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Invalidated))
        );
        registry.admit(&alice).await?;
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_is_invalidated() {
        let registry = registry(1, false);
        assert_eq!(
            registry.lookup("never-issued").await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Invalidated))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn touch_keeps_sessions_alive_and_idle_ones_expire() -> Result<()> {
        let registry = SessionRegistry::new(SessionPolicy::new(1, true, Duration::from_secs(60)));
        let alice = principal("alice");
        let session = registry.admit(&alice).await?;

        tokio::time::advance(Duration::from_secs(50)).await;
        let touched = registry.touch(session.session_id()).await?;
        assert!(touched.last_access_at() > session.last_access_at());

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(registry.lookup(session.session_id()).await.is_ok());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(
            registry.touch(session.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Expired))
        );

        // an idle session no longer blocks a new login
        registry.admit(&alice).await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expires_idle_sessions_and_forgets_old_tombstones() -> Result<()> {
        let registry = SessionRegistry::new(SessionPolicy::new(1, false, Duration::from_secs(60)));
        let session = registry.admit(&principal("alice")).await?;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.purge_expired().await, 1);
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.lookup(session.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Expired))
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.purge_expired().await, 0);
        assert_eq!(
            registry.lookup(session.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Invalidated))
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logins_respect_the_limit() -> Result<()> {
        let registry = Arc::new(registry(1, true));
        let alice = principal("alice");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move { registry.admit(&alice).await }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await?.is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.active_sessions(alice.id).await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn relogin_replaces_the_current_session() -> Result<()> {
        let registry = registry(1, true);
        let alice = principal("alice");
        let first = registry.admit(&alice).await?;

        let second = registry
            .admit_replacing(&alice, Some(first.session_id()))
            .await?;
        assert_ne!(first.session_id(), second.session_id());
        assert_eq!(
            registry.lookup(first.session_id()).await.err(),
            Some(AuthError::SessionInvalid(SessionEnd::Invalidated))
        );
        assert_eq!(registry.active_sessions(alice.id).await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_session_is_not_replaced() -> Result<()> {
        let registry = registry(1, true);
        let alice = principal("alice");
        let bob = principal("bob");
        let alice_session = registry.admit(&alice).await?;
        let bob_session = registry.admit(&bob).await?;

        let err = registry
            .admit_replacing(&alice, Some(bob_session.session_id()))
            .await
            .err();
        assert_eq!(err, Some(AuthError::TooManySessions));
        registry.lookup(alice_session.session_id()).await?;
        registry.lookup(bob_session.session_id()).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn relogin_racing_another_browser_never_loses_the_session() -> Result<()> {
        let alice = principal("alice");
        for _ in 0..200 {
            let registry = Arc::new(registry(1, true));
            let held = registry.admit(&alice).await?;

            let same_browser = {
                let registry = registry.clone();
                let alice = alice.clone();
                let held = held.session_id().to_string();
                tokio::spawn(async move { registry.admit_replacing(&alice, Some(&held)).await })
            };
            let other_browser = {
                let registry = registry.clone();
                let alice = alice.clone();
                tokio::spawn(async move { registry.admit_replacing(&alice, None).await })
            };

            let relogin = same_browser.await?;
            let _ = other_browser.await?;

            let active = registry.active_sessions(alice.id).await;
            assert_eq!(active.len(), 1);
            match relogin {
                Ok(record) => assert_eq!(active[0].session_id(), record.session_id()),
                Err(err) => {
                    assert_eq!(err, AuthError::TooManySessions);
                    registry.lookup(held.session_id()).await?;
                }
            }
        }
        Ok(())
    }
}
