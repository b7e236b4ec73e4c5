//! Short-lived, single-use challenge codes.
//!
//! Image codes are keyed by the browser session id, SMS codes by the mobile
//! number. Both kinds live in one map under `(kind, key)`, guarded by a single
//! mutex so that expiry checks, matching and deletion happen in one critical
//! section. Two concurrent submissions of the same code can never both pass.

use anyhow::Result;
use rand::Rng;
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{captcha, error::ChallengeError, sms::SmsSender};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Image,
    Sms,
}

/// Length and lifetime of the codes of one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodePolicy {
    length: usize,
    ttl: Duration,
}

impl CodePolicy {
    /// Codes are at least one digit long.
    #[must_use]
    pub fn new(length: usize, ttl: Duration) -> Self {
        Self {
            length: length.max(1),
            ttl,
        }
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[derive(Clone, Debug)]
pub struct ChallengeCode {
    id: Uuid,
    kind: CodeKind,
    value: String,
    created_at: Instant,
    expires_at: Instant,
    consumed: bool,
}

impl ChallengeCode {
    fn new(kind: CodeKind, value: String, ttl: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            value,
            created_at,
            expires_at: created_at + ttl,
            consumed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> CodeKind {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    fn matches(&self, submitted: &str) -> bool {
        self.value.eq_ignore_ascii_case(submitted)
    }
}

/// An image code together with its rendered JPEG.
#[derive(Clone, Debug)]
pub struct IssuedImage {
    pub code: ChallengeCode,
    pub image: Vec<u8>,
}

pub struct ChallengeStore {
    image: CodePolicy,
    sms: CodePolicy,
    sender: Arc<dyn SmsSender>,
    codes: Mutex<HashMap<(CodeKind, String), ChallengeCode>>,
}

impl ChallengeStore {
    pub fn new(image: CodePolicy, sms: CodePolicy, sender: Arc<dyn SmsSender>) -> Self {
        Self {
            image,
            sms,
            sender,
            codes: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn image_policy(&self) -> CodePolicy {
        self.image
    }

    #[must_use]
    pub fn sms_policy(&self) -> CodePolicy {
        self.sms
    }

    /// Issue an image code for `key`, replacing any code already stored there.
    ///
    /// # Errors
    /// Returns an error if the image cannot be rendered; nothing is stored then.
    #[instrument(skip_all)]
    pub async fn issue_image_code(&self, key: &str) -> Result<IssuedImage> {
        let code = ChallengeCode::new(
            CodeKind::Image,
            generate_numeric_code(self.image.length),
            self.image.ttl,
        );
        let image = captcha::render(code.value())?;
        self.store(key, code.clone()).await;
        debug!(code_id = %code.id(), "issued image code");
        Ok(IssuedImage { code, image })
    }

    /// Issue an SMS code for `mobile` and hand it to the sender.
    ///
    /// A delivery failure is logged and leaves the stored code in place.
    #[instrument(skip_all)]
    pub async fn issue_sms_code(&self, mobile: &str) -> ChallengeCode {
        let code = ChallengeCode::new(
            CodeKind::Sms,
            generate_numeric_code(self.sms.length),
            self.sms.ttl,
        );
        self.store(mobile, code.clone()).await;

        // The map lock is already released here.
        if let Err(err) = self.sender.send(mobile, code.value(), self.sms.ttl).await {
            warn!(code_id = %code.id(), "Failed to deliver SMS code: {err}");
        }
        debug!(code_id = %code.id(), "issued sms code");
        code
    }

    /// Check `submitted` against the code stored for `key` and consume it.
    ///
    /// Checks run in this order: expiry (the stale entry is removed), blank
    /// input, missing code, mismatch (the entry is kept). On success the entry
    /// is removed and returned marked as consumed.
    ///
    /// # Errors
    /// Returns the `ChallengeError` describing why the code was rejected.
    #[instrument(skip(self, key, submitted))]
    pub async fn verify_and_consume(
        &self,
        kind: CodeKind,
        key: &str,
        submitted: &str,
    ) -> Result<ChallengeCode, ChallengeError> {
        let mut codes = self.codes.lock().await;
        let Entry::Occupied(entry) = codes.entry((kind, key.to_string())) else {
            return Err(if submitted.trim().is_empty() {
                ChallengeError::Blank
            } else {
                ChallengeError::Missing
            });
        };

        // a stale code fails as expired whatever was submitted
        if entry.get().is_expired_at(Instant::now()) {
            entry.remove();
            return Err(ChallengeError::Expired);
        }

        let submitted = submitted.trim();
        if submitted.is_empty() {
            return Err(ChallengeError::Blank);
        }

        if !entry.get().matches(submitted) {
            return Err(ChallengeError::Mismatch);
        }

        let mut code = entry.remove();
        code.consumed = true;
        Ok(code)
    }

    /// Drop every expired code. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, code| !code.is_expired_at(now));
        before - codes.len()
    }

    /// Number of codes currently stored, expired ones included.
    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn store(&self, key: &str, code: ChallengeCode) {
        let mut codes = self.codes.lock().await;
        codes.insert((code.kind(), key.to_string()), code);
    }

    #[cfg(test)]
    pub(crate) async fn insert_for_test(&self, key: &str, kind: CodeKind, value: &str) {
        let ttl = match kind {
            CodeKind::Image => self.image.ttl,
            CodeKind::Sms => self.sms.ttl,
        };
        self.store(key, ChallengeCode::new(kind, value.to_string(), ttl))
            .await;
    }
}

fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
