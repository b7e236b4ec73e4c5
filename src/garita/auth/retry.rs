//! Bounded retry for directory lookups.

use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use super::error::AuthError;

pub const LOOKUP_ATTEMPTS: u32 = 3;
const LOOKUP_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Run `lookup` up to [`LOOKUP_ATTEMPTS`] times with exponential backoff.
///
/// # Errors
/// Returns `AuthError::Infrastructure` once every attempt has failed.
pub async fn lookup_with_retry<T, F, Fut>(what: &str, mut lookup: F) -> Result<T, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut last_error = String::new();
    for attempt in 1..=LOOKUP_ATTEMPTS {
        if attempt > 1 {
            let backoff = LOOKUP_BACKOFF_BASE * 2u32.pow(attempt - 2);
            warn!(attempt, "Backing off for {} ms", backoff.as_millis());
            sleep(backoff).await;
        }

        match lookup().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("{what} lookup failed: {err:#}");
                last_error = format!("{err:#}");
            }
        }
    }

    error!("{what} lookup failed after {LOOKUP_ATTEMPTS} attempts: {last_error}");
    Err(AuthError::Infrastructure(format!("{what} lookup failed")))
}
