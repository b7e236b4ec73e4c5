//! Authority checks for routes that need more than a live session.

use tracing::debug;

use super::error::AuthError;
use super::provider::Principal;

/// Authority granted to operators of the gateway.
pub const ADMIN_AUTHORITY: &str = "admin";

impl Principal {
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// # Errors
/// Returns `AccessDenied` when `principal` lacks `authority`.
pub fn require_authority(principal: &Principal, authority: &str) -> Result<(), AuthError> {
    if principal.has_authority(authority) {
        Ok(())
    } else {
        debug!(username = %principal.username, authority, "access denied");
        Err(AuthError::AccessDenied(authority.to_string()))
    }
}
