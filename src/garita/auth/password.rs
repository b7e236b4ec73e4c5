//! Pluggable one-way password hashing.

use sha2::{Digest, Sha256};

pub trait PasswordHasher: Send + Sync {
    /// Hash the supplied credentials into the stored representation.
    fn hash(&self, username: &str, password: &str) -> String;

    /// Compare supplied credentials against a stored hash in constant time.
    fn verify(&self, username: &str, password: &str, stored_hash: &str) -> bool {
        let candidate = self.hash(username, password);
        constant_time_eq(candidate.as_bytes(), stored_hash.as_bytes())
    }
}

/// Hex encoded SHA-256 of `username + password`.
///
/// The username acts as a per-account salt so identical passwords do not share
/// a hash across accounts.
#[derive(Clone, Debug, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, username: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Constant-time byte comparison; only the length difference leaks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hash_is_hex_of_username_and_password() {
        let hasher = Sha256PasswordHasher;
        let hash = hasher.hash("mrbird", "123456");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hasher.hash("mrbird", "123456"));
        assert_ne!(hash, hasher.hash("other", "123456"));
    }

    #[test]
    fn verify_accepts_matching_and_rejects_others() {
        let hasher = Sha256PasswordHasher;
        let stored = hasher.hash("alice", "wonderland");
        assert!(hasher.verify("alice", "wonderland", &stored));
        assert!(!hasher.verify("alice", "Wonderland", &stored));
        assert!(!hasher.verify("alice", "wonderland", ""));
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
