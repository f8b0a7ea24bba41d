//! SHA-256 password hashing.
//!
//! Implements the `PasswordHasher` trait from `tutorlab-core` using the
//! `sha2` crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use tutorlab_core::service::hash::PasswordHasher;

/// SHA-256 implementation of `PasswordHasher`.
///
/// Produces lowercase hex digests, matching the `password_hash` column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn compute_hash(&self, password: &str) -> String {
        let digest = Sha256::digest(password.as_bytes());
        format!("{:x}", digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash_known_value() {
        let hasher = Sha256PasswordHasher::new();
        // SHA-256 of empty string
        assert_eq!(
            hasher.compute_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_accepts_uppercase_stored_hash() {
        let hasher = Sha256PasswordHasher::new();
        let stored = hasher.compute_hash("2024001").to_uppercase();
        assert!(hasher.verify("2024001", &stored));
        assert!(!hasher.verify("2024002", &stored));
    }
}
