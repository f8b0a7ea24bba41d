//! PasswordHasher trait for credential checks.
//!
//! Defined in tutorlab-core so the auth service can verify passwords without
//! coupling to a specific hashing algorithm. The `Sha256PasswordHasher`
//! adapter lives in tutorlab-infra.

/// Abstraction over password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given password.
    fn compute_hash(&self, password: &str) -> String;

    /// Check `password` against a hash produced by [`compute_hash`](Self::compute_hash).
    fn verify(&self, password: &str, hash: &str) -> bool {
        self.compute_hash(password).eq_ignore_ascii_case(hash)
    }
}
