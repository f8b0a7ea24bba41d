//! Process-wide bearer token map.
//!
//! Tokens are opaque random strings handed out at login. Only their SHA-256
//! digest is used as the map key, so a heap dump does not reveal live
//! tokens. The map lives in memory: a restart logs everybody out.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tutorlab_types::user::Principal;
use uuid::Uuid;

struct TokenEntry {
    principal: Principal,
    issued_at: DateTime<Utc>,
}

/// Issued tokens and the principal each one speaks for.
pub struct TokenStore {
    entries: DashMap<String, TokenEntry>,
}

impl TokenStore {
    /// Create an empty store. Called once at startup.
    pub fn init() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Issue a fresh token for `principal`. The plaintext is returned once.
    pub fn issue(&self, principal: Principal) -> String {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        tracing::debug!(username = principal.username(), "token issued");
        self.entries.insert(
            hash_token(&token),
            TokenEntry {
                principal,
                issued_at: Utc::now(),
            },
        );
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Principal> {
        self.entries
            .get(&hash_token(token))
            .map(|entry| entry.principal.clone())
    }

    /// When `token` was issued, if it is live.
    pub fn issued_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.entries.get(&hash_token(token)).map(|entry| entry.issued_at)
    }

    /// Forget `token`. Returns whether it was live.
    pub fn revoke(&self, token: &str) -> bool {
        self.entries.remove(&hash_token(token)).is_some()
    }

    /// Drop every token. Returns how many were live.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of a token (lowercase hex).
fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}
