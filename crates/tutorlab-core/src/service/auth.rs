//! Login and participant seeding.

use tracing::{info, warn};
use tutorlab_types::error::{AuthError, StoreError};
use tutorlab_types::user::{NewUser, Principal};

use crate::repository::UserRepository;
use crate::service::hash::PasswordHasher;

/// The single operator account, configured rather than stored.
#[derive(Debug, Clone)]
struct AdminAccount {
    username: String,
    password_hash: String,
}

/// Outcome of seeding a batch of participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub existing: usize,
}

/// Verifies credentials and seeds participants.
///
/// A participant without a stored hash logs in with their student id as the
/// password. The admin account only exists when a password was configured.
pub struct AuthService<U: UserRepository, H: PasswordHasher> {
    users: U,
    hasher: H,
    admin: Option<AdminAccount>,
}

impl<U: UserRepository, H: PasswordHasher> AuthService<U, H> {
    pub fn new(users: U, hasher: H) -> Self {
        Self {
            users,
            hasher,
            admin: None,
        }
    }

    /// Enable the admin account. Only the hash of `password` is kept.
    pub fn with_admin(mut self, username: impl Into<String>, password: &str) -> Self {
        self.admin = Some(AdminAccount {
            username: username.into(),
            password_hash: self.hasher.compute_hash(password),
        });
        self
    }

    pub fn admin_enabled(&self) -> bool {
        self.admin.is_some()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let username = username.trim();

        if let Some(admin) = &self.admin {
            if username == admin.username {
                if self.hasher.verify(password, &admin.password_hash) {
                    info!(username, "admin logged in");
                    return Ok(Principal::Admin {
                        username: admin.username.clone(),
                    });
                }
                warn!(username, "admin login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let Some(credentials) = self.users.find_credentials(username).await? else {
            info!(username, "login for unknown student");
            return Err(AuthError::InvalidCredentials);
        };

        let accepted = match &credentials.password_hash {
            Some(hash) => self.hasher.verify(password, hash),
            None => password == credentials.user.student_id,
        };
        if !accepted {
            info!(username, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %credentials.user.id, group = %credentials.user.group, "student logged in");
        Ok(Principal::Student {
            user: credentials.user,
        })
    }

    /// Insert participants that do not exist yet. Existing rows are left untouched.
    pub async fn seed_users(&self, users: &[NewUser]) -> Result<SeedSummary, StoreError> {
        let mut summary = SeedSummary::default();
        for new in users {
            let new = new.clone().with_group_defaults();
            let hash = new.password.as_deref().map(|p| self.hasher.compute_hash(p));
            let (user, inserted) = self.users.seed_user(&new, hash).await?;
            if inserted {
                info!(student_id = %user.student_id, group = %user.group, "participant seeded");
                summary.inserted += 1;
            } else {
                summary.existing += 1;
            }
        }
        Ok(summary)
    }
}
