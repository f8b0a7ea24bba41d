//! UserRepository trait definition.

use tutorlab_types::error::StoreError;
use tutorlab_types::user::{NewUser, User, UserCredentials, UserId};

/// Repository trait for participant persistence.
///
/// Participants are created at seed time and never deleted; only the quota
/// columns change afterwards.
pub trait UserRepository: Send + Sync {
    fn get_user(
        &self,
        id: UserId,
    ) -> impl std::future::Future<Output = Result<Option<User>, StoreError>> + Send;

    fn find_by_student_id(
        &self,
        student_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Look up a participant with their password hash for login.
    fn find_credentials(
        &self,
        student_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserCredentials>, StoreError>> + Send;

    /// Insert the participant unless the student id already exists.
    ///
    /// Existing rows are left untouched so admin quota edits survive re-seeding.
    /// Returns the stored row and whether it was newly inserted.
    fn seed_user(
        &self,
        user: &NewUser,
        password_hash: Option<String>,
    ) -> impl std::future::Future<Output = Result<(User, bool), StoreError>> + Send;

    /// Replace both quota columns. `NotFound` if the student id is unknown.
    fn update_quota(
        &self,
        student_id: &str,
        max_turns: Option<u32>,
        target_turns: Option<u32>,
    ) -> impl std::future::Future<Output = Result<User, StoreError>> + Send;

    /// All participants, ordered by student id.
    fn list_users(&self) -> impl std::future::Future<Output = Result<Vec<User>, StoreError>> + Send;
}
