//! Persistence ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::user::{NewUser, Role, User, UserUpdate};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached. The only kind worth retrying.
    #[error("store is unavailable: {0}")]
    Unavailable(Box<dyn std::error::Error + Send + Sync>),
    /// A unique constraint rejected the write.
    #[error("unique constraint `{0}` violated")]
    Conflict(String),
    /// Targeted record does not exist.
    #[error("record not found")]
    NotFound,
    #[error("store failed: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

/// Port for user security records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by exact e-mail.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user by ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Find the user owning a password reset token.
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>>;

    /// Find the user owning an account activation token.
    async fn find_by_activation_token(
        &self,
        token: &str,
    ) -> Result<Option<User>>;

    /// Insert a new user. The plaintext password is hashed by the store.
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Apply a partial update and return the stored record.
    ///
    /// A password carried by the update is hashed before being written.
    async fn update(&self, id: &str, update: UserUpdate) -> Result<User>;

    /// Count one failed login in a single atomic write.
    ///
    /// The counter becomes `min(count + 1, limit)`. When it reaches the
    /// limit, `lockout_until` is set to the given instant and the reason to
    /// `ACCESS_FAILED` within the same write.
    async fn record_access_failure(
        &self,
        id: &str,
        lockout_until: DateTime<Utc>,
    ) -> Result<User>;
}

/// Port for role definitions.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch every role whose name is listed. Unknown names are ignored.
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Role>>;
}
