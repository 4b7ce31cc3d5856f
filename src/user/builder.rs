//! Typed builder for User.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::user::{Profile, User};

/// Failed attempts allowed before the account locks itself.
pub const DEFAULT_ACCESS_FAILED_LIMIT: i32 = 10;

/// [`User`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Email, Password> {
    name: String,
    email: Email,
    password: Password,
    access_failed_limit: i32,
    roles: Vec<String>,
    claims: Vec<String>,
    profile: Option<Profile>,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

/// Freshly built user, not stored yet.
#[derive(Clone)]
pub struct NewUser {
    /// Record with every default applied. `password` is empty.
    pub user: User,
    /// Plaintext password, hashed by the store on insert.
    pub password: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("user", &self.user)
            .field("password", &"[redacted]")
            .finish()
    }
}

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            name: String::default(),
            email: Missing,
            password: Missing,
            access_failed_limit: DEFAULT_ACCESS_FAILED_LIMIT,
            roles: Vec::new(),
            claims: Vec::new(),
            profile: None,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Password> UserBuilder<Missing, Password> {
    /// Update `email` field on [`UserBuilder`].
    pub fn email(
        self,
        email: impl Into<String>,
    ) -> UserBuilder<Present<String>, Password> {
        UserBuilder {
            name: self.name,
            email: Present(email.into()),
            password: self.password,
            access_failed_limit: self.access_failed_limit,
            roles: self.roles,
            claims: self.claims,
            profile: self.profile,
        }
    }
}

impl<Email> UserBuilder<Email, Missing> {
    /// Update `password` field on [`UserBuilder`].
    pub fn password(
        self,
        password: impl Into<String>,
    ) -> UserBuilder<Email, Present<String>> {
        UserBuilder {
            name: self.name,
            email: self.email,
            password: Present(password.into()),
            access_failed_limit: self.access_failed_limit,
            roles: self.roles,
            claims: self.claims,
            profile: self.profile,
        }
    }
}

impl<Email, Password> UserBuilder<Email, Password> {
    /// Update `name` field on [`UserBuilder`].
    pub fn name(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }

    /// Update `access_failed_limit` field on [`UserBuilder`].
    ///
    /// Values below 1 fall back to [`DEFAULT_ACCESS_FAILED_LIMIT`].
    pub fn access_failed_limit(mut self, limit: i32) -> Self {
        self.access_failed_limit = if limit > 0 {
            limit
        } else {
            DEFAULT_ACCESS_FAILED_LIMIT
        };
        self
    }

    /// Add a role on [`UserBuilder`].
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Update `profile` field on [`UserBuilder`].
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Add a directly granted claim on [`UserBuilder`].
    pub fn claim(mut self, claim: impl Into<String>) -> Self {
        self.claims.push(claim.into());
        self
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Build a [`NewUser`] unlocked at `now`, with a fresh ID and no
    /// outstanding token.
    pub fn build(self, now: DateTime<Utc>) -> NewUser {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            email: self.email.0,
            password: String::default(),
            email_confirmed: false,
            access_failed_count: 0,
            access_failed_limit: self.access_failed_limit,
            lockout_until: now,
            lockout_reason: None,
            reset_password_token: None,
            reset_password_token_expiration: None,
            email_confirmation_token: None,
            email_confirmation_token_expiration: None,
            roles: self.roles,
            claims: self.claims,
            profile: self.profile,
            created_at: now,
        };

        NewUser {
            user,
            password: self.password.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let now = Utc::now();
        let new_user = UserBuilder::new()
            .email("joao@treino.app")
            .password("Sup3rS3cret")
            .name("João")
            .role("Student")
            .build(now);

        let user = new_user.user;
        assert_eq!(user.access_failed_count, 0);
        assert_eq!(user.access_failed_limit, DEFAULT_ACCESS_FAILED_LIMIT);
        assert_eq!(user.lockout_until, now);
        assert_eq!(user.created_at, now);
        assert!(!user.email_confirmed);
        assert!(user.password.is_empty());
        assert_eq!(user.roles, vec!["Student".to_string()]);
        assert!(Uuid::parse_str(&user.id).is_ok());
        assert_eq!(new_user.password, "Sup3rS3cret");
    }

    #[test]
    fn test_limit_must_be_positive() {
        let new_user = UserBuilder::new()
            .email("joao@treino.app")
            .password("Sup3rS3cret")
            .access_failed_limit(0)
            .build(Utc::now());
        assert_eq!(
            new_user.user.access_failed_limit,
            DEFAULT_ACCESS_FAILED_LIMIT
        );

        let new_user = UserBuilder::new()
            .password("Sup3rS3cret")
            .email("joao@treino.app")
            .access_failed_limit(3)
            .build(Utc::now());
        assert_eq!(new_user.user.access_failed_limit, 3);
    }

    #[test]
    fn test_debug_hides_password() {
        let new_user = UserBuilder::new()
            .email("joao@treino.app")
            .password("Sup3rS3cret")
            .build(Utc::now());
        assert!(!format!("{new_user:?}").contains("Sup3rS3cret"));
    }
}
