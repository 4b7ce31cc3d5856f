mod builder;
mod memory;
mod profile;
mod repository;

pub use builder::*;
pub use memory::*;
pub use profile::*;
pub use repository::*;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an account is locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockoutReason {
    /// Set by the system once the failed login limit is reached.
    AccessFailed,
    /// Temporary operator lock.
    Suspended,
    /// Operator lock, usually permanent.
    Banned,
}

impl LockoutReason {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockoutReason::AccessFailed => "ACCESS_FAILED",
            LockoutReason::Suspended => "SUSPENDED",
            LockoutReason::Banned => "BANNED",
        }
    }

    /// Whether an operator is allowed to set this reason.
    pub fn is_operator(&self) -> bool {
        !matches!(self, LockoutReason::AccessFailed)
    }
}

impl fmt::Display for LockoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored lockout reason is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("unknown lockout reason `{0}`")]
pub struct UnknownReason(pub String);

impl FromStr for LockoutReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCESS_FAILED" => Ok(LockoutReason::AccessFailed),
            "SUSPENDED" => Ok(LockoutReason::Suspended),
            "BANNED" => Ok(LockoutReason::Banned),
            other => Err(UnknownReason(other.to_owned())),
        }
    }
}

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    #[serde(rename = "active")]
    pub email_confirmed: bool,
    #[serde(skip)]
    pub access_failed_count: i32,
    #[serde(skip)]
    pub access_failed_limit: i32,
    pub lockout_until: DateTime<Utc>,
    pub lockout_reason: Option<LockoutReason>,
    #[serde(skip)]
    pub reset_password_token: Option<String>,
    #[serde(skip)]
    pub reset_password_token_expiration: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub email_confirmation_token: Option<String>,
    #[serde(skip)]
    pub email_confirmation_token_expiration: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub claims: Vec<String>,
    /// Personal data given on registration.
    #[serde(flatten)]
    pub profile: Option<Profile>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether login is refused at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        now < self.lockout_until
    }

    /// Apply a partial update in place. `password` must already be hashed.
    pub(crate) fn apply(&mut self, update: UserUpdate) {
        if let Some(password) = update.password {
            self.password = password;
        }
        if let Some(count) = update.access_failed_count {
            self.access_failed_count = count;
        }
        if let Some(until) = update.lockout_until {
            self.lockout_until = until;
        }
        if let Some(reason) = update.lockout_reason {
            self.lockout_reason = reason;
        }
        if let Some(token) = update.reset_password_token {
            self.reset_password_token = Some(token);
        }
        if let Some(expiration) = update.reset_password_token_expiration {
            self.reset_password_token_expiration = Some(expiration);
        }
        if let Some(token) = update.email_confirmation_token {
            self.email_confirmation_token = Some(token);
        }
        if let Some(expiration) = update.email_confirmation_token_expiration {
            self.email_confirmation_token_expiration = Some(expiration);
        }
        if let Some(confirmed) = update.email_confirmed {
            self.email_confirmed = confirmed;
        }
    }
}

/// Named set of claims.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Role {
    pub name: String,
    pub claims: Vec<String>,
}

impl Role {
    /// Create a new [`Role`].
    pub fn new(name: &str, claims: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            claims: claims.iter().map(|c| (*c).to_owned()).collect(),
        }
    }
}

/// Roles seeded on a fresh installation.
pub fn default_roles() -> Vec<Role> {
    vec![
        Role::new(
            "Administrator",
            &[
                "ManagePermissions",
                "ManageStudents",
                "ManageTraining",
                "ManageExercises",
            ],
        ),
        Role::new(
            "Teacher",
            &["ManageStudents", "ManageTraining", "ManageExercises"],
        ),
        Role::new("Student", &[]),
    ]
}

/// Fields to change on a [`User`]. `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserUpdate {
    /// Plaintext password, hashed by the store.
    pub password: Option<String>,
    pub access_failed_count: Option<i32>,
    pub lockout_until: Option<DateTime<Utc>>,
    pub lockout_reason: Option<Option<LockoutReason>>,
    pub reset_password_token: Option<String>,
    pub reset_password_token_expiration: Option<DateTime<Utc>>,
    pub email_confirmation_token: Option<String>,
    pub email_confirmation_token_expiration: Option<DateTime<Utc>>,
    pub email_confirmed: Option<bool>,
}

impl UserUpdate {
    /// Update `password` field.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Update `access_failed_count` field.
    pub fn access_failed_count(mut self, count: i32) -> Self {
        self.access_failed_count = Some(count);
        self
    }

    /// Update `lockout_until` and `lockout_reason` together.
    pub fn lockout(
        mut self,
        until: DateTime<Utc>,
        reason: Option<LockoutReason>,
    ) -> Self {
        self.lockout_until = Some(until);
        self.lockout_reason = Some(reason);
        self
    }

    /// Update the password reset token pair.
    pub fn reset_password_token(
        mut self,
        token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        self.reset_password_token = Some(token.into());
        self.reset_password_token_expiration = Some(expiration);
        self
    }

    /// Update `reset_password_token_expiration` only.
    pub fn reset_password_token_expiration(
        mut self,
        expiration: DateTime<Utc>,
    ) -> Self {
        self.reset_password_token_expiration = Some(expiration);
        self
    }

    /// Update the account activation token pair.
    pub fn email_confirmation_token(
        mut self,
        token: impl Into<String>,
        expiration: DateTime<Utc>,
    ) -> Self {
        self.email_confirmation_token = Some(token.into());
        self.email_confirmation_token_expiration = Some(expiration);
        self
    }

    /// Update `email_confirmation_token_expiration` only.
    pub fn email_confirmation_token_expiration(
        mut self,
        expiration: DateTime<Utc>,
    ) -> Self {
        self.email_confirmation_token_expiration = Some(expiration);
        self
    }

    /// Update `email_confirmed` field.
    pub fn email_confirmed(mut self, confirmed: bool) -> Self {
        self.email_confirmed = Some(confirmed);
        self
    }
}
