//! Handle database requests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::ports::{
    PasswordHasher, Result, RoleStore, StoreError, UserStore,
};
use crate::user::{LockoutReason, NewUser, Profile, Role, User, UserUpdate};

const USER_COLUMNS: &str = r#"id, name, email, password, email_confirmed,
    access_failed_count, access_failed_limit, lockout_until, lockout_reason,
    reset_password_token, reset_password_token_expiration,
    email_confirmation_token, email_confirmation_token_expiration,
    roles, claims, profile, created_at"#;

/// Row of the `users` table.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password: String,
    email_confirmed: bool,
    access_failed_count: i32,
    access_failed_limit: i32,
    lockout_until: DateTime<Utc>,
    lockout_reason: Option<String>,
    reset_password_token: Option<String>,
    reset_password_token_expiration: Option<DateTime<Utc>>,
    email_confirmation_token: Option<String>,
    email_confirmation_token_expiration: Option<DateTime<Utc>>,
    roles: Vec<String>,
    claims: Vec<String>,
    profile: Option<Json<Profile>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self> {
        let lockout_reason = row
            .lockout_reason
            .as_deref()
            .map(str::parse::<LockoutReason>)
            .transpose()
            .map_err(|err| StoreError::Internal(Box::new(err)))?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password: row.password,
            email_confirmed: row.email_confirmed,
            access_failed_count: row.access_failed_count,
            access_failed_limit: row.access_failed_limit,
            lockout_until: row.lockout_until,
            lockout_reason,
            reset_password_token: row.reset_password_token,
            reset_password_token_expiration: row
                .reset_password_token_expiration,
            email_confirmation_token: row.email_confirmation_token,
            email_confirmation_token_expiration: row
                .email_confirmation_token_expiration,
            roles: row.roles,
            claims: row.claims,
            profile: row.profile.map(|Json(profile)| profile),
            created_at: row.created_at,
        })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(
                    db.constraint().unwrap_or("unknown").to_owned(),
                )
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(Box::new(err)),
            _ => StoreError::Internal(Box::new(err)),
        }
    }
}

/// Users and roles persisted on PostgreSQL.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
    hasher: Arc<dyn PasswordHasher>,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { pool, hasher }
    }

    async fn find_by(&self, field: Field, value: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {field} = $1");

        sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    fn hash(&self, password: &str) -> Result<String> {
        self.hasher
            .hash(password)
            .map_err(|err| StoreError::Internal(Box::new(err)))
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by(Field::Email, email).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.find_by(Field::Id, id).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>> {
        self.find_by(Field::ResetToken, token).await
    }

    async fn find_by_activation_token(
        &self,
        token: &str,
    ) -> Result<Option<User>> {
        self.find_by(Field::ActivationToken, token).await
    }

    async fn insert(&self, new_user: NewUser) -> Result<User> {
        let NewUser { user, password } = new_user;
        let password = self.hash(&password)?;

        let query = format!(
            r#"INSERT INTO users (id, name, email, password, email_confirmed,
                access_failed_count, access_failed_limit, lockout_until,
                lockout_reason, roles, claims, profile, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}"#
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(password)
            .bind(user.email_confirmed)
            .bind(user.access_failed_count)
            .bind(user.access_failed_limit)
            .bind(user.lockout_until)
            .bind(user.lockout_reason.map(|reason| reason.as_str()))
            .bind(&user.roles)
            .bind(&user.claims)
            .bind(user.profile.as_ref().map(Json))
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update(&self, id: &str, update: UserUpdate) -> Result<User> {
        let password =
            update.password.as_deref().map(|p| self.hash(p)).transpose()?;

        let query = format!(
            r#"UPDATE users SET
                password = COALESCE($2, password),
                access_failed_count = COALESCE($3, access_failed_count),
                lockout_until = COALESCE($4, lockout_until),
                lockout_reason = CASE WHEN $5 THEN $6 ELSE lockout_reason END,
                reset_password_token = COALESCE($7, reset_password_token),
                reset_password_token_expiration = COALESCE($8, reset_password_token_expiration),
                email_confirmation_token = COALESCE($9, email_confirmation_token),
                email_confirmation_token_expiration = COALESCE($10, email_confirmation_token_expiration),
                email_confirmed = COALESCE($11, email_confirmed)
            WHERE id = $1
            RETURNING {USER_COLUMNS}"#
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .bind(password)
            .bind(update.access_failed_count)
            .bind(update.lockout_until)
            .bind(update.lockout_reason.is_some())
            .bind(update.lockout_reason.flatten().map(|reason| reason.as_str()))
            .bind(update.reset_password_token)
            .bind(update.reset_password_token_expiration)
            .bind(update.email_confirmation_token)
            .bind(update.email_confirmation_token_expiration)
            .bind(update.email_confirmed)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        row.try_into()
    }

    async fn record_access_failure(
        &self,
        id: &str,
        lockout_until: DateTime<Utc>,
    ) -> Result<User> {
        // Right-hand sides read the row as it was before this statement.
        let query = format!(
            r#"UPDATE users SET
                access_failed_count = LEAST(access_failed_count + 1, access_failed_limit),
                lockout_until = CASE
                    WHEN access_failed_count + 1 >= access_failed_limit THEN $2
                    ELSE lockout_until END,
                lockout_reason = CASE
                    WHEN access_failed_count + 1 >= access_failed_limit THEN $3
                    ELSE lockout_reason END
            WHERE id = $1
            RETURNING {USER_COLUMNS}"#
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .bind(lockout_until)
            .bind(LockoutReason::AccessFailed.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        row.try_into()
    }
}

#[async_trait]
impl RoleStore for PgUserRepository {
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT name, claims FROM roles WHERE name = ANY($1)",
        )
        .bind(names.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Email,
    ResetToken,
    ActivationToken,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
            Field::ResetToken => write!(f, "reset_password_token"),
            Field::ActivationToken => write!(f, "email_confirmation_token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_columns() {
        assert_eq!(Field::Email.to_string(), "email");
        assert_eq!(Field::ResetToken.to_string(), "reset_password_token");
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::ColumnNotFound("id".into())),
            StoreError::Internal(_)
        ));
    }

    #[test]
    fn test_unknown_reason_is_rejected() {
        let now = Utc::now();
        let row = UserRow {
            id: "4c1f".into(),
            name: "Rita".into(),
            email: "rita@treino.app".into(),
            password: String::new(),
            email_confirmed: false,
            access_failed_count: 0,
            access_failed_limit: 10,
            lockout_until: now,
            lockout_reason: Some("FROZEN".into()),
            reset_password_token: None,
            reset_password_token_expiration: None,
            email_confirmation_token: None,
            email_confirmation_token_expiration: None,
            roles: vec![],
            claims: vec![],
            profile: None,
            created_at: now,
        };
        assert!(User::try_from(row).is_err());
    }
}
