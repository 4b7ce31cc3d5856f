//! Login with progressive lockout.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use super::{AccountError, AccountSecurity, Result};
use crate::user::{User, UserUpdate};

/// Reaching the failed attempt limit locks the account this far ahead.
/// Only an operator unlock or a password reset lifts it.
pub const PERMANENT_LOCKOUT_YEARS: u32 = 200;

/// Lockout instant used for locks without an end.
pub fn permanent_lockout(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_months(Months::new(PERMANENT_LOCKOUT_YEARS * 12))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Successful login.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub name: String,
    pub email: String,
    /// Whether the e-mail address is confirmed.
    pub active: bool,
    pub auth_token: String,
}

impl AccountSecurity {
    /// Check credentials and issue a session token.
    ///
    /// A locked account is refused before the password is looked at. A
    /// wrong password counts one failed attempt.
    pub async fn attempt_login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoggedIn> {
        let Some(user) = self.users.find_by_email(email).await? else {
            tracing::warn!(%email, "login attempt for unknown e-mail");
            metrics::counter!("account_login_total", "outcome" => "unknown_user").increment(1);
            return Err(AccountError::UserNotFound);
        };

        if user.is_locked(now) {
            tracing::warn!(user_id = %user.id, until = %user.lockout_until, "login refused, account locked");
            metrics::counter!("account_login_total", "outcome" => "locked").increment(1);
            return Err(AccountError::AccountLockedOut {
                until: user.lockout_until,
                reason: user.lockout_reason,
            });
        }

        if !self.hasher.verify(password, &user.password) {
            metrics::counter!("account_login_total", "outcome" => "wrong_password").increment(1);
            return Err(self.record_failed_attempt(&user, now).await);
        }

        if user.access_failed_count != 0 {
            self.users
                .update(&user.id, UserUpdate::default().access_failed_count(0))
                .await?;
        }

        let auth_token = self.sessions.issue(&user.id)?;
        metrics::counter!("account_login_total", "outcome" => "success").increment(1);
        tracing::debug!(user_id = %user.id, "user logged in");

        Ok(LoggedIn {
            name: user.name,
            email: user.email,
            active: user.email_confirmed,
            auth_token,
        })
    }

    /// Count a failed attempt and return the failure to report.
    async fn record_failed_attempt(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> AccountError {
        let updated = match self
            .users
            .record_access_failure(&user.id, permanent_lockout(now))
            .await
        {
            Ok(updated) => updated,
            Err(err) => return err.into(),
        };

        if updated.access_failed_count >= updated.access_failed_limit {
            tracing::warn!(user_id = %user.id, until = %updated.lockout_until, "failed attempt limit reached, account locked");
            metrics::counter!("account_lockouts_total").increment(1);
            AccountError::AccessFailedLimitReached {
                until: updated.lockout_until,
                reason: updated.lockout_reason,
            }
        } else {
            tracing::warn!(
                user_id = %user.id,
                count = updated.access_failed_count,
                limit = updated.access_failed_limit,
                "wrong password"
            );
            AccountError::WrongPassword
        }
    }
}
