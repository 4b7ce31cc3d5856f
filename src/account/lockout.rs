//! Operator lock and unlock.

use chrono::{DateTime, Utc};

use super::{AccountError, AccountSecurity, Result, permanent_lockout};
use crate::ports::StoreError;
use crate::user::{LockoutReason, User, UserUpdate};

impl AccountSecurity {
    /// Lock an account on behalf of an operator. Without `until` the lock
    /// is permanent.
    pub async fn lock_account(
        &self,
        user_id: &str,
        reason: LockoutReason,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        if !reason.is_operator() {
            return Err(AccountError::InvalidLockout(
                "reason is reserved to failed logins",
            ));
        }

        let until = until.unwrap_or_else(|| permanent_lockout(now));
        if until <= now {
            return Err(AccountError::InvalidLockout("end must be in the future"));
        }

        let user = self
            .users
            .update(user_id, UserUpdate::default().lockout(until, Some(reason)))
            .await
            .map_err(operator_target)?;
        tracing::warn!(%user_id, %reason, %until, "account locked by operator");

        Ok(user)
    }

    /// Lift any lock and forget failed attempts.
    pub async fn unlock_account(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self
            .users
            .update(
                user_id,
                UserUpdate::default().access_failed_count(0).lockout(now, None),
            )
            .await
            .map_err(operator_target)?;
        tracing::info!(%user_id, "account unlocked by operator");

        Ok(user)
    }
}

fn operator_target(err: StoreError) -> AccountError {
    match err {
        StoreError::NotFound => AccountError::ResourceNotFound,
        err => err.into(),
    }
}
