//! Password reset token lifecycle.

use chrono::{DateTime, Utc};

use super::{
    AccountError, AccountSecurity, Result, TokenOwner, TokenReceipt,
    ensure_active,
};
use crate::mail::Template;
use crate::user::{LockoutReason, User, UserUpdate};

const RESET_PATH: &str = "/account/password_reset/";
const CHALLENGE_PATH: &str = "/account/password_reset/challenge/";

impl AccountSecurity {
    /// Issue a password reset token and e-mail it.
    ///
    /// Accounts locked by failed attempts may still reset, it is how they
    /// recover. Only a lock carrying an operator reason refuses the request.
    /// Any previous token is replaced.
    pub async fn request_password_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
        sandbox: bool,
    ) -> Result<TokenReceipt> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if user.is_locked(now)
            && matches!(user.lockout_reason, Some(reason) if reason != LockoutReason::AccessFailed)
        {
            return Err(AccountError::AccountLockedOut {
                until: user.lockout_until,
                reason: user.lockout_reason,
            });
        }

        let token = self.issuer.generate();
        let expires_at = now + self.settings.reset_password_expiration;
        self.users
            .update(
                &user.id,
                UserUpdate::default().reset_password_token(&token, expires_at),
            )
            .await?;
        tracing::info!(user_id = %user.id, %expires_at, "password reset token issued");

        let link = self.link(RESET_PATH, &token);
        self.dispatch(Template::PasswordReset, &user, &link, sandbox)
            .await?;

        Ok(TokenReceipt { expires_at })
    }

    /// Tell who owns a still usable reset token.
    pub async fn check_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenOwner> {
        let user = self.reset_token_owner(token, now).await?;
        Ok(TokenOwner::from(&user))
    }

    /// Set a new password and burn the token.
    ///
    /// A lock caused by failed attempts is lifted in the same write.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
        sandbox: bool,
    ) -> Result<()> {
        let user = self.reset_token_owner(token, now).await?;

        let mut update = UserUpdate::default()
            .password(new_password)
            .reset_password_token_expiration(now);
        if user.lockout_reason == Some(LockoutReason::AccessFailed) {
            update = update.access_failed_count(0).lockout(now, None);
        }
        self.users.update(&user.id, update).await?;
        tracing::info!(user_id = %user.id, "password reset");

        let link = self.link(CHALLENGE_PATH, token);
        self.dispatch_detached(Template::PasswordChanged, &user, &link, sandbox);

        Ok(())
    }

    async fn reset_token_owner(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self
            .users
            .find_by_reset_token(token)
            .await?
            .ok_or(AccountError::TokenNotFound)?;
        ensure_active(user.reset_password_token_expiration, now)?;

        Ok(user)
    }
}
