//! Account activation token lifecycle.

use chrono::{DateTime, Utc};

use super::{
    AccountError, AccountSecurity, Result, TokenOwner, TokenReceipt,
    ensure_active,
};
use crate::mail::Template;
use crate::user::{User, UserUpdate};

const ACTIVATION_PATH: &str = "/account/activation/";
const LOGIN_LINK: &str = "/auth/login";

impl AccountSecurity {
    /// Issue an activation token and e-mail it. Any lock refuses the
    /// request.
    pub async fn request_account_activation(
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

        if user.is_locked(now) && user.lockout_reason.is_some() {
            return Err(AccountError::AccountLockedOut {
                until: user.lockout_until,
                reason: user.lockout_reason,
            });
        }

        let token = self.issuer.generate();
        let expires_at = now + self.settings.account_activation_expiration;
        self.users
            .update(
                &user.id,
                UserUpdate::default().email_confirmation_token(&token, expires_at),
            )
            .await?;
        tracing::info!(user_id = %user.id, %expires_at, "activation token issued");

        let link = self.link(ACTIVATION_PATH, &token);
        self.dispatch(Template::AccountActivation, &user, &link, sandbox)
            .await?;

        Ok(TokenReceipt { expires_at })
    }

    /// Tell who owns a still usable activation token.
    pub async fn check_activation_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenOwner> {
        let user = self.activation_token_owner(token, now).await?;
        Ok(TokenOwner::from(&user))
    }

    /// Confirm the e-mail address and burn the token.
    pub async fn activate_account(
        &self,
        token: &str,
        now: DateTime<Utc>,
        sandbox: bool,
    ) -> Result<TokenOwner> {
        let user = self.activation_token_owner(token, now).await?;

        self.users
            .update(
                &user.id,
                UserUpdate::default()
                    .email_confirmed(true)
                    .email_confirmation_token_expiration(now),
            )
            .await?;
        tracing::info!(user_id = %user.id, "account activated");

        let link = format!("{}{LOGIN_LINK}", self.settings.frontend_url);
        self.dispatch_detached(Template::Welcome, &user, &link, sandbox);

        Ok(TokenOwner::from(&user))
    }

    async fn activation_token_owner(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let user = self
            .users
            .find_by_activation_token(token)
            .await?
            .ok_or(AccountError::TokenNotFound)?;
        ensure_active(user.email_confirmation_token_expiration, now)?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::ports::UserStore;
    use crate::testing::Fixture;
    use crate::user::LockoutReason;

    #[tokio::test]
    async fn test_activation_round_trip() {
        let fixture = Fixture::new();
        let user = fixture.user("duda@treino.app", "Sup3rS3cret").await;
        let now = Utc::now();

        let receipt = fixture
            .account
            .request_account_activation("duda@treino.app", now, false)
            .await
            .unwrap();
        assert_eq!(receipt.expires_at, now + Duration::minutes(120));

        let token = fixture
            .stored(&user.id)
            .await
            .email_confirmation_token
            .unwrap();
        let sent = fixture.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains(&format!("/account/activation/{token}")));

        let owner = fixture.account.check_activation_token(&token, now).await.unwrap();
        assert_eq!(owner.name, user.name);

        fixture
            .account
            .activate_account(&token, now, true)
            .await
            .unwrap();

        let stored = fixture.stored(&user.id).await;
        assert!(stored.email_confirmed);
        assert_eq!(stored.email_confirmation_token_expiration, Some(now));

        let logged = fixture
            .account
            .attempt_login("duda@treino.app", "Sup3rS3cret", now)
            .await
            .unwrap();
        assert!(logged.active);
    }

    #[tokio::test]
    async fn test_activation_twice() {
        let fixture = Fixture::new();
        let user = fixture.user("duda@treino.app", "Sup3rS3cret").await;
        let now = Utc::now();
        fixture
            .account
            .request_account_activation("duda@treino.app", now, true)
            .await
            .unwrap();
        let token = fixture
            .stored(&user.id)
            .await
            .email_confirmation_token
            .unwrap();

        fixture.account.activate_account(&token, now, true).await.unwrap();
        let again = fixture.account.activate_account(&token, now, true).await;

        assert!(matches!(again, Err(AccountError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_unknown_and_expired_tokens() {
        let fixture = Fixture::new();
        let user = fixture.user("duda@treino.app", "Sup3rS3cret").await;
        let now = Utc::now();
        let receipt = fixture
            .account
            .request_account_activation("duda@treino.app", now, true)
            .await
            .unwrap();
        let token = fixture
            .stored(&user.id)
            .await
            .email_confirmation_token
            .unwrap();

        assert!(matches!(
            fixture.account.activate_account("feedface", now, true).await,
            Err(AccountError::TokenNotFound)
        ));
        assert!(matches!(
            fixture
                .account
                .activate_account(&token, receipt.expires_at + Duration::seconds(1), true)
                .await,
            Err(AccountError::TokenExpired)
        ));
        assert!(!fixture.stored(&user.id).await.email_confirmed);
    }

    #[tokio::test]
    async fn test_any_lock_refuses_request() {
        let fixture = Fixture::new();
        let user = fixture.user("duda@treino.app", "Sup3rS3cret").await;
        let now = Utc::now();
        fixture
            .store
            .update(
                &user.id,
                UserUpdate::default().lockout(
                    now + Duration::days(1),
                    Some(LockoutReason::AccessFailed),
                ),
            )
            .await
            .unwrap();

        let result = fixture
            .account
            .request_account_activation("duda@treino.app", now, true)
            .await;
        assert!(matches!(result, Err(AccountError::AccountLockedOut { .. })));
    }

    #[tokio::test]
    async fn test_welcome_mail_is_sent_in_background() {
        let fixture = Fixture::new();
        let user = fixture.user("duda@treino.app", "Sup3rS3cret").await;
        let now = Utc::now();
        fixture
            .account
            .request_account_activation("duda@treino.app", now, true)
            .await
            .unwrap();
        let token = fixture
            .stored(&user.id)
            .await
            .email_confirmation_token
            .unwrap();

        fixture.account.activate_account(&token, now, false).await.unwrap();

        let sent = fixture.mailer.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains("http://localhost:3000/auth/login"));
    }
}
