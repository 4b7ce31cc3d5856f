//! Account security state machine.
//!
//! Owns failed-login counting, lockout activation and expiry, the
//! password reset and account activation token lifecycles, and the
//! claim-based authorization gate. Every collaborator is injected.

mod activation;
mod authorization;
mod error;
mod lockout;
mod login;
mod register;
mod reset;

pub use activation::*;
pub use authorization::*;
pub use error::*;
pub use login::*;
pub use reset::*;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Configuration;
use crate::mail::Template;
use crate::ports::{
    NotificationDispatcher, PasswordHasher, Recipient, RoleStore,
    SessionTokens, TokenIssuer, UserStore,
};
use crate::user::{DEFAULT_ACCESS_FAILED_LIMIT, User};

/// Tunables of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Name shown in e-mails.
    pub app_name: String,
    /// Base of every link sent by e-mail.
    pub frontend_url: String,
    pub access_failed_limit: i32,
    pub reset_password_expiration: Duration,
    pub account_activation_expiration: Duration,
    /// Role given on registration.
    pub default_role: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Treino".into(),
            frontend_url: "http://localhost:3000".into(),
            access_failed_limit: DEFAULT_ACCESS_FAILED_LIMIT,
            reset_password_expiration: Duration::minutes(120),
            account_activation_expiration: Duration::minutes(120),
            default_role: "Student".into(),
        }
    }
}

impl From<&Configuration> for Settings {
    fn from(config: &Configuration) -> Self {
        let defaults = Settings::default();
        let security = &config.security;

        Self {
            app_name: if config.name.is_empty() {
                defaults.app_name
            } else {
                config.name.clone()
            },
            frontend_url: if config.frontend_url.is_empty() {
                defaults.frontend_url
            } else {
                config.frontend_url.clone()
            },
            access_failed_limit: security.access_failed_limit,
            reset_password_expiration: token_lifetime(
                "reset_password_expiration",
                security.reset_password_expiration,
                defaults.reset_password_expiration,
            ),
            account_activation_expiration: token_lifetime(
                "account_activation_expiration",
                security.account_activation_expiration,
                defaults.account_activation_expiration,
            ),
            default_role: security.default_role.clone(),
        }
    }
}

/// Longest accepted token lifetime, one year in minutes.
const MAX_TOKEN_LIFETIME_MINUTES: i64 = 525_600;

/// Token lifetime from a configured amount of minutes. Values outside
/// `1..=MAX_TOKEN_LIFETIME_MINUTES` fall back to `default`.
fn token_lifetime(key: &str, minutes: i64, default: Duration) -> Duration {
    match Duration::try_minutes(minutes) {
        Some(lifetime) if (1..=MAX_TOKEN_LIFETIME_MINUTES).contains(&minutes) => lifetime,
        _ => {
            tracing::warn!(key, minutes, "token lifetime out of range, using default");
            default
        },
    }
}

/// Name and e-mail of a token owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenOwner {
    pub name: String,
    pub email: String,
}

impl From<&User> for TokenOwner {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Proof that a token was issued and e-mailed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReceipt {
    pub expires_at: DateTime<Utc>,
}

/// The account security service.
pub struct AccountSecurity {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    hasher: Arc<dyn PasswordHasher>,
    issuer: Arc<dyn TokenIssuer>,
    mailer: Arc<dyn NotificationDispatcher>,
    sessions: Arc<dyn SessionTokens>,
    settings: Settings,
}

impl AccountSecurity {
    /// Create a new [`AccountSecurity`].
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        hasher: Arc<dyn PasswordHasher>,
        issuer: Arc<dyn TokenIssuer>,
        mailer: Arc<dyn NotificationDispatcher>,
        sessions: Arc<dyn SessionTokens>,
        settings: Settings,
    ) -> Self {
        Self {
            users,
            roles,
            hasher,
            issuer,
            mailer,
            sessions,
            settings,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}{path}{token}", self.settings.frontend_url)
    }

    fn render(&self, template: Template, user: &User, link: &str) -> crate::ports::Notification {
        let recipient = Recipient {
            email: user.email.clone(),
            name: user.name.clone(),
        };
        template.render(&self.settings.app_name, recipient, link)
    }

    /// Send an e-mail and wait for the transport.
    async fn dispatch(
        &self,
        template: Template,
        user: &User,
        link: &str,
        sandbox: bool,
    ) -> Result<()> {
        if sandbox {
            return Ok(());
        }

        let notification = self.render(template, user, link);
        self.mailer.send(&notification, sandbox).await.map_err(|err| {
            tracing::error!(error = %err, user_id = %user.id, ?template, "mail dispatch failed");
            AccountError::NotificationUnavailable
        })
    }

    /// Send an e-mail without waiting. Failures are only logged.
    fn dispatch_detached(
        &self,
        template: Template,
        user: &User,
        link: &str,
        sandbox: bool,
    ) {
        if sandbox {
            return;
        }

        let notification = self.render(template, user, link);
        let mailer = Arc::clone(&self.mailer);
        let user_id = user.id.clone();

        tokio::spawn(async move {
            if let Err(err) = mailer.send(&notification, sandbox).await {
                tracing::warn!(error = %err, %user_id, ?template, "best-effort mail was not sent");
            }
        });
    }
}

/// A token is usable while `now < expiration`.
fn ensure_active(
    expiration: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    match expiration {
        Some(expiration) if now < expiration => Ok(()),
        _ => Err(AccountError::TokenExpired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_active_boundary() {
        let now = Utc::now();
        assert!(ensure_active(Some(now + Duration::seconds(1)), now).is_ok());
        assert!(matches!(
            ensure_active(Some(now), now),
            Err(AccountError::TokenExpired)
        ));
        assert!(ensure_active(None, now).is_err());
    }

    #[test]
    fn test_settings_from_configuration() {
        let mut config = Configuration::default();
        config.name = "Treino Pro".into();
        config.frontend_url = "https://treino.app".into();
        let settings = Settings::from(&config);

        assert_eq!(settings.app_name, "Treino Pro");
        assert_eq!(settings.frontend_url, "https://treino.app");
        assert_eq!(settings.reset_password_expiration, Duration::minutes(120));
        assert_eq!(settings.access_failed_limit, 10);
    }

    #[test]
    fn test_out_of_range_token_lifetimes() {
        let mut config = Configuration::default();
        config.security.reset_password_expiration = i64::MAX;
        config.security.account_activation_expiration = -5;
        let settings = Settings::from(&config);

        assert_eq!(settings.reset_password_expiration, Duration::minutes(120));
        assert_eq!(settings.account_activation_expiration, Duration::minutes(120));

        config.security.reset_password_expiration = 30;
        config.security.account_activation_expiration = 1_440;
        let settings = Settings::from(&config);

        assert_eq!(settings.reset_password_expiration, Duration::minutes(30));
        assert_eq!(settings.account_activation_expiration, Duration::days(1));
    }
}
