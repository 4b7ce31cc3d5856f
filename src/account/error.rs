//! Outcomes reported by the account state machine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::ports::StoreError;
use crate::token::TokenError;
use crate::user::LockoutReason;

pub type Result<T> = std::result::Result<T, AccountError>;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("user is not in database")]
    UserNotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("access failed limit reached, account locked until {until}")]
    AccessFailedLimitReached {
        until: DateTime<Utc>,
        reason: Option<LockoutReason>,
    },

    #[error("account is locked until {until}")]
    AccountLockedOut {
        until: DateTime<Utc>,
        reason: Option<LockoutReason>,
    },

    #[error("requested token was never issued")]
    TokenNotFound,

    #[error("requested token is expired or already used")]
    TokenExpired,

    #[error("could not send the e-mail, try again later")]
    NotificationUnavailable,

    #[error("missing authentication token")]
    MissingAuthToken,

    #[error("authentication token is invalid or expired")]
    TokenForged,

    #[error("route requires the `{claim}` claim")]
    UnauthorizedRoute { claim: String },

    #[error("an account already uses this information")]
    Conflict,

    #[error("requested resource is not in database")]
    ResourceNotFound,

    #[error("invalid lockout: {0}")]
    InvalidLockout(&'static str),

    #[error("store is unavailable")]
    Unavailable(#[source] StoreError),

    #[error("store failed")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("cannot issue session token")]
    Session(#[from] TokenError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AccountError::Conflict,
            StoreError::NotFound => AccountError::UserNotFound,
            err @ StoreError::Unavailable(_) => AccountError::Unavailable(err),
            err @ StoreError::Internal(_) => AccountError::Store(err),
        }
    }
}
