//! Operator lock and unlock routes.

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{LockoutReason, User};

#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    reason: LockoutReason,
    /// Omitted for a permanent lock.
    until: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutState {
    pub id: String,
    pub lockout_until: DateTime<Utc>,
    pub lockout_reason: Option<LockoutReason>,
}

impl From<User> for LockoutState {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            lockout_until: user.lockout_until,
            lockout_reason: user.lockout_reason,
        }
    }
}

/// Lock an account.
pub async fn lock(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<Json<LockoutState>> {
    let user = state
        .account
        .lock_account(&user_id, body.reason, body.until, Utc::now())
        .await?;

    Ok(Json(user.into()))
}

/// Lift every lock of an account.
pub async fn unlock(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<LockoutState>> {
    let user = state.account.unlock_account(&user_id, Utc::now()).await?;

    Ok(Json(user.into()))
}
