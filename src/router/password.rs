//! Password reset routes.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::account::{TokenOwner, TokenReceipt};
use crate::error::Result;
use crate::router::{EmailRequest, Message, Valid};

#[derive(Debug, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    password: String,
    #[serde(default)]
    sandbox_mode: bool,
}

/// Send a reset link by e-mail.
pub async fn request(
    State(state): State<AppState>,
    Valid(body): Valid<EmailRequest>,
) -> Result<Json<TokenReceipt>> {
    let receipt = state
        .account
        .request_password_reset(&body.email, Utc::now(), body.sandbox_mode)
        .await?;

    Ok(Json(receipt))
}

/// Tell whether a reset token can still be used.
pub async fn check(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<TokenOwner>> {
    let owner = state.account.check_reset_token(&token, Utc::now()).await?;

    Ok(Json(owner))
}

/// Choose a new password.
pub async fn reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<Message>> {
    state
        .account
        .consume_reset_token(&token, &body.password, Utc::now(), body.sandbox_mode)
        .await?;

    Ok(Json(Message::new("Password updated.")))
}
