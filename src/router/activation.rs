//! Account activation routes.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use chrono::Utc;

use crate::AppState;
use crate::account::{TokenOwner, TokenReceipt};
use crate::error::Result;
use crate::router::{EmailRequest, Sandbox, Valid};

/// Send an activation link by e-mail.
pub async fn request(
    State(state): State<AppState>,
    Valid(body): Valid<EmailRequest>,
) -> Result<Json<TokenReceipt>> {
    let receipt = state
        .account
        .request_account_activation(&body.email, Utc::now(), body.sandbox_mode)
        .await?;

    Ok(Json(receipt))
}

/// Confirm the e-mail address behind `token`.
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
    query: std::result::Result<Query<Sandbox>, QueryRejection>,
) -> Result<Json<TokenOwner>> {
    let Query(sandbox) = query?;
    let owner = state
        .account
        .activate_account(&token, Utc::now(), sandbox.sandbox_mode)
        .await?;

    Ok(Json(owner))
}
