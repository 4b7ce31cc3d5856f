use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::account::LoggedIn;
use crate::error::Result;
use crate::router::Valid;

#[derive(Debug, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    password: String,
}

/// Handler to log in.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<LoggedIn>> {
    let logged = state
        .account
        .attempt_login(&body.email, &body.password, Utc::now())
        .await?;

    Ok(Json(logged))
}
