use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::Profile;

#[derive(Debug, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 1, max = 255, message = "Name must contain 1 to 255 characters."))]
    name: String,
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    password: String,
    #[serde(flatten)]
    #[validate(nested)]
    #[zeroize(skip)]
    profile: Profile,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let user = state
        .account
        .register(
            &body.name,
            &body.email,
            &body.password,
            body.profile.clone(),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(Response { id: user.id })))
}
