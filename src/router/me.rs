use axum::{Extension, Json};

use crate::error::{Result, ServerError};
use crate::user::User;

/// Profile of the token bearer.
pub async fn handler(user: Option<Extension<User>>) -> Result<Json<User>> {
    let Some(Extension(user)) = user else {
        return Err(ServerError::Internal {
            details: "route is not behind the authorization layer".into(),
            source: None,
        });
    };

    Ok(Json(user))
}
