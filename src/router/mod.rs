pub mod activation;
pub mod lockout;
pub mod login;
pub mod me;
pub mod middleware;
pub mod password;
pub mod register;
pub mod status;

use axum::Router;
use axum::extract::{FromRequest, Json, Request};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::account::MANAGE_PERMISSIONS;
use crate::error::ServerError;
use middleware::Gate;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Body of the endpoints sending a token by e-mail.
#[derive(Debug, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[validate(email(message = "Email must be formatted."))]
    pub(crate) email: String,
    /// Skip e-mail delivery, used by automated clients.
    #[serde(default)]
    pub(crate) sandbox_mode: bool,
}

/// `?sandboxMode=` query parameter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    #[serde(default)]
    pub sandbox_mode: bool,
}

/// Plain acknowledgement.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

/// Routes nested under `/api/users`.
pub fn users(state: AppState) -> Router<AppState> {
    let authenticated = Router::new()
        // `GET /@me` goes to `me`.
        .route("/@me", get(me::handler))
        .route_layer(from_fn_with_state(
            Gate::new(state.clone(), None),
            middleware::authorize,
        ));

    let operators = Router::new()
        .route(
            "/{user_id}/lockout",
            post(lockout::lock).delete(lockout::unlock),
        )
        .route_layer(from_fn_with_state(
            Gate::new(state, Some(MANAGE_PERMISSIONS)),
            middleware::authorize,
        ));

    Router::new()
        .route("/login", post(login::handler))
        .route("/register", post(register::handler))
        .route("/password/reset", post(password::request))
        .route(
            "/password/reset/{token}",
            get(password::check).post(password::reset),
        )
        .route("/activate", post(activation::request))
        .route("/activate/{token}", get(activation::activate))
        .merge(authenticated)
        .merge(operators)
}
