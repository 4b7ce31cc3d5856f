//! Authorization layer for protected routes.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::Result;

/// Legacy header some clients still send the session token in.
pub const AUTH_TOKEN: HeaderName = HeaderName::from_static("auth-token");

/// What a route layer requires from the caller.
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    claim: Option<&'static str>,
}

impl Gate {
    /// Create a new [`Gate`]. With no claim any valid session passes.
    pub fn new(state: AppState, claim: Option<&'static str>) -> Self {
        Self { state, claim }
    }
}

/// Read the session token from `Authorization` or `auth-token`.
pub fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .or_else(|| headers.get(AUTH_TOKEN))?
        .to_str()
        .ok()?;

    let value = value.trim();
    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => value,
    };
    Some(token.to_owned())
}

/// Resolve the caller and expose it to handlers as an extension.
pub async fn authorize(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer(req.headers());
    let user = gate.state.account.authorize(token.as_deref(), gate.claim).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
