//! Treino account security service.
//!
//! Login with progressive lockout, password reset and account activation
//! tokens, and claim-based authorization for the fitness-coaching platform.

#![forbid(unsafe_code)]

pub mod account;
pub mod config;
mod crypto;
mod database;
pub mod error;
mod mail;
pub mod ports;
mod router;
pub mod telemetry;
mod token;
pub mod user;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::middleware as AxumMiddleware;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use account::{AccountSecurity, Settings};
use config::Configuration;
use ports::{RoleStore, UserStore};

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: Option<String>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, token);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State wired on top of a test [`testing::Fixture`].
#[cfg(test)]
pub(crate) fn test_state(fixture: &testing::Fixture) -> AppState {
    AppState {
        config: Arc::new(Configuration::default()),
        account: Arc::clone(&fixture.account),
        metrics: None,
    }
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub account: Arc<AccountSecurity>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            router::middleware::AUTH_TOKEN,
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .nest("/api/users", router::users(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<Configuration>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let hasher = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    let (users, roles): (Arc<dyn UserStore>, Arc<dyn RoleStore>) =
        match &config.postgres {
            Some(cfg) => {
                let db = database::Database::new(cfg).await?;
                let repository = Arc::new(user::PgUserRepository::new(
                    db.postgres,
                    hasher.clone(),
                ));
                (repository.clone(), repository)
            },
            None => {
                tracing::warn!(
                    "missing `postgres` entry on `config.yaml` file, accounts are kept in memory"
                );
                let store = Arc::new(
                    user::MemoryStore::new(hasher.clone())
                        .with_roles(user::default_roles()),
                );
                (store.clone(), store)
            },
        };

    // handle jwt.
    let Some(token) = &config.token else {
        return Err("missing `token` entry on `config.yaml` file".into());
    };
    let issuer = if config.url.is_empty() {
        &config.name
    } else {
        &config.url
    };
    let mut sessions = match &token.secret {
        Some(secret) => token::TokenManager::with_secret(issuer, secret),
        None => token::TokenManager::new(
            issuer,
            &token.public_key_pem,
            &token.private_key_pem,
        )?,
    };
    if let Some(audience) = &token.audience {
        sessions = sessions.audience(audience);
    }
    let sessions =
        sessions.lifespan_days(config.security.session_lifespan_days);

    // handle mail sender.
    let mail = match &config.mail {
        Some(cfg) => mail::MailManager::new(cfg).await?,
        None => {
            tracing::warn!("missing `mail` entry on `config.yaml` file, e-mails are dropped");
            mail::MailManager::default()
        },
    };

    let account = AccountSecurity::new(
        users,
        roles,
        hasher,
        Arc::new(crypto::OsTokenIssuer),
        Arc::new(mail),
        Arc::new(sessions),
        Settings::from(config.as_ref()),
    );

    Ok(AppState {
        config,
        account: Arc::new(account),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn test_status_handler() {
        let fixture = Fixture::new();
        let response = make_request(
            app(test_state(&fixture)),
            Method::GET,
            "/status.json",
            String::new(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], "treino");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let fixture = Fixture::new();
        let response = make_request(
            app(test_state(&fixture)),
            Method::GET,
            "/metrics",
            String::new(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_state_requires_token_config() {
        let mut config = Configuration::default();
        config.argon2 = Some(config::Argon2 {
            memory_cost: 256,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        });

        assert!(initialize_state(Arc::new(config), None).await.is_err());
    }
}
