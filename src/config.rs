//! Configuration manager for Treino.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name, used in e-mails and as JWT issuer fallback.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Web application receiving reset and activation links.
    pub frontend_url: String,
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Lockout and token lifetimes.
    #[serde(skip_serializing)]
    pub security: Security,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
}

/// Account security settings.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    /// Failed logins allowed before the account locks itself.
    pub access_failed_limit: i32,
    /// Lifetime of a password reset token, in minutes.
    pub reset_password_expiration: i64,
    /// Lifetime of an account activation token, in minutes.
    pub account_activation_expiration: i64,
    /// Lifetime of a session token, in days.
    pub session_lifespan_days: u64,
    /// Role given to every registered user.
    pub default_role: String,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            access_failed_limit: crate::user::DEFAULT_ACCESS_FAILED_LIMIT,
            reset_password_expiration: 120,
            account_activation_expiration: 120,
            session_lifespan_days: crate::token::DEFAULT_LIFESPAN_DAYS,
            default_role: "Student".into(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// RabbitMQ mail queue configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
    /// `From` address of every e-mail.
    pub sender: Option<String>,
    /// Publish timeout in milliseconds.
    pub timeout: Option<u64>,
}

/// Json Web Token configuration.
///
/// Either `secret` (HS256) or the PEM pair (ES384) must be set.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    pub key_id: Option<String>,
    #[serde(default)]
    pub public_key_pem: String,
    #[serde(default)]
    pub private_key_pem: String,
    /// Shared secret, preferred over the PEM pair when present.
    pub secret: Option<String>,
    /// Update token audience.
    /// Default is `treino.app`.
    pub audience: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.as_str().trim_end_matches('/').to_owned())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => self.finalize(config).map(Arc::new),
                Err(err) => Ok(Arc::new(self.error(err))),
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    fn finalize(&self, mut config: Configuration) -> Result<Self, url::ParseError> {
        // set app version.
        config.version = VERSION.to_owned();

        // normalize URLs.
        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url)?;
        }
        if !config.frontend_url.is_empty() {
            config.frontend_url = self.normalize_url(&config.frontend_url)?;
        }

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }
}
