//! Send emails to user for important updates.
//!
//! Mails are published as cloudevents on a RabbitMQ queue; a separate
//! worker owns the SMTP side.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, RecoveryConfig,
};
use serde::Serialize;
use url::Url;

use crate::config::Mail;
use crate::ports::{Notification, NotificationDispatcher, Recipient};

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";
const DEFAULT_SENDER: &str = "no-reply@treino.app";
/// Upper bound for a publish, in milliseconds.
pub const DEFAULT_TIMEOUT: u64 = 5_000;

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid broker address: {0}")]
    Address(#[from] url::ParseError),
    #[error("broker scheme must be `amqp` or `amqps`")]
    InvalidScheme,
    #[error(transparent)]
    Broker(#[from] lapin::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("mail dispatch timed out")]
    Timeout,
}

/// E-mails sent by the account flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Link to choose a new password.
    PasswordReset,
    /// Confirmation that the password changed.
    PasswordChanged,
    /// Link to confirm the e-mail address.
    AccountActivation,
    /// Greeting once the account is active.
    Welcome,
}

impl Template {
    fn subject(&self, app_name: &str) -> String {
        match self {
            Template::PasswordReset => format!("{app_name} - Password reset"),
            Template::PasswordChanged => {
                format!("{app_name} - Your password was changed")
            },
            Template::AccountActivation => {
                format!("{app_name} - Activate your account")
            },
            Template::Welcome => format!("Welcome to {app_name}"),
        }
    }

    fn body(&self, name: &str, link: &str) -> String {
        let (intro, action) = match self {
            Template::PasswordReset => (
                "We received a request to reset your password. The link below is valid for a limited time.",
                "Choose a new password",
            ),
            Template::PasswordChanged => (
                "Your password was just changed. If it was not you, secure your account right away.",
                "This was not me",
            ),
            Template::AccountActivation => (
                "Confirm your e-mail address to activate your account.",
                "Activate my account",
            ),
            Template::Welcome => (
                "Your account is active. You can now sign in.",
                "Sign in",
            ),
        };

        // Names are user input.
        let name = html_escape::encode_text(name);
        let link = html_escape::encode_double_quoted_attribute(link);

        format!(
            r#"<html><body><p>Hello {name},</p><p>{intro}</p><p><a href="{link}">{action}</a></p></body></html>"#
        )
    }

    /// Render the template for a single recipient.
    pub fn render(
        &self,
        app_name: &str,
        recipient: Recipient,
        link: &str,
    ) -> Notification {
        Notification {
            subject: self.subject(app_name),
            html: self.body(&recipient.name, link),
            recipients: vec![recipient],
        }
    }
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    from: &'a str,
    to: &'a [Recipient],
    subject: &'a str,
    html: &'a str,
}

/// Broker connection settings. A dropped connection is re-established by
/// lapin and channels are opened per publish.
fn connection_properties() -> ConnectionProperties {
    let recovery_config = RecoveryConfig::default().auto_recover_connection();
    ConnectionProperties::default()
        .with_connection_name("treino_mail_client".into())
        .with_experimental_recovery_config(recovery_config)
}

/// RabbitMQ mail publisher.
#[derive(Debug, Clone)]
pub struct MailManager {
    queue: String,
    sender: String,
    timeout: Duration,
    conn: Option<Arc<Connection>>,
}

impl Default for MailManager {
    fn default() -> Self {
        Self {
            queue: String::default(),
            sender: DEFAULT_SENDER.to_owned(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT),
            conn: None,
        }
    }
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self, MailError> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme())
                .map_err(|_| MailError::InvalidScheme)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let conn = Connection::connect_uri(uri, connection_properties()).await?;

        tracing::info!(%addr, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            sender: config
                .sender
                .clone()
                .unwrap_or(DEFAULT_SENDER.to_owned()),
            timeout: Duration::from_millis(
                config.timeout.unwrap_or(DEFAULT_TIMEOUT),
            ),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel, MailError> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event<'a>(&'a self, notification: &'a Notification) -> Cloudevent<'a> {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "app.treino.email",
            source: "app.treino.account",
            id: uuid::Uuid::new_v4().to_string(),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data: Content {
                from: &self.sender,
                to: &notification.recipients,
                subject: &notification.subject,
                html: &notification.html,
            },
        }
    }

    async fn publish(
        &self,
        conn: &Arc<Connection>,
        notification: &Notification,
    ) -> Result<(), MailError> {
        let channel = Self::create_channel(Arc::clone(conn), &self.queue).await?;
        let payload = serde_json::to_string(&self.create_event(notification))?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for MailManager {
    async fn send(
        &self,
        notification: &Notification,
        sandbox: bool,
    ) -> Result<(), MailError> {
        if sandbox {
            tracing::debug!(subject = notification.subject, "sandbox mode, mail not sent");
            return Ok(());
        }

        let Some(conn) = &self.conn else {
            tracing::debug!(subject = notification.subject, "no mail broker configured");
            return Ok(());
        };

        tokio::time::timeout(self.timeout, self.publish(conn, notification))
            .await
            .map_err(|_| MailError::Timeout)??;

        tracing::trace!(subject = notification.subject, "mail event sent");

        Ok(())
    }
}
