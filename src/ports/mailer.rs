//! Port for outgoing e-mails.

use async_trait::async_trait;
use serde::Serialize;

use crate::mail::MailError;

/// Someone receiving a [`Notification`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

/// Rendered e-mail ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub html: String,
}

/// Port for sending notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Send a notification. With `sandbox` set, nothing leaves the process.
    async fn send(
        &self,
        notification: &Notification,
        sandbox: bool,
    ) -> Result<(), MailError>;
}
