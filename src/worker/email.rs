//! Registration emails from the `email` topic.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::broker::EventHandler;
use crate::domain::BrokerEvent;
use crate::error::HandlerError;

/// Payload published by the user service when an account is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEmail {
    /// New account's id.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Address to welcome.
    #[serde(rename = "emailID")]
    pub email_id: String,
}

/// A rendered outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

impl OutgoingEmail {
    /// Renders the welcome email for `registration`.
    #[must_use]
    pub fn welcome(from: &str, registration: &RegistrationEmail) -> Self {
        Self {
            from: from.to_string(),
            to: registration.email_id.clone(),
            subject: "Welcome to Our Service".to_string(),
            html_body: format!(
                "<p>Dear User,</p>\
                 <p>Thank you for registering with our service. Your account has been created successfully.</p>\
                 <p>User ID: {}</p>",
                registration.user_id
            ),
        }
    }
}

/// Delivers rendered emails.
#[async_trait]
pub trait EmailDispatcher: Send + Sync + 'static {
    /// Sends `email`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Email`] if delivery failed.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), HandlerError>;
}

/// [`EmailDispatcher`] that records each email in the log instead of
/// talking to a mail server.
#[derive(Debug, Clone, Default)]
pub struct LoggingEmailDispatcher;

#[async_trait]
impl EmailDispatcher for LoggingEmailDispatcher {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), HandlerError> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            "registration email sent"
        );
        Ok(())
    }
}

/// `email` topic handler.
pub struct RegistrationEmailHandler {
    from: String,
    dispatcher: Arc<dyn EmailDispatcher>,
}

impl RegistrationEmailHandler {
    /// Creates a handler sending from `from` through `dispatcher`.
    #[must_use]
    pub fn new(from: impl Into<String>, dispatcher: Arc<dyn EmailDispatcher>) -> Self {
        Self {
            from: from.into(),
            dispatcher,
        }
    }
}

impl fmt::Debug for RegistrationEmailHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEmailHandler")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventHandler for RegistrationEmailHandler {
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError> {
        let registration: RegistrationEmail = serde_json::from_slice(&event.payload)?;
        tracing::info!(email = %registration.email_id, "sending registration email");
        self.dispatcher
            .send(&OutgoingEmail::welcome(&self.from, &registration))
            .await
    }
}
