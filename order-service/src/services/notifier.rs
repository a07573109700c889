//! Notification sink.
//!
//! The workflow only produces notification requests; delivery is
//! best-effort and at-most-once. A send failure is logged and counted,
//! never propagated back into order or payment state.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;

/// One message handed to the sink.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, note: NotificationRequest) -> Result<(), AppError>;
}

/// SMTP-backed sink.
pub struct SmtpSink {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpSink {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl NotificationSink for SmtpSink {
    async fn send(&self, note: NotificationRequest) -> Result<(), AppError> {
        let Some(transport) = self.transport.as_ref() else {
            tracing::debug!(
                recipient = %note.recipient,
                subject = %note.subject,
                "SMTP sink disabled, dropping notification"
            );
            return Ok(());
        };

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = note
            .recipient
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let content_type = if note.is_html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&note.subject)
            .header(content_type)
            .body(note.body)
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        tracing::info!(recipient = %note.recipient, subject = %note.subject, "Notification sent");
        Ok(())
    }
}
