//! SMTP relay via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use quizflow_common::config::SmtpConfig;
use quizflow_common::{AppError, AppResult};
use std::time::Duration;

use super::Sender;
use crate::services::email::{MailTransport, OutgoingEmail, SendError};

const PROVIDER: &str = "smtp";

/// Sends through an SMTP relay; the last-resort provider.
#[derive(Clone)]
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpProvider {
    /// Build a relay transport from configuration.
    pub fn new(config: &SmtpConfig, sender: &Sender, timeout: Duration) -> AppResult<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Config(format!("invalid SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let address = sender
            .email
            .parse::<Address>()
            .map_err(|e| AppError::Config(format!("invalid sender address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(Some(sender.name.clone()), address),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, SendError> {
        let address = email.to_email.parse::<Address>().map_err(|e| {
            SendError::permanent(PROVIDER, format!("invalid recipient {}: {e}", email.to_email))
        })?;
        let to_name = (!email.to_name.is_empty()).then(|| email.to_name.clone());

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(to_name, address))
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| SendError::permanent(PROVIDER, format!("unbuildable message: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let message = self.build_message(email)?;
        match self.transport.send(message).await {
            Ok(_) => Ok(()),
            // 5xx replies reject the message itself.
            Err(e) if e.is_permanent() => Err(SendError::permanent(PROVIDER, e.to_string())),
            Err(e) => Err(SendError::transient(PROVIDER, e.to_string())),
        }
    }
}
