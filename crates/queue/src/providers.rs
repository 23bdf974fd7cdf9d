//! Provider priority list, resolved once from configuration.

use std::sync::Arc;

use quizflow_common::config::{DispatchConfig, MailConfig};
use quizflow_common::{AppError, AppResult};
use quizflow_core::services::email::MailTransport;
use quizflow_core::services::providers::{BrevoProvider, SendGridProvider, Sender, SmtpProvider};

/// Ordered provider list. The first entry is the active provider; the rest
/// are fallbacks walked in order.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MailTransport>>,
}

impl ProviderRegistry {
    /// Use an explicit provider list.
    pub fn new(providers: Vec<Arc<dyn MailTransport>>) -> AppResult<Self> {
        if providers.is_empty() {
            return Err(AppError::Config("no mail provider configured".to_string()));
        }
        Ok(Self { providers })
    }

    /// Resolve Brevo, then SendGrid, then SMTP.
    ///
    /// HTTP providers are included only when their API key is set. SMTP is
    /// always present as the last resort.
    pub fn from_config(mail: &MailConfig, dispatch: &DispatchConfig) -> AppResult<Self> {
        let sender = Sender::new(mail.from_address.clone(), mail.from_name.clone());
        let timeout = dispatch.send_timeout();
        let mut providers: Vec<Arc<dyn MailTransport>> = Vec::new();

        if let Some(key) = mail.brevo_key() {
            providers.push(Arc::new(BrevoProvider::new(key, sender.clone(), timeout)?));
        }
        if let Some(key) = mail.sendgrid_key() {
            providers.push(Arc::new(SendGridProvider::new(key, sender.clone(), timeout)?));
        }
        providers.push(Arc::new(SmtpProvider::new(&mail.smtp, &sender, timeout)?));

        let registry = Self::new(providers)?;
        tracing::info!(
            active = registry.active(),
            providers = ?registry.names(),
            "Mail providers resolved"
        );
        Ok(registry)
    }

    /// Name of the provider every send starts with.
    #[must_use]
    pub fn active(&self) -> &str {
        self.providers.first().map_or("none", |p| p.name())
    }

    /// Providers in priority order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn MailTransport>] {
        &self.providers
    }

    /// Provider names in priority order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}
