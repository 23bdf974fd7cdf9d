//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Public frontend the quiz links point at.
    #[serde(default)]
    pub frontend: FrontendConfig,
    /// Mail provider credentials and sender identity.
    #[serde(default)]
    pub mail: MailConfig,
    /// Dispatch pipeline tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Workflow thresholds.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Question generator endpoint.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Frontend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Base URL; quiz links are `{url}/quiz/{token}`.
    #[serde(default = "default_frontend_url")]
    pub url: String,
}

/// Mail configuration.
///
/// Provider precedence is Brevo, then SendGrid, then SMTP. A provider is
/// considered configured when its credential is present.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Brevo API key.
    #[serde(default)]
    pub brevo_api_key: Option<String>,
    /// SendGrid API key.
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    /// SMTP relay, always available as the last resort.
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay host.
    #[serde(default = "default_smtp_host")]
    pub host: String,
    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_true")]
    pub starttls: bool,
}

/// Dispatch pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Attempts against one provider before falling back to the next.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_provider: u32,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound on a single provider call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Minimum spacing between two sends through the same provider.
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    /// Concurrent send workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

/// Workflow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Number of top-ranked students notified after scoring.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Share of sent invitations that must be redeemed before scoring.
    #[serde(default = "default_min_completion_ratio")]
    pub min_completion_ratio: f64,
}

/// Question generator configuration (OpenAI-compatible chat endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// API base, e.g. `https://api.groq.com/openai/v1`.
    #[serde(default = "default_generation_api_base")]
    pub api_base: String,
    /// Bearer key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name.
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_from_address() -> String {
    "noreply@quizflow.local".to_string()
}

fn default_from_name() -> String {
    "Quizflow".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_true() -> bool {
    true
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_send_timeout_secs() -> u64 {
    30
}

const fn default_min_send_interval_ms() -> u64 {
    100
}

const fn default_worker_count() -> usize {
    4
}

const fn default_top_n() -> usize {
    5
}

const fn default_min_completion_ratio() -> f64 {
    1.0
}

fn default_generation_api_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_generation_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

const fn default_generation_timeout_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: default_frontend_url(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            from_name: default_from_name(),
            brevo_api_key: None,
            sendgrid_api_key: None,
            smtp: SmtpConfig::default(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            starttls: default_true(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            send_timeout_secs: default_send_timeout_secs(),
            min_send_interval_ms: default_min_send_interval_ms(),
            worker_count: default_worker_count(),
        }
    }
}

impl DispatchConfig {
    /// Upper bound on a single provider call.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Minimum spacing between sends through one provider.
    #[must_use]
    pub const fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_completion_ratio: default_min_completion_ratio(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_generation_api_base(),
            api_key: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

/// Treat blank strings as missing credentials.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl MailConfig {
    /// Brevo key, if configured.
    #[must_use]
    pub fn brevo_key(&self) -> Option<&str> {
        present(self.brevo_api_key.as_ref())
    }

    /// SendGrid key, if configured.
    #[must_use]
    pub fn sendgrid_key(&self) -> Option<&str> {
        present(self.sendgrid_api_key.as_ref())
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `QUIZFLOW_ENV`)
    /// 4. Environment variables with `QUIZFLOW` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("QUIZFLOW_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUIZFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUIZFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Parse configuration from TOML text only.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

impl FrontendConfig {
    /// Public link for an invitation token.
    #[must_use]
    pub fn quiz_link(&self, token: &str) -> String {
        format!("{}/quiz/{token}", self.url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/quizflow"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.frontend.url, "http://localhost:3000");
        assert_eq!(config.dispatch.max_attempts_per_provider, 3);
        assert_eq!(config.workflow.top_n, 5);
        assert_eq!(config.mail.smtp.port, 587);
        assert!(config.mail.brevo_key().is_none());
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/quizflow"

            [mail]
            brevo_api_key = "  "
            sendgrid_api_key = "SG.key"
            "#,
        )
        .unwrap();

        assert!(config.mail.brevo_key().is_none());
        assert_eq!(config.mail.sendgrid_key(), Some("SG.key"));
    }

    #[test]
    fn test_quiz_link() {
        let config = Config::from_toml_str(
            r#"
            [database]
            url = "postgres://localhost/quizflow"

            [frontend]
            url = "https://quiz.example.com/"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.frontend.quiz_link("abc"),
            "https://quiz.example.com/quiz/abc"
        );
    }
}
