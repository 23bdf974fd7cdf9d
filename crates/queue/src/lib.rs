//! Email dispatch pipeline for quizflow.
//!
//! This crate turns batches of [`DispatchJob`](quizflow_core::DispatchJob)s
//! into per-recipient outcomes:
//!
//! - **Providers**: Brevo, SendGrid and SMTP resolved once from configuration
//! - **Retry**: Exponential backoff per provider, then fallback to the next
//! - **Throttle**: Minimum spacing between sends through one provider
//! - **Workers**: Bounded concurrency across recipients with cooperative
//!   cancellation

pub mod pipeline;
pub mod providers;
pub mod rate_limit;
pub mod retry;

pub use pipeline::DispatchPipeline;
pub use providers::ProviderRegistry;
pub use rate_limit::{ProviderThrottle, ThrottleConfig};
pub use retry::RetryConfig;
