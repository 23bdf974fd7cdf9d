//! Per-provider send throttle.
//!
//! Spaces consecutive sends through one provider by at least a minimum
//! interval, whichever worker makes them. This is a pipeline-wide pacing
//! limit, separate from the retry backoff applied to a single message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quizflow_common::config::DispatchConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum gap between two sends through the same provider.
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
        }
    }
}

impl ThrottleConfig {
    /// Build from dispatch configuration.
    #[must_use]
    pub const fn from_dispatch(config: &DispatchConfig) -> Self {
        Self {
            min_interval: config.min_send_interval(),
        }
    }
}

/// Per-provider pacing shared by every dispatch worker.
#[derive(Clone)]
pub struct ProviderThrottle {
    config: ThrottleConfig,
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl ProviderThrottle {
    /// Create a new throttle with the given configuration.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait until the provider may be used again, reserving the slot.
    ///
    /// Slots are handed out in call order, so concurrent callers queue up
    /// one interval apart instead of racing.
    pub async fn acquire(&self, provider: &str) {
        if self.config.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(provider)
                .copied()
                .filter(|next| *next > now)
                .unwrap_or(now);
            slots.insert(provider.to_string(), slot + self.config.min_interval);
            slot
        };

        if slot > Instant::now() {
            let wait = slot.saturating_duration_since(Instant::now());
            tracing::trace!(provider, ?wait, "Throttling send");
            tokio::time::sleep_until(slot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(ms: u64) -> ProviderThrottle {
        ProviderThrottle::new(ThrottleConfig {
            min_interval: Duration::from_millis(ms),
        })
    }

    #[tokio::test]
    async fn test_first_send_is_immediate() {
        let throttle = throttle(500);
        let start = Instant::now();

        throttle.acquire("brevo").await;

        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_consecutive_sends_are_spaced() {
        let throttle = throttle(30);
        let start = Instant::now();

        for _ in 0..4 {
            throttle.acquire("brevo").await;
        }

        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_providers_are_independent() {
        let throttle = throttle(500);
        throttle.acquire("brevo").await;

        let start = Instant::now();
        throttle.acquire("sendgrid").await;

        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_concurrent_callers_queue_up() {
        let throttle = throttle(30);
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move { throttle.acquire("smtp").await })
            })
            .collect();
        for handle in handles {
            handle.await.ok();
        }

        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let throttle = throttle(0);
        let start = Instant::now();
        for _ in 0..100 {
            throttle.acquire("brevo").await;
        }
        assert!(start.elapsed() < Duration::from_millis(250));
    }
}
