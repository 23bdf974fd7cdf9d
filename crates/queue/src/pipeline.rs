//! Dispatch pipeline: bounded worker pool over the provider list.
//!
//! Each job walks the providers in priority order. A provider gets up to
//! `max_attempts` tries with exponential backoff on transient errors before
//! the job falls through to the next provider. A permanent error ends the
//! job at once. Every job yields exactly one outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quizflow_common::config::DispatchConfig;
use quizflow_core::services::cancel::CancelSignal;
use quizflow_core::services::delivery::{
    DispatchJob, DispatchOutcome, DispatchStatus, MailDispatch,
};
use quizflow_core::services::email::{MailTransport, SendError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::providers::ProviderRegistry;
use crate::rate_limit::{ProviderThrottle, ThrottleConfig};
use crate::retry::RetryConfig;

struct PipelineInner {
    registry: ProviderRegistry,
    retry: RetryConfig,
    throttle: ProviderThrottle,
    send_timeout: Duration,
    worker_count: usize,
}

/// Concurrent email dispatcher with retry, fallback and throttling.
#[derive(Clone)]
pub struct DispatchPipeline {
    inner: Arc<PipelineInner>,
}

impl DispatchPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        registry: ProviderRegistry,
        retry: RetryConfig,
        throttle: ThrottleConfig,
        send_timeout: Duration,
        worker_count: usize,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                registry,
                retry,
                throttle: ProviderThrottle::new(throttle),
                send_timeout,
                worker_count: worker_count.max(1),
            }),
        }
    }

    /// Create a pipeline tuned by dispatch configuration.
    #[must_use]
    pub fn from_config(registry: ProviderRegistry, config: &DispatchConfig) -> Self {
        Self::new(
            registry,
            RetryConfig::from_dispatch(config),
            ThrottleConfig::from_dispatch(config),
            config.send_timeout(),
            config.worker_count,
        )
    }

    /// Deliver a single job on the calling task.
    pub async fn deliver(&self, job: DispatchJob, cancel: &CancelSignal) -> DispatchOutcome {
        self.inner.deliver(job, cancel).await
    }

    /// Number of concurrent workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }
}

impl PipelineInner {
    async fn deliver(&self, mut job: DispatchJob, cancel: &CancelSignal) -> DispatchOutcome {
        for provider in self.registry.providers() {
            let name = provider.name();
            for attempt in 0..self.retry.max_attempts {
                if cancel.is_cancelled() {
                    return outcome(&job, DispatchStatus::Abandoned);
                }

                self.throttle.acquire(name).await;
                job.attempt += 1;

                let error = match self.send_once(provider.as_ref(), &job).await {
                    Ok(()) => {
                        tracing::debug!(
                            job_id = %job.id,
                            provider = name,
                            attempts = job.attempt,
                            "Email delivered"
                        );
                        return outcome(
                            &job,
                            DispatchStatus::Delivered {
                                provider: name.to_string(),
                            },
                        );
                    }
                    Err(e) => e,
                };
                job.last_error = Some(error.to_string());

                if !error.is_transient() {
                    tracing::error!(
                        job_id = %job.id,
                        recipient = %job.email.to_email,
                        provider = name,
                        error = %error,
                        "Email rejected permanently"
                    );
                    return outcome(
                        &job,
                        DispatchStatus::Failed {
                            error: error.to_string(),
                            permanent: true,
                        },
                    );
                }

                tracing::warn!(
                    job_id = %job.id,
                    provider = name,
                    attempt = attempt + 1,
                    error = %error,
                    "Send attempt failed"
                );

                if self.retry.should_retry(attempt + 1) {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            return outcome(&job, DispatchStatus::Abandoned);
                        }
                    }
                }
            }
            tracing::warn!(job_id = %job.id, provider = name, "Provider exhausted, falling back");
        }

        let error = job
            .last_error
            .clone()
            .unwrap_or_else(|| "no provider attempted".to_string());
        tracing::error!(
            job_id = %job.id,
            recipient = %job.email.to_email,
            attempts = job.attempt,
            error = %error,
            "All providers failed"
        );
        outcome(
            &job,
            DispatchStatus::Failed {
                error,
                permanent: false,
            },
        )
    }

    async fn send_once(
        &self,
        provider: &dyn MailTransport,
        job: &DispatchJob,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(self.send_timeout, provider.send(&job.email)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::transient(
                provider.name(),
                format!("timed out after {:?}", self.send_timeout),
            )),
        }
    }
}

fn outcome(job: &DispatchJob, status: DispatchStatus) -> DispatchOutcome {
    DispatchOutcome {
        job_id: job.id.clone(),
        recipient: job.email.to_email.clone(),
        status,
        attempts: job.attempt,
        at: Utc::now(),
    }
}

#[async_trait]
impl MailDispatch for DispatchPipeline {
    async fn dispatch(&self, jobs: Vec<DispatchJob>, cancel: &CancelSignal) -> Vec<DispatchOutcome> {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.inner.worker_count));
        let mut slots: Vec<Option<DispatchOutcome>> = vec![None; total];
        let placeholders = jobs.clone();
        let mut workers = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) if !cancel.is_cancelled() => inner.deliver(job, &cancel).await,
                    _ => outcome(&job, DispatchStatus::Abandoned),
                };
                (index, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Dispatch worker panicked"),
            }
        }

        let outcomes: Vec<DispatchOutcome> = slots
            .into_iter()
            .zip(placeholders.iter())
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    outcome(
                        job,
                        DispatchStatus::Failed {
                            error: "dispatch worker failed".to_string(),
                            permanent: false,
                        },
                    )
                })
            })
            .collect();

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        let abandoned = outcomes
            .iter()
            .filter(|o| matches!(o.status, DispatchStatus::Abandoned))
            .count();
        tracing::info!(
            total,
            delivered,
            failed = total - delivered - abandoned,
            abandoned,
            "Dispatch batch finished"
        );
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use quizflow_core::services::cancel::cancel_pair;
    use quizflow_core::testing::{ScriptedTransport, email_to};
    use std::collections::HashSet;
    use std::time::Instant;

    fn pipeline(
        providers: Vec<Arc<dyn MailTransport>>,
        max_attempts: u32,
        send_timeout: Duration,
        workers: usize,
    ) -> DispatchPipeline {
        DispatchPipeline::new(
            ProviderRegistry::new(providers).unwrap(),
            RetryConfig {
                max_attempts,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
            ThrottleConfig {
                min_interval: Duration::ZERO,
            },
            send_timeout,
            workers,
        )
    }

    fn job(i: usize) -> DispatchJob {
        DispatchJob::new(format!("job-{i}"), email_to(&format!("s{i}@example.com")))
    }

    #[tokio::test]
    async fn test_falls_back_after_exhausting_transient_retries() {
        let p1 = ScriptedTransport::down("p1");
        let p2 = ScriptedTransport::healthy("p2");
        let pipeline = pipeline(vec![p1.clone(), p2.clone()], 3, Duration::from_secs(1), 1);

        let outcome = pipeline.deliver(job(0), &CancelSignal::never()).await;

        assert_eq!(
            outcome.status,
            DispatchStatus::Delivered {
                provider: "p2".to_string()
            }
        );
        assert_eq!(p1.calls(), 3);
        assert_eq!(p2.calls(), 1);
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test]
    async fn test_permanent_error_never_tries_next_provider() {
        let p1 = ScriptedTransport::rejecting("p1");
        let p2 = ScriptedTransport::healthy("p2");
        let pipeline = pipeline(vec![p1.clone(), p2.clone()], 3, Duration::from_secs(1), 1);

        let outcome = pipeline.deliver(job(0), &CancelSignal::never()).await;

        assert!(matches!(
            outcome.status,
            DispatchStatus::Failed {
                permanent: true,
                ..
            }
        ));
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_then_success_stays_on_provider() {
        let p1 = ScriptedTransport::new(
            "p1",
            vec![Err(SendError::transient("p1", "429 Too Many Requests")), Ok(())],
        );
        let p2 = ScriptedTransport::healthy("p2");
        let pipeline = pipeline(vec![p1.clone(), p2.clone()], 3, Duration::from_secs(1), 1);

        let outcome = pipeline.deliver(job(0), &CancelSignal::never()).await;

        assert!(outcome.is_delivered());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let p1 = ScriptedTransport::slow("p1", Duration::from_millis(500));
        let p2 = ScriptedTransport::healthy("p2");
        let pipeline = pipeline(vec![p1.clone(), p2.clone()], 2, Duration::from_millis(20), 1);

        let outcome = pipeline.deliver(job(0), &CancelSignal::never()).await;

        assert!(outcome.is_delivered());
        assert_eq!(p1.calls(), 2);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_down_reports_failure() {
        let p1 = ScriptedTransport::down("p1");
        let p2 = ScriptedTransport::down("p2");
        let pipeline = pipeline(vec![p1.clone(), p2.clone()], 2, Duration::from_secs(1), 1);

        let outcome = pipeline.deliver(job(0), &CancelSignal::never()).await;

        match outcome.status {
            DispatchStatus::Failed { error, permanent } => {
                assert!(!permanent);
                assert!(error.starts_with("p2:"));
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_outcome_per_job() {
        let p1 = ScriptedTransport::new(
            "p1",
            vec![
                Ok(()),
                Err(SendError::permanent("p1", "bad address")),
                Ok(()),
                Err(SendError::transient("p1", "reset")),
            ],
        );
        let pipeline = pipeline(vec![p1], 2, Duration::from_secs(1), 4);
        let jobs: Vec<_> = (0..25).map(job).collect();

        let outcomes = pipeline.dispatch(jobs, &CancelSignal::never()).await;

        assert_eq!(outcomes.len(), 25);
        let ids: HashSet<_> = outcomes.iter().map(|o| o.job_id.as_str()).collect();
        assert_eq!(ids.len(), 25);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.job_id, format!("job-{i}"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_abandons_everything() {
        let p1 = ScriptedTransport::healthy("p1");
        let pipeline = pipeline(vec![p1.clone()], 3, Duration::from_secs(1), 2);
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let outcomes = pipeline.dispatch((0..5).map(job).collect(), &signal).await;

        assert_eq!(outcomes.len(), 5);
        assert!(
            outcomes
                .iter()
                .all(|o| o.status == DispatchStatus::Abandoned)
        );
        assert_eq!(p1.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_mid_batch_finishes_in_flight_and_abandons_queued() {
        let p1 = ScriptedTransport::slow("p1", Duration::from_millis(60));
        let pipeline = pipeline(vec![p1.clone()], 1, Duration::from_secs(1), 1);
        let (handle, signal) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(90)).await;
            handle.cancel();
        });
        let outcomes = pipeline.dispatch((0..6).map(job).collect(), &signal).await;
        canceller.await.unwrap();

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        let abandoned = outcomes
            .iter()
            .filter(|o| o.status == DispatchStatus::Abandoned)
            .count();
        assert_eq!(outcomes.len(), 6);
        assert!(delivered >= 1);
        assert!(abandoned >= 1);
        assert_eq!(delivered + abandoned, 6);
        assert_eq!(p1.calls(), delivered);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_count_bounds_concurrency() {
        let p1 = ScriptedTransport::slow("p1", Duration::from_millis(40));
        let pipeline = pipeline(vec![p1], 1, Duration::from_secs(1), 2);
        let start = Instant::now();

        let outcomes = pipeline
            .dispatch((0..6).map(job).collect(), &CancelSignal::never())
            .await;

        assert!(outcomes.iter().all(DispatchOutcome::is_delivered));
        // Six 40ms sends on two workers take at least three rounds.
        assert!(start.elapsed() >= Duration::from_millis(110));
    }
}
