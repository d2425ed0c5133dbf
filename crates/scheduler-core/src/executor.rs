//! Delivery of a single work item (§4.5): POST the webhook, classify the
//! response, retry transient failures with backoff, and finalize the event
//! row exactly once the outcome is durable.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::{CompletionOutcome, DeliveryOutcome, Event, EventStatus, WorkItemDescriptor};
use crate::repository::{EventStore, OwnerRepository};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct Executor<S, O>
where
    S: EventStore,
    O: OwnerRepository,
{
    store: Arc<S>,
    owners: Arc<O>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S, O> Executor<S, O>
where
    S: EventStore,
    O: OwnerRepository,
{
    pub fn new(store: Arc<S>, owners: Arc<O>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.webhook_timeout_millis))
            .build()
            .expect("static reqwest client config is always valid");
        Self {
            store,
            owners,
            http,
            clock,
            config,
        }
    }

    /// Processes one descriptor pulled off the Work Queue. Returns `Ok(true)`
    /// when the caller should acknowledge the message (a terminal transition
    /// was committed, or the row had already been finalized by someone else),
    /// and `Ok(false)` when the caller should leave it for queue redrive
    /// (all retries exhausted as transient, row not yet finalized).
    #[instrument(skip(self, descriptor), fields(event_id = %descriptor.event_id))]
    pub async fn process(&self, descriptor: &WorkItemDescriptor) -> Result<bool, CoreError> {
        let Some(event) = self.store.find_by_id(descriptor.event_id).await? else {
            // Row deleted (owner removed) since publish; nothing left to do.
            return Ok(true);
        };

        if event.status != EventStatus::Processing {
            // Already finalized by a prior attempt or reclaimed; either way
            // this delivery is stale and should be dropped off the queue.
            return Ok(true);
        }

        let target = event.target_timestamp_utc;
        let now = self.clock.now();
        let late_by = now.signed_duration_since(target);
        if late_by.num_milliseconds() > self.config.late_execution_grace_millis {
            warn!(
                late_execution = true,
                orig_target = %target,
                actual_execution = %now,
                late_by_ms = late_by.num_milliseconds(),
                "executing event past the on-time grace window"
            );
        }

        let (outcome, event) = self.deliver_with_retries(descriptor, event).await;

        match outcome {
            DeliveryOutcome::Success => {
                match self
                    .owners
                    .complete_and_chain_successor(event.id, event.version, now, now)
                    .await?
                {
                    CompletionOutcome::AlreadyFinalized => {
                        info!("event already finalized by another worker");
                    }
                    CompletionOutcome::Completed { successor, .. } => {
                        info!(
                            chained_successor = successor.is_some(),
                            "delivery succeeded, event completed"
                        );
                    }
                }
                Ok(true)
            }
            DeliveryOutcome::PermanentFailure { reason } => {
                let mut failed = event.clone();
                failed.status = EventStatus::Failed;
                failed.failure_reason = Some(reason.clone());
                failed.executed_at = Some(now);
                match self.store.update(&failed, now).await {
                    Ok(_) => {
                        warn!(reason = %reason, "delivery failed permanently, event marked FAILED");
                        Ok(true)
                    }
                    Err(CoreError::OptimisticLockConflict(_)) => {
                        info!("event already finalized by another worker before FAILED write landed");
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }
            DeliveryOutcome::TransientFailure { reason } => {
                warn!(reason = %reason, "delivery exhausted retries transiently, leaving for redrive");
                Ok(false)
            }
        }
    }

    /// Sends the webhook, retrying transient failures per the configured
    /// backoff sequence (§6), reusing `descriptor.idempotency_key` on every
    /// attempt so a receiver that itself dedupes on that header never sees
    /// more than one logical delivery. Persists `event.retry_count` after
    /// each transient attempt so the durable row reflects cumulative
    /// delivery attempts across redrives, not just the in-memory counter of
    /// this one descriptor processing.
    async fn deliver_with_retries(
        &self,
        descriptor: &WorkItemDescriptor,
        mut event: Event,
    ) -> (DeliveryOutcome, Event) {
        let backoff = &self.config.webhook_retry_backoff_millis_sequence;
        let attempts = backoff.len() + 1;

        let mut last = DeliveryOutcome::TransientFailure {
            reason: "no attempt made".to_string(),
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(backoff[attempt - 1])).await;
            }
            last = self.attempt_once(descriptor).await;
            match &last {
                DeliveryOutcome::Success | DeliveryOutcome::PermanentFailure { .. } => {
                    return (last, event);
                }
                DeliveryOutcome::TransientFailure { reason } => {
                    warn!(attempt, reason = %reason, "webhook attempt failed transiently");
                    event.retry_count += 1;
                    match self.store.update(&event, self.clock.now()).await {
                        Ok(updated) => event = updated,
                        Err(e) => warn!(
                            error = %e,
                            "failed to persist retry_count after a transient attempt"
                        ),
                    }
                }
            }
        }
        (last, event)
    }

    async fn attempt_once(&self, descriptor: &WorkItemDescriptor) -> DeliveryOutcome {
        let payload = &descriptor.metadata.delivery_payload;
        let body = serde_json::json!({ "message": payload.message() });

        let response = self
            .http
            .post(payload.webhook_url())
            .header("X-Idempotency-Key", &descriptor.idempotency_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) => classify_status(resp.status()),
            Err(e) if e.is_timeout() => DeliveryOutcome::TransientFailure {
                reason: "request timed out".to_string(),
            },
            Err(e) => DeliveryOutcome::TransientFailure {
                reason: e.to_string(),
            },
        }
    }
}

/// Classifies a webhook HTTP response per §4.5: 2xx succeeds; 408 and 429
/// are transient despite being 4xx; the rest of 4xx is permanent; 5xx is
/// transient.
fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Success
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryOutcome::TransientFailure {
            reason: format!("status {status}"),
        }
    } else if status.is_client_error() {
        DeliveryOutcome::PermanentFailure {
            reason: format!("status {status}"),
        }
    } else {
        DeliveryOutcome::TransientFailure {
            reason: format!("status {status}"),
        }
    }
}
