//! The periodic claim-and-dispatch driver (§4.4), its startup recovery sweep
//! (§4.6), and the `PROCESSING`-watchdog reclaim that resolves the §9 open
//! question about crashes between claim commit and queue publish.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::{Event, EventType, WorkItemDescriptor, WorkItemMetadata};
use crate::queue::WorkQueue;
use crate::repository::EventStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct Scheduler<S: EventStore> {
    store: Arc<S>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

/// Counters emitted as the tick's log fields (§4.4 step 4).
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub considered: usize,
    pub claimed: usize,
    pub publish_failures: usize,
    pub reclaimed: usize,
}

fn to_descriptor(event: &Event) -> WorkItemDescriptor {
    WorkItemDescriptor {
        event_id: event.id,
        event_type: event.event_type.clone(),
        idempotency_key: event.idempotency_key.clone(),
        metadata: WorkItemMetadata {
            owner_id: event.owner_id,
            target_timestamp_utc: event.target_timestamp_utc,
            delivery_payload: event.delivery_payload.clone(),
        },
    }
}

impl<S: EventStore> Scheduler<S> {
    pub fn new(
        store: Arc<S>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            config,
        }
    }

    /// `tick(now)` (§4.4): claims due `PENDING` events atomically and
    /// publishes a descriptor for each onto the Work Queue. Once
    /// `claim_ready_events` returns a row, this tick owns it — a publish
    /// failure is not retried locally; the row sits in `PROCESSING` until
    /// the watchdog or queue redrive picks it up.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, CoreError> {
        let now = self.clock.now();
        let claimed = self
            .store
            .claim_ready_events(self.config.claim_batch_limit, now)
            .await?;

        let mut report = TickReport {
            considered: claimed.len(),
            ..Default::default()
        };

        for event in &claimed {
            match self.queue.publish(to_descriptor(event)).await {
                Ok(()) => report.claimed += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    if e.is_transient() {
                        warn!(event_id = %event.id, error = %e, "publish failed, will retry via watchdog reclaim");
                    } else {
                        warn!(event_id = %event.id, error = %e, "publish failed non-transiently");
                    }
                }
            }
        }

        info!(
            considered = report.considered,
            claimed = report.claimed,
            publish_failures = report.publish_failures,
            "scheduler tick complete"
        );
        Ok(report)
    }

    /// The watchdog resolution of the §9 open question: on every tick (not
    /// just at startup, since the crash window can occur at any time),
    /// reclaims `PROCESSING` rows whose `updatedAt` is older than
    /// `processingReclaimThresholdSeconds` back to `PENDING`, so a Scheduler
    /// crash between claim commit and queue publish doesn't strand the row.
    #[instrument(skip(self))]
    pub async fn reclaim_stale_processing(&self) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let threshold = now
            - chrono::Duration::seconds(self.config.processing_reclaim_threshold_seconds);
        let reclaimed = self
            .store
            .reclaim_stale_processing(threshold, self.config.claim_batch_limit, now)
            .await?;
        if !reclaimed.is_empty() {
            warn!(count = reclaimed.len(), "reclaimed stale PROCESSING events");
        }
        Ok(reclaimed.len())
    }

    /// Recovery sweep (§4.6): on process startup, before the normal tick
    /// loop begins, enqueues any `PENDING` event whose target instant has
    /// already passed. Deliberately does not claim or transition status —
    /// deferring to the normal claim path means recovery inherits the
    /// atomic-claim and optimistic-lock guarantees and cannot create a
    /// second claimant for a row some other process already claimed.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<RecoveryReport, CoreError> {
        let now = self.clock.now();
        let missed = self
            .store
            .find_missed_events(self.config.recovery_batch_limit, now)
            .await?;

        if missed.is_empty() {
            info!("no missed events");
            return Ok(RecoveryReport::default());
        }

        let oldest = missed.first().map(|e| e.target_timestamp_utc);
        let newest = missed.last().map(|e| e.target_timestamp_utc);

        let mut publish_failures = 0;
        for event in &missed {
            if let Err(e) = self.queue.publish(to_descriptor(event)).await {
                publish_failures += 1;
                warn!(event_id = %event.id, error = %e, "recovery publish failed, will retry via watchdog reclaim");
            }
        }

        info!(
            count = missed.len(),
            oldest = ?oldest,
            newest = ?newest,
            publish_failures,
            "recovery sweep enqueued missed events"
        );

        Ok(RecoveryReport {
            count: missed.len(),
            oldest,
            newest,
            publish_failures,
        })
    }

    /// Whether `event_type` is one this Scheduler/Executor pair knows how to
    /// dispatch; a table-lookup stand-in for the strategy registry §9 calls
    /// for, kept trivial since `BIRTHDAY` is the only MVP variant.
    pub fn supports(event_type: &EventType) -> bool {
        matches!(event_type, EventType::Birthday)
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecoveryReport {
    pub count: usize,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    pub newest: Option<chrono::DateTime<chrono::Utc>>,
    pub publish_failures: usize,
}
