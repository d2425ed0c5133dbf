//! The Work Queue (§6, §10.5): a narrow `publish`/`receive`/`acknowledge`/
//! `negative_acknowledge` trait so the Scheduler, Executor, and recovery
//! sweep are written against an interface that a managed queue (SQS, etc.)
//! could later satisfy without touching their code. `InProcessQueue` is a
//! fully functional substitute — visibility timeout, receive counting, and
//! dead-letter redrive included — not a stub; provisioning a managed queue
//! is simply out of scope here.

use crate::clock::Clock;
use crate::error::CoreError;
use crate::models::WorkItemDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque handle returned by `receive`, required to `acknowledge` or
/// `negative_acknowledge` a specific delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(Uuid);

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a descriptor. Fails with `CoreError::QueuePublishFailure` if
    /// the underlying transport rejects the message (backpressure, a
    /// managed queue's API error, this implementation's depth cap) — callers
    /// (§4.4, §7) must treat that as retryable on the next tick rather than
    /// assume the claim was also rolled back.
    async fn publish(&self, descriptor: WorkItemDescriptor) -> Result<(), CoreError>;
    async fn receive(&self, max_messages: usize) -> Vec<(WorkItemDescriptor, ReceiptHandle)>;
    async fn acknowledge(&self, receipt: ReceiptHandle);
    async fn negative_acknowledge(&self, receipt: ReceiptHandle);
    /// Descriptors redriven past `maxReceiveCount` (§6); surfaced for
    /// operator visibility, not consumed by the normal claim/execute path.
    async fn dead_letters(&self) -> Vec<WorkItemDescriptor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    Ready,
    InFlight { visible_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
struct Message {
    descriptor: WorkItemDescriptor,
    receive_count: u32,
    state: MessageState,
}

#[derive(Default)]
struct QueueState {
    ready_order: VecDeque<Uuid>,
    messages: HashMap<Uuid, Message>,
    dead_letters: Vec<WorkItemDescriptor>,
}

/// `tokio::sync::Mutex`-guarded in-process implementation (§10.5).
pub struct InProcessQueue {
    state: Mutex<QueueState>,
    visibility_timeout: chrono::Duration,
    max_receive_count: u32,
    max_depth: usize,
    clock: Arc<dyn Clock>,
}

impl InProcessQueue {
    pub fn new(
        visibility_timeout: chrono::Duration,
        max_receive_count: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            max_receive_count,
            max_depth: usize::MAX,
            clock,
        }
    }

    /// Bounds how many messages (ready + in-flight, excluding dead letters)
    /// the queue holds at once. A managed queue has its own backpressure;
    /// this gives the in-process stand-in the same failure mode so
    /// `publish` can genuinely reject work instead of growing unbounded.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Moves any `InFlight` message whose visibility window has elapsed back
    /// to `Ready`, or to the dead-letter queue if it has already been
    /// received `maxReceiveCount` times.
    fn redrive_expired(state: &mut QueueState, now: DateTime<Utc>, max_receive_count: u32) {
        let expired: Vec<Uuid> = state
            .messages
            .iter()
            .filter_map(|(id, msg)| match msg.state {
                MessageState::InFlight { visible_at } if visible_at <= now => Some(*id),
                _ => None,
            })
            .collect();

        for id in expired {
            let msg = state.messages.get(&id).expect("id came from the map");
            if msg.receive_count >= max_receive_count {
                let msg = state.messages.remove(&id).expect("checked above");
                state.dead_letters.push(msg.descriptor);
            } else {
                state.messages.get_mut(&id).unwrap().state = MessageState::Ready;
                state.ready_order.push_back(id);
            }
        }
    }
}

#[async_trait]
impl WorkQueue for InProcessQueue {
    async fn publish(&self, descriptor: WorkItemDescriptor) -> Result<(), CoreError> {
        let id = Uuid::now_v7();
        let mut state = self.state.lock().await;
        if state.messages.len() >= self.max_depth {
            return Err(CoreError::QueuePublishFailure(format!(
                "queue at capacity ({} messages)",
                self.max_depth
            )));
        }
        state.messages.insert(
            id,
            Message {
                descriptor,
                receive_count: 0,
                state: MessageState::Ready,
            },
        );
        state.ready_order.push_back(id);
        Ok(())
    }

    async fn receive(&self, max_messages: usize) -> Vec<(WorkItemDescriptor, ReceiptHandle)> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Self::redrive_expired(&mut state, now, self.max_receive_count);

        let mut out = Vec::with_capacity(max_messages);
        while out.len() < max_messages {
            let Some(id) = state.ready_order.pop_front() else {
                break;
            };
            let Some(msg) = state.messages.get_mut(&id) else {
                continue;
            };
            if msg.state != MessageState::Ready {
                // Already redelivered/acked between enqueue and pop; skip.
                continue;
            }
            msg.receive_count += 1;
            msg.state = MessageState::InFlight {
                visible_at: now + self.visibility_timeout,
            };
            out.push((msg.descriptor.clone(), ReceiptHandle(id)));
        }
        out
    }

    async fn acknowledge(&self, receipt: ReceiptHandle) {
        let mut state = self.state.lock().await;
        state.messages.remove(&receipt.0);
    }

    async fn negative_acknowledge(&self, receipt: ReceiptHandle) {
        let mut state = self.state.lock().await;
        if let Some(msg) = state.messages.get_mut(&receipt.0) {
            msg.state = MessageState::Ready;
            state.ready_order.push_back(receipt.0);
        }
    }

    async fn dead_letters(&self) -> Vec<WorkItemDescriptor> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{DeliveryPayload, EventType, WorkItemMetadata};
    use chrono::TimeZone;

    fn descriptor() -> WorkItemDescriptor {
        WorkItemDescriptor {
            event_id: Uuid::now_v7(),
            event_type: EventType::Birthday,
            idempotency_key: "event-deadbeefdeadbeef".to_string(),
            metadata: WorkItemMetadata {
                owner_id: Uuid::now_v7(),
                target_timestamp_utc: Utc::now(),
                delivery_payload: DeliveryPayload::new("hi", "https://example.com"),
            },
        }
    }

    #[tokio::test]
    async fn publish_then_receive_then_ack_drains_the_queue() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let queue = InProcessQueue::new(chrono::Duration::seconds(30), 3, clock);
        queue.publish(descriptor()).await.unwrap();

        let received = queue.receive(10).await;
        assert_eq!(received.len(), 1);
        assert!(queue.receive(10).await.is_empty());

        queue.acknowledge(received[0].1).await;
        assert!(queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn unacked_message_redrives_after_visibility_timeout() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let queue = InProcessQueue::new(chrono::Duration::seconds(30), 3, clock.clone());
        queue.publish(descriptor()).await.unwrap();

        let first = queue.receive(10).await;
        assert_eq!(first.len(), 1);
        assert!(queue.receive(10).await.is_empty());

        clock.advance(chrono::Duration::seconds(31));
        let redriven = queue.receive(10).await;
        assert_eq!(redriven.len(), 1);
        assert_eq!(redriven[0].0.idempotency_key, first[0].0.idempotency_key);
    }

    #[tokio::test]
    async fn exceeding_max_receive_count_moves_to_dead_letter() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let queue = InProcessQueue::new(chrono::Duration::seconds(1), 2, clock.clone());
        queue.publish(descriptor()).await.unwrap();

        for _ in 0..2 {
            let received = queue.receive(10).await;
            assert_eq!(received.len(), 1);
            clock.advance(chrono::Duration::seconds(2));
        }

        // Third attempt: the message has now been received twice without ack;
        // the redrive scan moves it to the dead-letter queue instead.
        assert!(queue.receive(10).await.is_empty());
        assert_eq!(queue.dead_letters().await.len(), 1);
    }

    #[tokio::test]
    async fn negative_acknowledge_makes_the_message_immediately_redeliverable() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let queue = InProcessQueue::new(chrono::Duration::seconds(30), 3, clock);
        queue.publish(descriptor()).await.unwrap();

        let received = queue.receive(10).await;
        queue.negative_acknowledge(received[0].1).await;

        let redelivered = queue.receive(10).await;
        assert_eq!(redelivered.len(), 1);
    }

    #[tokio::test]
    async fn publish_past_max_depth_fails_with_queue_publish_failure() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let queue = InProcessQueue::new(chrono::Duration::seconds(30), 3, clock).with_max_depth(1);
        queue.publish(descriptor()).await.unwrap();

        let err = queue.publish(descriptor()).await.unwrap_err();
        assert!(matches!(err, CoreError::QueuePublishFailure(_)));
        assert!(err.is_transient());
    }
}
