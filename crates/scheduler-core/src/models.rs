use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid event status: {0}")]
pub struct ParseEventStatusError(String);

impl FromStr for EventStatus {
    type Err = ParseEventStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(EventStatus::Pending),
            "PROCESSING" => Ok(EventStatus::Processing),
            "COMPLETED" => Ok(EventStatus::Completed),
            "FAILED" => Ok(EventStatus::Failed),
            _ => Err(ParseEventStatusError(s.to_string())),
        }
    }
}

impl EventStatus {
    /// Whether `self -> next` is one of the three edges the state machine allows.
    pub fn can_transition_to(&self, next: &EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Pending, EventStatus::Processing)
                | (EventStatus::Processing, EventStatus::Completed)
                | (EventStatus::Processing, EventStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum EventType {
    Birthday,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid event type: {0}")]
pub struct ParseEventTypeError(String);

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BIRTHDAY" => Ok(EventType::Birthday),
            _ => Err(ParseEventTypeError(s.to_string())),
        }
    }
}

/// Reason the Materializer was invoked; drives which of the four materialization
/// paths in the owner-mutation contract applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationReason {
    Created,
    BirthdayChanged,
    TimezoneChanged,
    SuccessorOfCompleted,
}

/// Message text + webhook URL captured at materialization time, so a later
/// owner mutation cannot change what an already-materialized event delivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct DeliveryPayload(serde_json::Value);

impl DeliveryPayload {
    pub fn new(message: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self(serde_json::json!({
            "message": message.into(),
            "webhookUrl": webhook_url.into(),
        }))
    }

    pub fn message(&self) -> &str {
        self.0.get("message").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn webhook_url(&self) -> &str {
        self.0.get("webhookUrl").and_then(|v| v.as_str()).unwrap_or("")
    }
}

/// A durable record of a single scheduled delivery attempt-chain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub event_type: EventType,
    pub target_timestamp_utc: DateTime<Utc>,
    pub target_timestamp_local: Option<String>,
    pub target_timezone: String,
    pub status: EventStatus,
    pub version: i64,
    pub idempotency_key: String,
    pub delivery_payload: DeliveryPayload,
    pub executed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable-for-the-core snapshot of the external Owner entity, as the
/// Materializer and Time Service need it. The core persists a minimal
/// `owners` table only to anchor `owner_id` foreign keys and cascade deletes;
/// it is not a CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Owner {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub timezone: String,
    pub webhook_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOwnerData {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub timezone: String,
    pub webhook_url: String,
}

/// Fields the Materializer's reschedule contract accepts; either or both may
/// be supplied, and both must be applied atomically with event updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateOwnerData {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub new_birthday: Option<NaiveDate>,
    pub new_timezone: Option<String>,
    pub webhook_url: Option<String>,
}

/// The descriptor published onto the Work Queue by the Scheduler and consumed
/// by the Executor. Carries enough of the event to avoid a full re-read in the
/// common case; the Executor still re-reads before any terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemDescriptor {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub idempotency_key: String,
    pub metadata: WorkItemMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemMetadata {
    pub owner_id: Uuid,
    pub target_timestamp_utc: DateTime<Utc>,
    pub delivery_payload: DeliveryPayload,
}

/// Outcome of classifying a webhook HTTP response or transport error (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    PermanentFailure { reason: String },
    TransientFailure { reason: String },
}

/// Result of `complete_and_chain_successor` (§4.5 step 5): distinguishes a
/// lost optimistic-lock race (another worker already finalized the row) from
/// a genuine completion, which may or may not have chained a successor.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    AlreadyFinalized,
    Completed {
        event: Event,
        successor: Option<Event>,
    },
}
