//! The durable ledger (§4.2) plus the minimal owner-anchoring surface (§6)
//! that an external CRUD layer would call into. Split as two narrow traits
//! so the Scheduler/Executor depend only on `EventStore` and tests can
//! substitute doubles for either independently (§9).

use crate::error::CoreError;
use crate::models::{CompletionOutcome, Event, EventStatus, NewOwnerData, Owner, UpdateOwnerData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts a new row. Fails with `DuplicateKey` if `idempotencyKey` collides.
    async fn create(&self, event: Event) -> Result<Event, CoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError>;

    async fn find_by_owner_id(
        &self,
        owner_id: Uuid,
        status_filter: Option<EventStatus>,
    ) -> Result<Vec<Event>, CoreError>;

    /// Writes all mutable fields only if the row's stored version equals
    /// `event.version`, then increments version. `OptimisticLockConflict`
    /// otherwise. Rejects transitions not in the allowed DAG (§3 invariants).
    async fn update(&self, event: &Event, now: DateTime<Utc>) -> Result<Event, CoreError>;

    /// Atomically claims up to `limit` due `PENDING` rows via skip-locked
    /// select-for-update, transitioning each to `PROCESSING` (§4.2).
    async fn claim_ready_events(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError>;

    /// Read-only scan of past-due `PENDING` rows for the recovery sweep (§4.6).
    async fn find_missed_events(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError>;

    /// Watchdog (§9 open question, resolved): reclaims `PROCESSING` rows whose
    /// `updatedAt` is older than `threshold` back to `PENDING`, via the same
    /// skip-locked + optimistic-increment discipline as a claim.
    async fn reclaim_stale_processing(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError>;

    /// Cascade delete on owner removal.
    async fn delete_by_owner_id(&self, owner_id: Uuid) -> Result<u64, CoreError>;
}

/// Library-level operations an external owner-CRUD surface would call
/// (§6). Each mutating method materializes atomically with the owner write,
/// in a single transaction, per the Materializer's reschedule contract.
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn create_owner(
        &self,
        data: NewOwnerData,
        now: DateTime<Utc>,
    ) -> Result<(Owner, Event), CoreError>;

    async fn find_owner_by_id(&self, id: Uuid) -> Result<Option<Owner>, CoreError>;

    async fn find_owners(&self) -> Result<Vec<Owner>, CoreError>;

    /// Applies `data` to the owner; if `new_birthday` or `new_timezone` is
    /// set, re-targets any `PENDING` non-terminal event in the same
    /// transaction (`PROCESSING`/terminal events are left alone, §4.3).
    async fn update_owner(
        &self,
        id: Uuid,
        data: UpdateOwnerData,
        now: DateTime<Utc>,
    ) -> Result<Owner, CoreError>;

    /// Cascade-deletes the owner's events (via FK) and the owner row.
    async fn delete_owner(&self, id: Uuid) -> Result<(), CoreError>;

    /// On a `COMPLETED` `BIRTHDAY` event, materializes next year's successor
    /// in the same transaction as the terminal transition (§4.5 step 5).
    async fn complete_and_chain_successor(
        &self,
        event_id: Uuid,
        expected_version: i64,
        executed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CoreError>;
}
