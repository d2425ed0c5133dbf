use super::{EventStore, OwnerRepository};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::materializer::{self, OwnerFields};
use crate::models::{CompletionOutcome, Event, EventStatus, NewOwnerData, Owner, UpdateOwnerData};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// The transactional Postgres-backed implementation of the Event Store and
/// the minimal owner-anchoring surface (§4.2, §6, §10.1).
pub struct PgStore {
    pool: DbPool,
    /// Daily local delivery time-of-day, resolved once from `EngineConfig`
    /// (honors `deliveryTimeOverride`, §4.1) and reused by every
    /// materialization path.
    time_of_day: NaiveTime,
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err
                    .constraint()
                    .map(|c| c == constraint)
                    .unwrap_or(false)
        }
        _ => false,
    }
}

impl PgStore {
    pub fn new(pool: DbPool, time_of_day: NaiveTime) -> Self {
        Self { pool, time_of_day }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn find_owner_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Owner, CoreError> {
        sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(id.to_string()))
    }

    async fn insert_event_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> Result<Event, CoreError> {
        sqlx::query_as::<_, Event>(
            r#"INSERT INTO events (
                id, owner_id, event_type, target_timestamp_utc, target_timestamp_local,
                target_timezone, status, version, idempotency_key, delivery_payload,
                executed_at, failure_reason, retry_count, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *"#,
        )
        .bind(event.id)
        .bind(event.owner_id)
        .bind(&event.event_type)
        .bind(event.target_timestamp_utc)
        .bind(event.target_timestamp_local.clone())
        .bind(&event.target_timezone)
        .bind(&event.status)
        .bind(event.version)
        .bind(&event.idempotency_key)
        .bind(&event.delivery_payload)
        .bind(event.executed_at)
        .bind(&event.failure_reason)
        .bind(event.retry_count)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "events_idempotency_key_idx") {
                CoreError::DuplicateKey(event.idempotency_key.clone())
            } else {
                CoreError::Database(e)
            }
        })
    }

    fn new_event_for_owner(
        owner: &OwnerFields,
        time_of_day: NaiveTime,
        reference_instant: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Event, CoreError> {
        let plan = materializer::plan(owner, time_of_day, reference_instant)?;
        Ok(Event {
            id: Uuid::now_v7(),
            owner_id: owner.id,
            event_type: crate::models::EventType::Birthday,
            target_timestamp_utc: plan.target_timestamp_utc,
            target_timestamp_local: Some(plan.target_timestamp_local),
            target_timezone: plan.target_timezone,
            status: EventStatus::Pending,
            version: 0,
            idempotency_key: plan.idempotency_key,
            delivery_payload: plan.delivery_payload,
            executed_at: None,
            failure_reason: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn create(&self, event: Event) -> Result<Event, CoreError> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_event_in_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn find_by_owner_id(
        &self,
        owner_id: Uuid,
        status_filter: Option<EventStatus>,
    ) -> Result<Vec<Event>, CoreError> {
        let events = match status_filter {
            Some(status) => {
                sqlx::query_as::<_, Event>(
                    "SELECT * FROM events WHERE owner_id = $1 AND status = $2 ORDER BY target_timestamp_utc",
                )
                .bind(owner_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Event>(
                    "SELECT * FROM events WHERE owner_id = $1 ORDER BY target_timestamp_utc",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    async fn update(&self, event: &Event, now: DateTime<Utc>) -> Result<Event, CoreError> {
        let current = self
            .find_by_id(event.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(event.id.to_string()))?;

        if current.status != event.status && !current.status.can_transition_to(&event.status) {
            return Err(CoreError::IllegalTransition {
                from: format!("{:?}", current.status),
                to: format!("{:?}", event.status),
            });
        }

        let result = sqlx::query_as::<_, Event>(
            r#"UPDATE events SET
                status = $1, target_timestamp_utc = $2, target_timestamp_local = $3,
                target_timezone = $4, idempotency_key = $5, delivery_payload = $6,
                executed_at = $7, failure_reason = $8, retry_count = $9,
                version = version + 1, updated_at = $10
            WHERE id = $11 AND version = $12
            RETURNING *"#,
        )
        .bind(&event.status)
        .bind(event.target_timestamp_utc)
        .bind(event.target_timestamp_local.clone())
        .bind(&event.target_timezone)
        .bind(&event.idempotency_key)
        .bind(&event.delivery_payload)
        .bind(event.executed_at)
        .bind(&event.failure_reason)
        .bind(event.retry_count)
        .bind(now)
        .bind(event.id)
        .bind(event.version)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or_else(|| CoreError::OptimisticLockConflict(event.id.to_string()))
    }

    async fn claim_ready_events(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query_as::<_, Event>(
            r#"WITH due AS (
                SELECT id FROM events
                WHERE status = 'PENDING' AND target_timestamp_utc <= $1
                ORDER BY target_timestamp_utc ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE events e
            SET status = 'PROCESSING', version = version + 1, updated_at = $1
            FROM due
            WHERE e.id = due.id
            RETURNING e.*"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut claimed = claimed;
        claimed.sort_by_key(|e| e.target_timestamp_utc);
        Ok(claimed)
    }

    async fn find_missed_events(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as::<_, Event>(
            r#"SELECT * FROM events
            WHERE status = 'PENDING' AND target_timestamp_utc < $1
            ORDER BY target_timestamp_utc ASC
            LIMIT $2"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn reclaim_stale_processing(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let mut tx = self.pool.begin().await?;
        let reclaimed = sqlx::query_as::<_, Event>(
            r#"WITH stale AS (
                SELECT id FROM events
                WHERE status = 'PROCESSING' AND updated_at < $1
                ORDER BY updated_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE events e
            SET status = 'PENDING', version = version + 1, updated_at = $3
            FROM stale
            WHERE e.id = stale.id
            RETURNING e.*"#,
        )
        .bind(threshold)
        .bind(limit)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(reclaimed)
    }

    async fn delete_by_owner_id(&self, owner_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM events WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OwnerRepository for PgStore {
    async fn create_owner(
        &self,
        data: NewOwnerData,
        now: DateTime<Utc>,
    ) -> Result<(Owner, Event), CoreError> {
        let mut tx = self.pool.begin().await?;

        let owner_id = Uuid::now_v7();
        let owner = sqlx::query_as::<_, Owner>(
            r#"INSERT INTO owners (id, first_name, last_name, date_of_birth, timezone, webhook_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *"#,
        )
        .bind(owner_id)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(data.date_of_birth)
        .bind(&data.timezone)
        .bind(&data.webhook_url)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let fields = OwnerFields::from(&owner);
        let event = Self::new_event_for_owner(&fields, self.time_of_day, now, now)?;
        let event = Self::insert_event_in_tx(&mut tx, &event).await?;

        tx.commit().await?;
        Ok((owner, event))
    }

    async fn find_owner_by_id(&self, id: Uuid) -> Result<Option<Owner>, CoreError> {
        let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn find_owners(&self) -> Result<Vec<Owner>, CoreError> {
        let owners = sqlx::query_as::<_, Owner>("SELECT * FROM owners ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(owners)
    }

    async fn update_owner(
        &self,
        id: Uuid,
        data: UpdateOwnerData,
        now: DateTime<Utc>,
    ) -> Result<Owner, CoreError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::find_owner_in_tx(&mut tx, id).await?;
        let first_name = data.first_name.unwrap_or(current.first_name);
        let last_name = data.last_name.unwrap_or(current.last_name);
        let date_of_birth = data.new_birthday.unwrap_or(current.date_of_birth);
        let timezone = data.new_timezone.clone().unwrap_or(current.timezone.clone());
        let webhook_url = data.webhook_url.unwrap_or(current.webhook_url);

        let reschedule_needed = data.new_birthday.is_some() || data.new_timezone.is_some();

        let owner = sqlx::query_as::<_, Owner>(
            r#"UPDATE owners SET first_name = $1, last_name = $2, date_of_birth = $3,
                timezone = $4, webhook_url = $5, updated_at = $6
            WHERE id = $7
            RETURNING *"#,
        )
        .bind(&first_name)
        .bind(&last_name)
        .bind(date_of_birth)
        .bind(&timezone)
        .bind(&webhook_url)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if reschedule_needed {
            let pending: Vec<Event> = sqlx::query_as::<_, Event>(
                "SELECT * FROM events WHERE owner_id = $1 AND status = 'PENDING'",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            let fields = OwnerFields::from(&owner);
            for existing in pending {
                let plan = materializer::plan(&fields, self.time_of_day, now)?;
                sqlx::query(
                    r#"UPDATE events SET
                        target_timestamp_utc = $1, target_timestamp_local = $2,
                        target_timezone = $3, idempotency_key = $4,
                        version = version + 1, updated_at = $5
                    WHERE id = $6 AND version = $7"#,
                )
                .bind(plan.target_timestamp_utc)
                .bind(plan.target_timestamp_local)
                .bind(&plan.target_timezone)
                .bind(&plan.idempotency_key)
                .bind(now)
                .bind(existing.id)
                .bind(existing.version)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e, "events_idempotency_key_idx") {
                        CoreError::DuplicateKey(plan.idempotency_key.clone())
                    } else {
                        CoreError::Database(e)
                    }
                })?;
            }
        }

        tx.commit().await?;
        Ok(owner)
    }

    async fn delete_owner(&self, id: Uuid) -> Result<(), CoreError> {
        // `events.owner_id` cascades on delete (§3 invariants), so the FK
        // takes care of removing the owner's event rows.
        let result = sqlx::query("DELETE FROM owners WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::OwnerNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn complete_and_chain_successor(
        &self,
        event_id: Uuid,
        expected_version: i64,
        executed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CoreError> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query_as::<_, Event>(
            r#"UPDATE events SET status = 'COMPLETED', executed_at = $1,
                version = version + 1, updated_at = $1
            WHERE id = $2 AND version = $3 AND status = 'PROCESSING'
            RETURNING *"#,
        )
        .bind(executed_at)
        .bind(event_id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(completed) = completed else {
            // Another worker already finalized this row; nothing to chain.
            tx.rollback().await?;
            return Ok(CompletionOutcome::AlreadyFinalized);
        };

        if completed.event_type != crate::models::EventType::Birthday {
            tx.commit().await?;
            return Ok(CompletionOutcome::Completed {
                event: completed,
                successor: None,
            });
        }

        let owner = match Self::find_owner_in_tx(&mut tx, completed.owner_id).await {
            Ok(owner) => owner,
            Err(CoreError::OwnerNotFound(_)) => {
                // Owner was deleted concurrently; the completion itself still
                // stands, there's just nothing left to chain a successor to.
                tx.commit().await?;
                return Ok(CompletionOutcome::Completed {
                    event: completed,
                    successor: None,
                });
            }
            Err(e) => return Err(e),
        };
        let fields = OwnerFields::from(&owner);
        let successor = Self::new_event_for_owner(&fields, self.time_of_day, now, now)?;
        let successor = Self::insert_event_in_tx(&mut tx, &successor).await?;

        tx.commit().await?;
        Ok(CompletionOutcome::Completed {
            event: completed,
            successor: Some(successor),
        })
    }
}

/// Counts events in a given status. Exposed publicly so integration tests
/// under `tests/` can assert on store state without duplicating the query.
pub async fn count_events_with_status(pool: &DbPool, status: EventStatus) -> i64 {
    use sqlx::Row;
    let row = sqlx::query("SELECT COUNT(*) AS n FROM events WHERE status = $1")
        .bind(status)
        .fetch_one(pool)
        .await
        .expect("count query succeeds");
    row.get::<i64, _>("n")
}
