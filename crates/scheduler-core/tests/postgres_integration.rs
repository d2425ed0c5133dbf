//! Integration tests against a real Postgres instance (§10.6). Gated on
//! `DATABASE_URL` since there's no throwaway-file equivalent for Postgres;
//! each test truncates its own tables first so runs don't interfere with
//! each other.

use chrono::{NaiveDate, TimeZone, Utc};
use scheduler_core::db;
use scheduler_core::models::{EventStatus, NewOwnerData, UpdateOwnerData};
use scheduler_core::repository::{EventStore, OwnerRepository, PgStore};
use sqlx::PgPool;

async fn test_store() -> Option<PgStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = db::establish_connection(&database_url)
        .await
        .expect("failed to connect to test database");
    reset_schema(&pool).await;
    Some(PgStore::new(pool, chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap()))
}

async fn reset_schema(pool: &PgPool) {
    sqlx::query("TRUNCATE events, owners CASCADE")
        .execute(pool)
        .await
        .expect("failed to truncate test tables");
}

fn owner_data(timezone: &str) -> NewOwnerData {
    NewOwnerData {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
        timezone: timezone.to_string(),
        webhook_url: "https://example.com/hooks/ada".to_string(),
    }
}

#[tokio::test]
async fn create_owner_materializes_a_pending_birthday_event() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (owner, event) = store
        .create_owner(owner_data("America/New_York"), now)
        .await
        .unwrap();

    assert_eq!(event.owner_id, owner.id);
    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(
        event.target_timestamp_utc,
        Utc.with_ymd_and_hms(2025, 3, 15, 13, 0, 0).unwrap()
    );

    let found = store.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(found.idempotency_key, event.idempotency_key);
}

#[tokio::test]
async fn claim_ready_events_transitions_to_processing_exactly_once() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (_owner, event) = store
        .create_owner(owner_data("UTC"), created_at)
        .await
        .unwrap();

    let due = event.target_timestamp_utc + chrono::Duration::seconds(1);
    let claimed = store.claim_ready_events(100, due).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, EventStatus::Processing);
    assert_eq!(claimed[0].version, event.version + 1);

    // A second claim at the same instant finds nothing left to claim.
    let second = store.claim_ready_events(100, due).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn update_with_stale_version_is_rejected() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (_owner, event) = store.create_owner(owner_data("UTC"), now).await.unwrap();

    let claimed = store
        .claim_ready_events(10, event.target_timestamp_utc)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    // Presenting the pre-claim version should fail: the stored version moved.
    let mut stale = event.clone();
    stale.status = EventStatus::Processing;
    let err = store.update(&stale, now).await.unwrap_err();
    assert!(matches!(
        err,
        scheduler_core::error::CoreError::OptimisticLockConflict(_)
    ));
}

#[tokio::test]
async fn deleting_an_owner_cascades_to_its_events() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (owner, event) = store.create_owner(owner_data("UTC"), now).await.unwrap();

    store.delete_owner(owner.id).await.unwrap();

    assert!(store.find_by_id(event.id).await.unwrap().is_none());
    assert!(store.find_owner_by_id(owner.id).await.unwrap().is_none());
}

#[tokio::test]
async fn timezone_change_reschedules_the_pending_event_atomically() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (owner, original_event) = store
        .create_owner(owner_data("America/New_York"), now)
        .await
        .unwrap();

    store
        .update_owner(
            owner.id,
            UpdateOwnerData {
                new_timezone: Some("Asia/Tokyo".to_string()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

    let rescheduled = store.find_by_id(original_event.id).await.unwrap().unwrap();
    assert_eq!(rescheduled.target_timezone, "Asia/Tokyo");
    assert_ne!(
        rescheduled.target_timestamp_utc,
        original_event.target_timestamp_utc
    );
    assert_ne!(rescheduled.idempotency_key, original_event.idempotency_key);
}

#[tokio::test]
async fn completion_chains_a_successor_event_for_next_year() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (owner, event) = store.create_owner(owner_data("UTC"), now).await.unwrap();

    let claimed = store
        .claim_ready_events(10, event.target_timestamp_utc)
        .await
        .unwrap();
    let processing = &claimed[0];

    let outcome = store
        .complete_and_chain_successor(
            processing.id,
            processing.version,
            processing.target_timestamp_utc,
            processing.target_timestamp_utc,
        )
        .await
        .unwrap();

    let scheduler_core::models::CompletionOutcome::Completed { event: completed, successor } = outcome
    else {
        panic!("expected a completion, not AlreadyFinalized");
    };
    assert_eq!(completed.status, EventStatus::Completed);
    let successor = successor.expect("a BIRTHDAY completion always chains a successor");
    assert_eq!(successor.owner_id, owner.id);
    assert_eq!(successor.status, EventStatus::Pending);
    assert_eq!(
        successor.target_timestamp_utc,
        event.target_timestamp_utc + chrono::Duration::days(365)
    );
}

#[tokio::test]
async fn reclaim_stale_processing_reverts_rows_past_the_threshold() {
    let Some(store) = test_store().await else {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    };

    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let (_owner, event) = store.create_owner(owner_data("UTC"), now).await.unwrap();
    store
        .claim_ready_events(10, event.target_timestamp_utc)
        .await
        .unwrap();

    let much_later = event.target_timestamp_utc + chrono::Duration::hours(1);
    let threshold = much_later - chrono::Duration::minutes(5);
    let reclaimed = store
        .reclaim_stale_processing(threshold, 100, much_later)
        .await
        .unwrap();

    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].status, EventStatus::Pending);
}
