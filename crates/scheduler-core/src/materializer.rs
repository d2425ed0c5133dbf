//! Materialization rules (§4.3): pure functions that turn an owner snapshot
//! into the fields of a concrete `BIRTHDAY` event. Kept side-effect-free per
//! the domain/side-effect separation note in §9 — the repository layer is
//! responsible for actually writing the rows these functions describe.

use crate::error::CoreError;
use crate::models::{DeliveryPayload, Owner};
use crate::time_service;
use chrono::{DateTime, NaiveTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// The subset of an owner's fields the Materializer needs; decoupled from the
/// `Owner` row type so callers building a plan from not-yet-persisted data
/// (e.g. `create_owner` before the row exists) don't need a full `Owner`.
#[derive(Debug, Clone)]
pub struct OwnerFields {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: chrono::NaiveDate,
    pub timezone: String,
    pub webhook_url: String,
}

impl From<&Owner> for OwnerFields {
    fn from(owner: &Owner) -> Self {
        Self {
            id: owner.id,
            first_name: owner.first_name.clone(),
            last_name: owner.last_name.clone(),
            date_of_birth: owner.date_of_birth,
            timezone: owner.timezone.clone(),
            webhook_url: owner.webhook_url.clone(),
        }
    }
}

/// Everything the repository layer needs to insert or update a `BIRTHDAY`
/// event row, computed by pure functions over an owner snapshot.
#[derive(Debug, Clone)]
pub struct MaterializationPlan {
    pub target_timestamp_utc: DateTime<Utc>,
    pub target_timestamp_local: String,
    pub target_timezone: String,
    pub idempotency_key: String,
    pub delivery_payload: DeliveryPayload,
}

/// `computeNextOccurrence`: delegates to the Time Service.
pub fn compute_next_occurrence(
    owner: &OwnerFields,
    time_of_day: NaiveTime,
    reference_instant: DateTime<Utc>,
) -> Result<DateTime<Utc>, CoreError> {
    time_service::next_occurrence(
        owner.date_of_birth,
        &owner.timezone,
        time_of_day,
        reference_instant,
    )
}

/// `composePayload`: the birthday message plus the webhook URL captured at
/// materialization time, so a later owner mutation cannot change what an
/// already-materialized event delivers.
pub fn compose_payload(owner: &OwnerFields) -> DeliveryPayload {
    DeliveryPayload::new(
        format!(
            "Hey, {} {} it's your birthday",
            owner.first_name, owner.last_name
        ),
        owner.webhook_url.clone(),
    )
}

/// `idempotencyKey(ownerId, targetInstant)`: deterministic across retries and
/// re-materializations with identical inputs, so replays collide (§3, §8.5).
/// Uses a SHA-256 digest of `ownerId || "|" || ISO(targetInstant)`, truncated
/// to 64 bits, hex-encoded.
pub fn idempotency_key(owner_id: Uuid, target_instant: DateTime<Utc>) -> String {
    let input = format!("{}|{}", owner_id, target_instant.to_rfc3339());
    let digest = Sha256::digest(input.as_bytes());
    let truncated = u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"));
    format!("event-{truncated:016x}")
}

/// Computes the full set of fields needed to insert or update a `BIRTHDAY`
/// event for `owner`, anchored at `reference_instant`.
pub fn plan(
    owner: &OwnerFields,
    time_of_day: NaiveTime,
    reference_instant: DateTime<Utc>,
) -> Result<MaterializationPlan, CoreError> {
    let target_timestamp_utc = compute_next_occurrence(owner, time_of_day, reference_instant)?;
    let target_timestamp_local = time_service::render_local(target_timestamp_utc, &owner.timezone)?;
    Ok(MaterializationPlan {
        target_timestamp_utc,
        target_timestamp_local,
        target_timezone: owner.timezone.clone(),
        idempotency_key: idempotency_key(owner.id, target_timestamp_utc),
        delivery_payload: compose_payload(owner),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn owner() -> OwnerFields {
        OwnerFields {
            id: Uuid::nil(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
            timezone: "America/New_York".to_string(),
            webhook_url: "https://example.com/hooks/john".to_string(),
        }
    }

    fn nine_am() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let target = Utc.with_ymd_and_hms(2025, 3, 15, 13, 0, 0).unwrap();
        let a = idempotency_key(Uuid::nil(), target);
        let b = idempotency_key(Uuid::nil(), target);
        assert_eq!(a, b);
        assert!(a.starts_with("event-"));
    }

    #[test]
    fn idempotency_key_differs_across_owners() {
        let target = Utc.with_ymd_and_hms(2025, 3, 15, 13, 0, 0).unwrap();
        let a = idempotency_key(Uuid::nil(), target);
        let b = idempotency_key(Uuid::max(), target);
        assert_ne!(a, b);
    }

    #[test]
    fn compose_payload_renders_the_birthday_message() {
        let payload = compose_payload(&owner());
        assert_eq!(payload.message(), "Hey, John Doe it's your birthday");
        assert_eq!(payload.webhook_url(), "https://example.com/hooks/john");
    }

    #[test]
    fn plan_derives_all_fields_from_next_occurrence() {
        let reference = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let plan = plan(&owner(), nine_am(), reference).unwrap();
        assert_eq!(
            plan.target_timestamp_utc,
            Utc.with_ymd_and_hms(2025, 3, 15, 13, 0, 0).unwrap()
        );
        assert_eq!(plan.target_timezone, "America/New_York");
        assert_eq!(
            plan.idempotency_key,
            idempotency_key(Uuid::nil(), plan.target_timestamp_utc)
        );
        assert_eq!(plan.target_timestamp_local, "2025-03-15T09:00:00-04:00");
    }
}
