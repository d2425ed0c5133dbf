//! Pure, side-effect-free calculations over the IANA timezone database.
//!
//! Nothing here touches the wall clock, the database, or the network — every
//! function takes its reference instant as an argument, per the time-injection
//! rule: the core never reads `Utc::now()` itself.

use crate::error::CoreError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Validates an IANA timezone identifier.
pub fn validate_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// Resolves a local wall-clock date/time in `timezone` to its UTC instant.
///
/// Spring-forward gap (the wall time does not exist): resolves to the instant
/// immediately after the gap. Fall-back overlap (the wall time is ambiguous):
/// resolves to the *earlier*, pre-transition occurrence. Both rules are fixed
/// so callers get deterministic results across DST boundaries.
pub fn convert_to_utc(local: NaiveDateTime, timezone: &str) -> Result<DateTime<Utc>, CoreError> {
    let tz = validate_timezone(timezone)?;
    Ok(resolve_local(&tz, local).with_timezone(&Utc))
}

fn resolve_local(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt,
        None => {
            // Spring-forward gap: the wall clock jumped past `local`. Stepping
            // forward an hour at a time always lands on the far side of a
            // one-hour DST gap (the only gap size IANA zones use).
            let shifted = local + chrono::Duration::hours(1);
            match tz.from_local_datetime(&shifted).earliest() {
                Some(dt) => dt,
                None => tz.from_local_datetime(&(shifted + chrono::Duration::hours(1)))
                    .earliest()
                    .expect("two-hour shift escapes any real DST gap"),
            }
        }
    }
}

/// `nextOccurrence`: the next UTC instant at which `timeOfDay` local wall time
/// falls on `dateOfBirth`'s month/day in `timezone`, strictly after
/// `referenceInstant`.
///
/// Feb 29 in a non-leap year resolves to Feb 28 (documented policy, not a
/// silent shift to Mar 1).
pub fn next_occurrence(
    date_of_birth: NaiveDate,
    timezone: &str,
    time_of_day: NaiveTime,
    reference_instant: DateTime<Utc>,
) -> Result<DateTime<Utc>, CoreError> {
    let tz = validate_timezone(timezone)?;
    let reference_local = reference_instant.with_timezone(&tz);
    let mut year = reference_local.year();

    loop {
        let (month, day) = anniversary_month_day(date_of_birth, year);
        let naive_date = NaiveDate::from_ymd_opt(year, month, day)
            .expect("anniversary_month_day always yields a valid calendar date");
        let candidate_local = naive_date.and_time(time_of_day);
        let candidate_utc = resolve_local(&tz, candidate_local).with_timezone(&Utc);

        if candidate_utc > reference_instant {
            return Ok(candidate_utc);
        }
        year += 1;
    }
}

/// Renders a UTC instant as an RFC 3339 timestamp in `timezone`'s local wall
/// clock, for audit/debug display (§4.3) alongside the UTC instant that
/// actually drives scheduling.
pub fn render_local(instant: DateTime<Utc>, timezone: &str) -> Result<String, CoreError> {
    let tz = validate_timezone(timezone)?;
    Ok(instant.with_timezone(&tz).to_rfc3339())
}

/// Maps a date of birth onto `(month, day)` for the anniversary in `year`,
/// applying the Feb 29 -> Feb 28 fallback when `year` is not a leap year.
fn anniversary_month_day(date_of_birth: NaiveDate, year: i32) -> (u32, u32) {
    let month = date_of_birth.month();
    let day = date_of_birth.day();
    if month == 2 && day == 29 && !is_leap_year(year) {
        (2, 28)
    } else {
        (month, day)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
