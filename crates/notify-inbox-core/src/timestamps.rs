//! Timestamp helpers.
//!
//! The inbox uses naive UTC datetimes end to end (the wire format carries
//! no timezone). Age arithmetic for the clear-old operation and the
//! `last_24h` counter lives here so every component derives cutoffs the
//! same way.

use chrono::{Duration, NaiveDateTime, Utc};

/// Current wall-clock time as naive UTC.
#[must_use]
pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Cutoff timestamp `days` days before `now`.
///
/// Items created strictly before the cutoff are "old" for clear-old
/// purposes; items at or after it are retained.
#[must_use]
pub fn cutoff_days_ago(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(days))
}
