//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// `now`, or one microsecond after `last` when the clock has not moved past it
///
/// Keeps creation times strictly increasing across clock stalls and small
/// backward steps.
pub fn next_monotonic(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}
