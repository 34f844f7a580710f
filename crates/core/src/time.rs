use chrono::{DateTime, Utc};

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Whole seconds since the Unix epoch, the resolution dictionaries are stored at.
#[must_use]
pub fn to_unix_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Inverse of [`to_unix_seconds`]; `None` when the value is outside chrono's range.
#[must_use]
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_seconds_round_trip() {
        let now = fixed_now();
        assert_eq!(from_unix_seconds(to_unix_seconds(now)), Some(now));
    }

    #[test]
    fn out_of_range_seconds_are_rejected() {
        assert!(from_unix_seconds(i64::MAX).is_none());
    }
}
