//! Utility functions for time conversions and floating point comparisons

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

/// Microseconds in one second
pub const USECS_PER_SEC: f64 = 1_000_000.0;

/// Convert a timestamp into microseconds since the Unix epoch, as used by the wire format
#[inline(always)]
pub fn timestamp_to_micros(t: &DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

/// Drop the sub-microsecond part of a timestamp
#[inline(always)]
pub fn truncate_to_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

/// Convert microseconds since the Unix epoch back into a timestamp
///
/// Returns `None` when the value is outside of the range representable by [`DateTime`].
#[inline(always)]
pub fn micros_to_timestamp(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Absolute distance between two timestamps in seconds
#[inline(always)]
pub fn seconds_between(a: &DateTime<Utc>, b: &DateTime<Utc>) -> f64 {
    a.timestamp_micros().abs_diff(b.timestamp_micros()) as f64 / USECS_PER_SEC
}

/// Absolute distance between two dates in days
#[inline(always)]
pub fn days_between(a: &NaiveDate, b: &NaiveDate) -> f64 {
    use chrono::Datelike;
    a.num_days_from_ce().abs_diff(b.num_days_from_ce()) as f64
}

/// Width of a closed interval, or zero if it is degenerate, inverted or NaN
#[inline(always)]
pub fn extent(min: f64, max: f64) -> f64 {
    let d = max - min;
    if d > 0.0 { d } else { 0.0 }
}

/// Clamp negative values (and NaN) to zero
#[inline(always)]
pub fn non_negative(v: f64) -> f64 {
    if v > 0.0 { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_micros_roundtrip() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let us = timestamp_to_micros(&t);
        assert_eq!(micros_to_timestamp(us), Some(t));
    }

    #[test]
    fn test_micros_out_of_range() {
        assert!(micros_to_timestamp(i64::MAX).is_none());
    }

    #[test]
    fn test_seconds_between_is_symmetric() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap();
        assert_eq!(seconds_between(&a, &b), 90.0);
        assert_eq!(seconds_between(&b, &a), 90.0);
    }

    #[test]
    fn test_days_between() {
        let a = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(days_between(&a, &b), 4.0, "2024 is a leap year");
    }

    #[test]
    fn test_extent_degenerate() {
        assert_eq!(extent(1.0, 3.5), 2.5);
        assert_eq!(extent(2.0, 2.0), 0.0);
        assert_eq!(extent(3.0, 2.0), 0.0);
        assert_eq!(extent(0.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_truncate_to_micros() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::TimeDelta::nanoseconds(1_500);
        let truncated = truncate_to_micros(t);
        assert_eq!(truncated.timestamp_subsec_nanos(), 1_000);
        assert_eq!(micros_to_timestamp(timestamp_to_micros(&t)), Some(truncated));
        assert_eq!(truncate_to_micros(truncated), truncated);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative(-2.0), 0.0);
        assert_eq!(non_negative(f64::NAN), 0.0);
        assert_eq!(non_negative(1.5), 1.5);
    }
}
