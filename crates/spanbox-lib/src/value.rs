//! Base values that spans are built from
//!
//! Every [`Span`](crate::Span) is generic over a [`SpanValue`]: a totally ordered scalar that
//! knows its wire tag, whether its domain is discrete, and how to measure distances.

use crate::utils;
use crate::{Result, SpanBoxError};

use bytes::{Buf, BufMut};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;

/// Instant in time, kept at microsecond resolution inside spans
pub type Timestamp = DateTime<Utc>;

/// Tag identifying the base type of a span on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum BaseType {
    Int4 = 1,
    Int8 = 2,
    Float8 = 3,
    Date = 4,
    TimestampTz = 5,
}

impl BaseType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Int4),
            2 => Some(Self::Int8),
            3 => Some(Self::Float8),
            4 => Some(Self::Date),
            5 => Some(Self::TimestampTz),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A totally ordered scalar usable as span bound
pub trait SpanValue: Copy + PartialEq + Debug + Send + Sync + 'static {
    const BASE_TYPE: BaseType;
    /// Discrete domains are canonicalized to `[lower, upper)`
    const DISCRETE: bool;
    /// Bytes taken by one value on the wire
    const ENCODED_LEN: usize;

    fn compare(&self, other: &Self) -> Ordering;

    /// Values that can never be a bound (NaN)
    fn is_valid(&self) -> bool {
        true
    }

    /// Representation stored in a span, finer resolutions are dropped
    fn normalize(self) -> Self {
        self
    }

    /// Next value of a discrete domain, `None` on overflow or for continuous domains
    fn successor(&self) -> Option<Self>;

    /// Projection onto the real line, used for widths and index keys
    fn to_f64(&self) -> f64;

    /// Absolute distance in the natural unit of the domain (seconds for timestamps, days for dates)
    fn distance(&self, other: &Self) -> f64;

    fn encode<B: BufMut>(&self, buf: &mut B);

    /// Reads one value. The caller guarantees `ENCODED_LEN` bytes are available.
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;

    fn min_of(self, other: Self) -> Self {
        if other.compare(&self) == Ordering::Less { other } else { self }
    }

    fn max_of(self, other: Self) -> Self {
        if other.compare(&self) == Ordering::Greater { other } else { self }
    }
}

impl SpanValue for i32 {
    const BASE_TYPE: BaseType = BaseType::Int4;
    const DISCRETE: bool = true;
    const ENCODED_LEN: usize = 4;

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn successor(&self) -> Option<Self> {
        self.checked_add(1)
    }

    fn to_f64(&self) -> f64 {
        *self as f64
    }

    fn distance(&self, other: &Self) -> f64 {
        self.abs_diff(*other) as f64
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        Ok(buf.get_i32_le())
    }
}

impl SpanValue for i64 {
    const BASE_TYPE: BaseType = BaseType::Int8;
    const DISCRETE: bool = true;
    const ENCODED_LEN: usize = 8;

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn successor(&self) -> Option<Self> {
        self.checked_add(1)
    }

    fn to_f64(&self) -> f64 {
        *self as f64
    }

    fn distance(&self, other: &Self) -> f64 {
        self.abs_diff(*other) as f64
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64_le(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        Ok(buf.get_i64_le())
    }
}

impl SpanValue for f64 {
    const BASE_TYPE: BaseType = BaseType::Float8;
    const DISCRETE: bool = false;
    const ENCODED_LEN: usize = 8;

    fn compare(&self, other: &Self) -> Ordering {
        // NaN never reaches a span, see `is_valid`
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }

    fn is_valid(&self) -> bool {
        !self.is_nan()
    }

    fn successor(&self) -> Option<Self> {
        None
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn distance(&self, other: &Self) -> f64 {
        (self - other).abs()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(*self);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let v = buf.get_f64_le();
        if v.is_nan() {
            return Err(SpanBoxError::InvalidArgument(
                "NaN is not a valid span bound".to_string(),
            ));
        }
        Ok(v)
    }
}

impl SpanValue for NaiveDate {
    const BASE_TYPE: BaseType = BaseType::Date;
    const DISCRETE: bool = true;
    const ENCODED_LEN: usize = 4;

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn successor(&self) -> Option<Self> {
        self.succ_opt()
    }

    fn to_f64(&self) -> f64 {
        self.num_days_from_ce() as f64
    }

    fn distance(&self, other: &Self) -> f64 {
        utils::days_between(self, other)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(self.num_days_from_ce());
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let days = buf.get_i32_le();
        NaiveDate::from_num_days_from_ce_opt(days).ok_or_else(|| {
            SpanBoxError::InvalidArgument(format!("date out of range: {days} days from CE"))
        })
    }
}

impl SpanValue for Timestamp {
    const BASE_TYPE: BaseType = BaseType::TimestampTz;
    const DISCRETE: bool = false;
    const ENCODED_LEN: usize = 8;

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn successor(&self) -> Option<Self> {
        None
    }

    fn normalize(self) -> Self {
        utils::truncate_to_micros(self)
    }

    fn to_f64(&self) -> f64 {
        utils::timestamp_to_micros(self) as f64
    }

    fn distance(&self, other: &Self) -> f64 {
        utils::seconds_between(self, other)
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64_le(utils::timestamp_to_micros(self));
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let micros = buf.get_i64_le();
        utils::micros_to_timestamp(micros).ok_or_else(|| {
            SpanBoxError::InvalidArgument(format!("timestamp out of range: {micros} us"))
        })
    }
}

/// Shift a timestamp by `delta`, saturating at the representable range
pub(crate) fn shift_timestamp(t: Timestamp, delta: TimeDelta) -> Timestamp {
    t.checked_add_signed(delta).unwrap_or(if delta > TimeDelta::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}
