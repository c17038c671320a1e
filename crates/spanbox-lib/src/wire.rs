//! Binary layout of spans, span sets and boxes
//!
//! Every value starts with a one-byte type tag. Integers and floats are little-endian.
//!
//! | Value     | Layout                                                                  |
//! |-----------|-------------------------------------------------------------------------|
//! | `Span`    | tag `1`, bound flags, base type, lower, upper                           |
//! | `SpanSet` | tag `2`, `u32` count, `count` span bodies (flags, base type, bounds)     |
//! | `StBox`   | tag `3`, dimension flags, then srid and x/y extents, z extents, period  |
//!
//! Bound flags: bit 0 lower inclusive, bit 1 upper inclusive. Dimension flags: bit 0 X,
//! bit 1 Z, bit 2 T, bit 3 geodetic. A box period is stored as bound flags and two
//! microsecond timestamps, without a base type byte.
//!
//! Decoding re-runs the constructors, so malformed input is rejected with the same errors
//! as malformed arguments.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::value::Timestamp;
use crate::{BaseType, BoxFlags, Result, Span, SpanBoxError, SpanSet, SpanValue, StBox};

pub const SPAN_TAG: u8 = 1;
pub const SPANSET_TAG: u8 = 2;
pub const STBOX_TAG: u8 = 3;

const LOWER_INC: u8 = 0b01;
const UPPER_INC: u8 = 0b10;

const DIM_X: u8 = 0b0001;
const DIM_Z: u8 = 0b0010;
const DIM_T: u8 = 0b0100;
const DIM_GEODETIC: u8 = 0b1000;

/// Values with a stable binary representation
pub trait WireFormat: Sized {
    /// Append the encoded value to `buf`
    fn encode<B: BufMut>(&self, buf: &mut B);

    /// Read one value from the front of `buf`
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a value that must occupy all of `bytes`
    fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        let value = Self::decode(&mut bytes)?;
        if bytes.has_remaining() {
            return Err(SpanBoxError::InvalidArgument(format!(
                "{} trailing bytes after value",
                bytes.remaining()
            )));
        }
        Ok(value)
    }
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(SpanBoxError::InvalidArgument(format!(
            "truncated {what}: need {needed} bytes, {} left",
            buf.remaining()
        )));
    }
    Ok(())
}

fn expect_tag<B: Buf>(buf: &mut B, tag: u8, what: &str) -> Result<()> {
    ensure_remaining(buf, 1, what)?;
    let found = buf.get_u8();
    if found != tag {
        return Err(SpanBoxError::InvalidArgument(format!(
            "expected {what} tag {tag}, found {found}"
        )));
    }
    Ok(())
}

fn bound_flags<T: SpanValue>(span: &Span<T>) -> u8 {
    let mut flags = 0;
    if span.lower_inc() {
        flags |= LOWER_INC;
    }
    if span.upper_inc() {
        flags |= UPPER_INC;
    }
    flags
}

/// Bounds only, shared by span bodies and box periods
fn encode_bounds<T: SpanValue, B: BufMut>(span: &Span<T>, buf: &mut B) {
    span.lower().encode(buf);
    span.upper().encode(buf);
}

fn decode_bounds<T: SpanValue, B: Buf>(buf: &mut B, flags: u8) -> Result<Span<T>> {
    if flags & !(LOWER_INC | UPPER_INC) != 0 {
        return Err(SpanBoxError::InvalidArgument(format!(
            "unknown bound flags {flags:#04b}"
        )));
    }
    ensure_remaining(buf, 2 * T::ENCODED_LEN, "span bounds")?;
    let lower = T::decode(buf)?;
    let upper = T::decode(buf)?;
    Span::new(lower, upper, flags & LOWER_INC != 0, flags & UPPER_INC != 0)
}

fn encode_span_body<T: SpanValue, B: BufMut>(span: &Span<T>, buf: &mut B) {
    buf.put_u8(bound_flags(span));
    buf.put_u8(T::BASE_TYPE.tag());
    encode_bounds(span, buf);
}

fn decode_span_body<T: SpanValue, B: Buf>(buf: &mut B) -> Result<Span<T>> {
    ensure_remaining(buf, 2, "span header")?;
    let flags = buf.get_u8();
    let tag = buf.get_u8();
    match BaseType::from_tag(tag) {
        Some(base) if base == T::BASE_TYPE => decode_bounds(buf, flags),
        Some(base) => Err(SpanBoxError::InvalidArgument(format!(
            "span of {base:?} cannot be read as {:?}",
            T::BASE_TYPE
        ))),
        None => Err(SpanBoxError::InvalidArgument(format!(
            "unknown base type {tag}"
        ))),
    }
}

impl<T: SpanValue> WireFormat for Span<T> {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(SPAN_TAG);
        encode_span_body(self, buf);
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        expect_tag(buf, SPAN_TAG, "span")?;
        decode_span_body(buf)
    }
}

impl<T: SpanValue> WireFormat for SpanSet<T> {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(SPANSET_TAG);
        buf.put_u32_le(self.num_spans() as u32);
        for span in self.spans() {
            encode_span_body(span, buf);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        expect_tag(buf, SPANSET_TAG, "span set")?;
        ensure_remaining(buf, 4, "span set count")?;
        let count = buf.get_u32_le() as usize;
        if count == 0 {
            return Err(SpanBoxError::InvalidArgument(
                "span set without spans".to_string(),
            ));
        }
        // Every body needs its two header bytes and both bounds
        ensure_remaining(buf, count.saturating_mul(2 + 2 * T::ENCODED_LEN), "span set")?;
        let spans = (0..count)
            .map(|_| decode_span_body(buf))
            .collect::<Result<Vec<Span<T>>>>()?;
        SpanSet::from_spans(spans)
    }
}

impl WireFormat for StBox {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(STBOX_TAG);
        let mut dims = 0;
        if self.has_x() {
            dims |= DIM_X;
        }
        if self.has_z() {
            dims |= DIM_Z;
        }
        if self.has_t() {
            dims |= DIM_T;
        }
        if self.is_geodetic() {
            dims |= DIM_GEODETIC;
        }
        buf.put_u8(dims);

        if let (Some((xmin, xmax)), Some((ymin, ymax))) = (self.x_range(), self.y_range()) {
            buf.put_i32_le(self.srid());
            for v in [xmin, xmax, ymin, ymax] {
                buf.put_f64_le(v);
            }
        }
        if let Some((zmin, zmax)) = self.z_range() {
            buf.put_f64_le(zmin);
            buf.put_f64_le(zmax);
        }
        if let Some(period) = self.period() {
            buf.put_u8(bound_flags(period));
            encode_bounds(period, buf);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        expect_tag(buf, STBOX_TAG, "box")?;
        ensure_remaining(buf, 1, "box dimensions")?;
        let dims = buf.get_u8();
        if dims & !(DIM_X | DIM_Z | DIM_T | DIM_GEODETIC) != 0 {
            return Err(SpanBoxError::InvalidArgument(format!(
                "unknown dimension flags {dims:#06b}"
            )));
        }
        let flags = BoxFlags {
            has_x: dims & DIM_X != 0,
            has_z: dims & DIM_Z != 0,
            has_t: dims & DIM_T != 0,
            geodetic: dims & DIM_GEODETIC != 0,
        };
        if flags.geodetic && !flags.has_x {
            return Err(SpanBoxError::InvalidArgument(
                "geodetic flag on a box without X".to_string(),
            ));
        }

        let mut extent = [0.0; 6];
        let mut srid = 0;
        if flags.has_x {
            ensure_remaining(buf, 4 + 4 * 8, "box spatial extent")?;
            srid = buf.get_i32_le();
            for v in &mut extent[..4] {
                *v = buf.get_f64_le();
            }
        }
        if flags.has_z {
            ensure_remaining(buf, 2 * 8, "box z extent")?;
            extent[4] = buf.get_f64_le();
            extent[5] = buf.get_f64_le();
        }
        let period = if flags.has_t {
            ensure_remaining(buf, 1, "box period")?;
            let bounds = buf.get_u8();
            Some(decode_bounds::<Timestamp, B>(buf, bounds)?)
        } else {
            None
        };
        StBox::new(flags, extent, period, srid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn ts(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_span_layout() {
        let span = Span::new(1.5f64, 4.0, true, false).unwrap();
        let bytes = span.to_bytes();
        assert_eq!(bytes.len(), 3 + 16);
        assert_eq!(&bytes[..3], &[SPAN_TAG, LOWER_INC, BaseType::Float8.tag()]);
        assert_eq!(&bytes[3..11], &1.5f64.to_le_bytes());
        assert_eq!(Span::<f64>::from_bytes(&bytes).unwrap(), span);
    }

    #[test]
    fn test_span_roundtrip_per_base_type() {
        let ints = Span::closed(-3i32, 7).unwrap();
        assert_eq!(Span::<i32>::from_bytes(&ints.to_bytes()).unwrap(), ints);
        assert_eq!(ints.to_bytes().len(), 3 + 8);

        let dates = Span::closed_open(
            NaiveDate::from_ymd_opt(2020, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
        )
        .unwrap();
        assert_eq!(Span::<NaiveDate>::from_bytes(&dates.to_bytes()).unwrap(), dates);

        let times = Span::new(ts(1), ts(3), false, true).unwrap();
        assert_eq!(Span::<Timestamp>::from_bytes(&times.to_bytes()).unwrap(), times);
    }

    #[test]
    fn test_sub_microsecond_timestamps_roundtrip() {
        let fine = ts(1) + chrono::TimeDelta::nanoseconds(1_500);
        let span = Span::closed(fine, ts(2)).unwrap();
        assert_eq!(span.lower(), ts(1) + chrono::TimeDelta::microseconds(1));
        assert_eq!(Span::<Timestamp>::from_bytes(&span.to_bytes()).unwrap(), span);

        let point = Span::point(fine);
        assert_eq!(Span::<Timestamp>::from_bytes(&point.to_bytes()).unwrap(), point);

        let b = StBox::from_period(span);
        assert_eq!(StBox::from_bytes(&b.to_bytes()).unwrap(), b);

        // Bounds that differ only below a microsecond collapse to a single instant
        let collapsed = Span::closed_open(fine, fine + chrono::TimeDelta::nanoseconds(100));
        assert!(matches!(collapsed, Err(SpanBoxError::InvalidRange(_))));
    }

    #[test]
    fn test_span_wrong_base_type() {
        let bytes = Span::closed(1i64, 2).unwrap().to_bytes();
        let err = Span::<f64>::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SpanBoxError::InvalidArgument(_)));
    }

    #[test]
    fn test_span_invalid_bounds() {
        let mut buf = BytesMut::new();
        buf.put_u8(SPAN_TAG);
        buf.put_u8(LOWER_INC | UPPER_INC);
        buf.put_u8(BaseType::Float8.tag());
        buf.put_f64_le(5.0);
        buf.put_f64_le(1.0);
        assert!(matches!(
            Span::<f64>::from_bytes(&buf),
            Err(SpanBoxError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = Span::closed(1.0f64, 2.0).unwrap().to_bytes();
        for len in 0..bytes.len() {
            assert!(
                Span::<f64>::from_bytes(&bytes[..len]).is_err(),
                "decoded {len} bytes"
            );
        }
        let mut longer = bytes.to_vec();
        longer.push(0);
        assert!(Span::<f64>::from_bytes(&longer).is_err());
    }

    #[test]
    fn test_wrong_tag() {
        let bytes = Span::closed(1.0f64, 2.0).unwrap().to_bytes();
        assert!(matches!(
            SpanSet::<f64>::from_bytes(&bytes),
            Err(SpanBoxError::InvalidArgument(_))
        ));
        assert!(StBox::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_spanset_roundtrip() {
        let set = SpanSet::from_spans([
            Span::closed_open(1i64, 5).unwrap(),
            Span::closed(7i64, 10).unwrap(),
        ])
        .unwrap();
        let bytes = set.to_bytes();
        assert_eq!(&bytes[..5], &[SPANSET_TAG, 2, 0, 0, 0]);
        assert_eq!(bytes.len(), 5 + 2 * (2 + 16));
        assert_eq!(SpanSet::<i64>::from_bytes(&bytes).unwrap(), set);
    }

    #[test]
    fn test_spanset_rejects_empty_and_huge_counts() {
        assert!(SpanSet::<i32>::from_bytes(&[SPANSET_TAG, 0, 0, 0, 0]).is_err());
        let err = SpanSet::<i32>::from_bytes(&[SPANSET_TAG, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_spanset_decoding_normalizes() {
        // Overlapping spans written by hand collapse into one
        let mut buf = BytesMut::new();
        buf.put_u8(SPANSET_TAG);
        buf.put_u32_le(2);
        for (lower, upper) in [(1.0f64, 4.0), (3.0, 6.0)] {
            buf.put_u8(LOWER_INC);
            buf.put_u8(BaseType::Float8.tag());
            buf.put_f64_le(lower);
            buf.put_f64_le(upper);
        }
        let set = SpanSet::<f64>::from_bytes(&buf).unwrap();
        assert_eq!(set.spans(), &[Span::closed_open(1.0, 6.0).unwrap()]);
    }

    #[test]
    fn test_stbox_roundtrip() {
        let period = Span::closed_open(ts(1), ts(4)).unwrap();
        let boxes = [
            StBox::from_xy(0.0, 10.0, -5.0, 5.0, 4326).unwrap(),
            StBox::from_xyz(0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 0).unwrap(),
            StBox::from_xy(1.0, 2.0, 3.0, 4.0, 4326)
                .unwrap()
                .with_geodetic(true)
                .with_period(period),
            StBox::from_period(period),
        ];
        for b in boxes {
            assert_eq!(StBox::from_bytes(&b.to_bytes()).unwrap(), b);
        }
    }

    #[test]
    fn test_stbox_layout() {
        let temporal = StBox::from_period(Span::closed(ts(1), ts(2)).unwrap());
        let bytes = temporal.to_bytes();
        assert_eq!(&bytes[..3], &[STBOX_TAG, DIM_T, LOWER_INC | UPPER_INC]);
        assert_eq!(bytes.len(), 3 + 16);

        let spatial = StBox::from_xy(0.0, 1.0, 0.0, 1.0, 3857).unwrap().to_bytes();
        assert_eq!(&spatial[..2], &[STBOX_TAG, DIM_X]);
        assert_eq!(&spatial[2..6], &3857i32.to_le_bytes());
        assert_eq!(spatial.len(), 2 + 4 + 32);
    }

    #[test]
    fn test_stbox_rejects_malformed() {
        // No dimension at all
        assert!(StBox::from_bytes(&[STBOX_TAG, 0]).is_err());
        // Unknown flag bits
        assert!(StBox::from_bytes(&[STBOX_TAG, 0b1_0000]).is_err());
        // Inverted x range
        let mut buf = BytesMut::new();
        buf.put_u8(STBOX_TAG);
        buf.put_u8(DIM_X);
        buf.put_i32_le(0);
        for v in [2.0f64, 1.0, 0.0, 1.0] {
            buf.put_f64_le(v);
        }
        assert!(matches!(
            StBox::from_bytes(&buf),
            Err(SpanBoxError::InvalidRange(_))
        ));
        // Truncated period
        let bytes = StBox::from_period(Span::closed(ts(1), ts(2)).unwrap()).to_bytes();
        assert!(StBox::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
