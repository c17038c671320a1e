//! Span - contiguous interval over an ordered base type
//!
//! A span has independently inclusive or exclusive bounds and is never empty. Spans over
//! discrete base types are kept in the canonical `[lower, upper)` form so that equality and
//! adjacency only ever see one representation of the same set of values.

use crate::value::{BaseType, SpanValue};
use crate::{Result, SpanBoxError, SpanSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::cmp::Ordering;
use std::fmt;

/// Contiguous interval `lower .. upper` with inclusive/exclusive bounds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "RawSpan<T>",
        into = "RawSpan<T>",
        bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
    )
)]
pub struct Span<T: SpanValue> {
    lower: T,
    upper: T,
    lower_inc: bool,
    upper_inc: bool,
}

/// Unvalidated serialized form, validated again through [`Span::new`]
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct RawSpan<T> {
    lower: T,
    upper: T,
    lower_inc: bool,
    upper_inc: bool,
}

#[cfg(feature = "serde")]
impl<T: SpanValue> TryFrom<RawSpan<T>> for Span<T> {
    type Error = SpanBoxError;

    fn try_from(raw: RawSpan<T>) -> Result<Self> {
        Span::new(raw.lower, raw.upper, raw.lower_inc, raw.upper_inc)
    }
}

#[cfg(feature = "serde")]
impl<T: SpanValue> From<Span<T>> for RawSpan<T> {
    fn from(span: Span<T>) -> Self {
        Self {
            lower: span.lower,
            upper: span.upper,
            lower_inc: span.lower_inc,
            upper_inc: span.upper_inc,
        }
    }
}

/// One bound of a span, comparable against bounds of other spans
///
/// At equal values an exclusive lower bound sorts after an inclusive one, and an exclusive
/// upper bound sorts before an inclusive one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanBound<T: SpanValue> {
    pub value: T,
    pub inclusive: bool,
    pub lower: bool,
}

impl<T: SpanValue> SpanBound<T> {
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.value.compare(&other.value) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match (self.inclusive, other.inclusive) {
            (true, true) => Ordering::Equal,
            (false, false) if self.lower == other.lower => Ordering::Equal,
            (false, false) | (false, true) => {
                if self.lower {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (true, false) => {
                if other.lower {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T: SpanValue> Span<T> {
    /// Create a new span, canonicalizing discrete base types to `[lower, upper)`
    ///
    /// # Errors
    /// [`SpanBoxError::InvalidRange`] if `lower > upper`, if the bounds are equal but not both
    /// inclusive, if canonicalization leaves no value inside, or if a bound is NaN.
    pub fn new(lower: T, upper: T, lower_inc: bool, upper_inc: bool) -> Result<Self> {
        let (lower, upper) = (lower.normalize(), upper.normalize());
        if !lower.is_valid() || !upper.is_valid() {
            return Err(SpanBoxError::InvalidRange(format!(
                "invalid span bound in {lower:?}, {upper:?}"
            )));
        }
        match lower.compare(&upper) {
            Ordering::Greater => {
                return Err(SpanBoxError::InvalidRange(format!(
                    "span lower bound {lower:?} must be less than or equal to upper bound {upper:?}"
                )));
            }
            Ordering::Equal if !(lower_inc && upper_inc) => {
                return Err(SpanBoxError::InvalidRange(format!(
                    "span with equal bounds {lower:?} must include both of them"
                )));
            }
            _ => {}
        }

        let mut span = Self {
            lower,
            upper,
            lower_inc,
            upper_inc,
        };
        span.canonicalize();
        if span.lower.compare(&span.upper) != Ordering::Less && !(span.lower_inc && span.upper_inc)
        {
            return Err(SpanBoxError::InvalidRange(format!(
                "span between {lower:?} and {upper:?} contains no value"
            )));
        }
        Ok(span)
    }

    /// The span `[lower, upper)`
    pub fn closed_open(lower: T, upper: T) -> Result<Self> {
        Self::new(lower, upper, true, false)
    }

    /// The span `[lower, upper]`
    pub fn closed(lower: T, upper: T) -> Result<Self> {
        Self::new(lower, upper, true, true)
    }

    /// The single-value span `[value, value]`
    pub fn point(value: T) -> Self {
        let value = value.normalize();
        let mut span = Self {
            lower: value,
            upper: value,
            lower_inc: true,
            upper_inc: true,
        };
        span.canonicalize();
        span
    }

    /// Build a span from bounds that are already known to be ordered and canonical
    pub(crate) fn from_parts(lower: T, upper: T, lower_inc: bool, upper_inc: bool) -> Self {
        Self {
            lower,
            upper,
            lower_inc,
            upper_inc,
        }
    }

    fn from_bounds(lower: SpanBound<T>, upper: SpanBound<T>) -> Self {
        Self::from_parts(lower.value, upper.value, lower.inclusive, upper.inclusive)
    }

    fn canonicalize(&mut self) {
        if !T::DISCRETE {
            return;
        }
        if !self.lower_inc
            && let Some(next) = self.lower.successor()
        {
            self.lower = next;
            self.lower_inc = true;
        }
        if self.upper_inc
            && let Some(next) = self.upper.successor()
        {
            self.upper = next;
            self.upper_inc = false;
        }
    }

    // ---- Accessors ----

    #[inline]
    pub fn lower(&self) -> T {
        self.lower
    }

    #[inline]
    pub fn upper(&self) -> T {
        self.upper
    }

    #[inline]
    pub fn lower_inc(&self) -> bool {
        self.lower_inc
    }

    #[inline]
    pub fn upper_inc(&self) -> bool {
        self.upper_inc
    }

    #[inline]
    pub fn base_type(&self) -> BaseType {
        T::BASE_TYPE
    }

    #[inline]
    pub fn lower_bound(&self) -> SpanBound<T> {
        SpanBound {
            value: self.lower,
            inclusive: self.lower_inc,
            lower: true,
        }
    }

    #[inline]
    pub fn upper_bound(&self) -> SpanBound<T> {
        SpanBound {
            value: self.upper,
            inclusive: self.upper_inc,
            lower: false,
        }
    }

    /// Distance between the bounds in the units of the base type
    pub fn width(&self) -> f64 {
        self.upper.distance(&self.lower)
    }

    // ---- Topological predicates ----

    pub fn contains_value(&self, value: &T) -> bool {
        let lower = self.lower.compare(value);
        if lower == Ordering::Greater || (lower == Ordering::Equal && !self.lower_inc) {
            return false;
        }
        let upper = self.upper.compare(value);
        !(upper == Ordering::Less || (upper == Ordering::Equal && !self.upper_inc))
    }

    pub fn contains_span(&self, other: &Span<T>) -> bool {
        let lower = self.lower.compare(&other.lower);
        let upper = self.upper.compare(&other.upper);
        (lower == Ordering::Less || (lower == Ordering::Equal && (self.lower_inc || !other.lower_inc)))
            && (upper == Ordering::Greater
                || (upper == Ordering::Equal && (self.upper_inc || !other.upper_inc)))
    }

    pub fn overlaps(&self, other: &Span<T>) -> bool {
        let left = self.lower.compare(&other.upper);
        let right = other.lower.compare(&self.upper);
        (left == Ordering::Less || (left == Ordering::Equal && self.lower_inc && other.upper_inc))
            && (right == Ordering::Less
                || (right == Ordering::Equal && other.lower_inc && self.upper_inc))
    }

    /// Spans that touch without sharing a value: `[a, b)` and `[b, c]`
    pub fn adjacent(&self, other: &Span<T>) -> bool {
        (self.upper.compare(&other.lower) == Ordering::Equal && self.upper_inc != other.lower_inc)
            || (other.upper.compare(&self.lower) == Ordering::Equal
                && other.upper_inc != self.lower_inc)
    }

    /// The value sits on an exclusive bound of the span
    pub fn adjacent_value(&self, value: &T) -> bool {
        (self.lower.compare(value) == Ordering::Equal && !self.lower_inc)
            || (self.upper.compare(value) == Ordering::Equal && !self.upper_inc)
    }

    // ---- Position predicates ----

    /// Every value of `self` is before every value of `other`
    pub fn left_of(&self, other: &Span<T>) -> bool {
        match self.upper.compare(&other.lower) {
            Ordering::Less => true,
            Ordering::Equal => !self.upper_inc || !other.lower_inc,
            Ordering::Greater => false,
        }
    }

    /// `self` does not extend to the right of `other`
    pub fn overleft(&self, other: &Span<T>) -> bool {
        match self.upper.compare(&other.upper) {
            Ordering::Less => true,
            Ordering::Equal => !self.upper_inc || other.upper_inc,
            Ordering::Greater => false,
        }
    }

    pub fn right_of(&self, other: &Span<T>) -> bool {
        other.left_of(self)
    }

    /// `self` does not extend to the left of `other`
    pub fn overright(&self, other: &Span<T>) -> bool {
        match self.lower.compare(&other.lower) {
            Ordering::Greater => true,
            Ordering::Equal => !self.lower_inc || other.lower_inc,
            Ordering::Less => false,
        }
    }

    pub fn left_of_value(&self, value: &T) -> bool {
        match self.upper.compare(value) {
            Ordering::Less => true,
            Ordering::Equal => !self.upper_inc,
            Ordering::Greater => false,
        }
    }

    pub fn overleft_value(&self, value: &T) -> bool {
        self.upper.compare(value) != Ordering::Greater
    }

    pub fn right_of_value(&self, value: &T) -> bool {
        match self.lower.compare(value) {
            Ordering::Greater => true,
            Ordering::Equal => !self.lower_inc,
            Ordering::Less => false,
        }
    }

    pub fn overright_value(&self, value: &T) -> bool {
        self.lower.compare(value) != Ordering::Less
    }

    // ---- Distance ----

    /// Zero when the spans overlap, otherwise the gap between the nearest bounds
    pub fn distance(&self, other: &Span<T>) -> f64 {
        if self.overlaps(other) {
            0.0
        } else if self.left_of(other) {
            self.upper.distance(&other.lower)
        } else {
            other.upper.distance(&self.lower)
        }
    }

    pub fn distance_value(&self, value: &T) -> f64 {
        if self.contains_value(value) {
            0.0
        } else if self.right_of_value(value) {
            self.lower.distance(value)
        } else {
            self.upper.distance(value)
        }
    }

    // ---- Set operations ----

    /// Grow `self` to the smallest span covering both spans
    pub fn expand(&mut self, other: &Span<T>) {
        if other.lower_bound().compare(&self.lower_bound()) == Ordering::Less {
            self.lower = other.lower;
            self.lower_inc = other.lower_inc;
        }
        if other.upper_bound().compare(&self.upper_bound()) == Ordering::Greater {
            self.upper = other.upper;
            self.upper_inc = other.upper_inc;
        }
    }

    /// Smallest span covering both spans, including any gap between them
    pub fn bounding_union(&self, other: &Span<T>) -> Span<T> {
        let mut result = *self;
        result.expand(other);
        result
    }

    /// Values in both spans
    pub fn intersection(&self, other: &Span<T>) -> Option<Span<T>> {
        if !self.overlaps(other) {
            return None;
        }
        let lower = if self.lower_bound().compare(&other.lower_bound()) == Ordering::Less {
            other.lower_bound()
        } else {
            self.lower_bound()
        };
        let upper = if self.upper_bound().compare(&other.upper_bound()) == Ordering::Greater {
            other.upper_bound()
        } else {
            self.upper_bound()
        };
        Some(Self::from_bounds(lower, upper))
    }

    /// Values in either span, as one span or two ordered disjoint spans
    pub fn union(&self, other: &Span<T>) -> SpanSet<T> {
        if self.overlaps(other) || self.adjacent(other) {
            return SpanSet::from_canonical(vec![self.bounding_union(other)]);
        }
        let (first, second) = if self < other {
            (*self, *other)
        } else {
            (*other, *self)
        };
        SpanSet::from_canonical(vec![first, second])
    }

    /// Values of `self` that are not in `other`: zero, one or two pieces in order
    pub fn difference(&self, other: &Span<T>) -> SmallVec<[Span<T>; 2]> {
        let lower_lower = self.lower_bound().compare(&other.lower_bound());
        let upper_upper = self.upper_bound().compare(&other.upper_bound());

        // Disjoint
        if self.lower_bound().compare(&other.upper_bound()) == Ordering::Greater
            || self.upper_bound().compare(&other.lower_bound()) == Ordering::Less
        {
            return smallvec![*self];
        }

        let left = || {
            Self::from_parts(self.lower, other.lower, self.lower_inc, !other.lower_inc)
        };
        let right = || {
            Self::from_parts(other.upper, self.upper, !other.upper_inc, self.upper_inc)
        };
        match (lower_lower, upper_upper) {
            (Ordering::Less, Ordering::Greater) => smallvec![left(), right()],
            (Ordering::Less, _) => smallvec![left()],
            (_, Ordering::Greater) => smallvec![right()],
            _ => SmallVec::new(),
        }
    }

    /// Values of `self` that are in no span of `set`
    pub fn difference_set(&self, set: &SpanSet<T>) -> Option<SpanSet<T>> {
        if !self.overlaps(set.bounding_span()) {
            return Some(SpanSet::from_span(*self));
        }
        let first = set.spans().partition_point(|s| s.left_of(self));
        let pieces = subtract_run(*self, &set.spans()[first..]);
        (!pieces.is_empty()).then(|| SpanSet::from_canonical(pieces))
    }

    pub fn contains_set(&self, set: &SpanSet<T>) -> bool {
        self.contains_span(set.bounding_span())
    }

    pub fn overlaps_set(&self, set: &SpanSet<T>) -> bool {
        set.overlaps_span(self)
    }
}

/// Subtract an ordered run of disjoint spans from `span`
///
/// The remainder shrinks from the left: each subtraction leaves at most two pieces, of which
/// the left one is final and the right one is carried on to the next span of the run.
pub(crate) fn subtract_run<T: SpanValue>(span: Span<T>, run: &[Span<T>]) -> Vec<Span<T>> {
    let mut result = Vec::new();
    let mut current = span;
    for other in run {
        if current.left_of(other) {
            break;
        }
        let pieces = current.difference(other);
        match pieces.as_slice() {
            [] => return result,
            [rest] => current = *rest,
            [done, rest, ..] => {
                result.push(*done);
                current = *rest;
            }
        }
    }
    result.push(current);
    result
}

impl<T: SpanValue> Eq for Span<T> {}

impl<T: SpanValue> Ord for Span<T> {
    /// Lower bound first (inclusive before exclusive), then upper bound (exclusive before inclusive)
    fn cmp(&self, other: &Self) -> Ordering {
        self.lower_bound()
            .compare(&other.lower_bound())
            .then_with(|| self.upper_bound().compare(&other.upper_bound()))
    }
}

impl<T: SpanValue> PartialOrd for Span<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SpanValue> fmt::Display for Span<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:?}, {:?}{}",
            if self.lower_inc { '[' } else { '(' },
            self.lower,
            self.upper,
            if self.upper_inc { ']' } else { ')' }
        )
    }
}
