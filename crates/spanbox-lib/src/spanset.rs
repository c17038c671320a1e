//! SpanSet - canonical ordered union of disjoint spans
//!
//! A span set is kept sorted by lower bound with no two consecutive spans overlapping or
//! adjacent. Lookups binary search the component spans; binary operations are single merge
//! walks over both ordered sequences.

use crate::span::subtract_run;
use crate::value::SpanValue;
use crate::{Result, Span, SpanBoxError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Canonical set of disjoint, non-adjacent spans ordered by lower bound
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "Vec<Span<T>>",
        into = "Vec<Span<T>>",
        bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
    )
)]
pub struct SpanSet<T: SpanValue> {
    spans: Vec<Span<T>>,
    bounding: Span<T>,
}

impl<T: SpanValue> TryFrom<Vec<Span<T>>> for SpanSet<T> {
    type Error = SpanBoxError;

    fn try_from(spans: Vec<Span<T>>) -> Result<Self> {
        Self::from_spans(spans)
    }
}

impl<T: SpanValue> From<SpanSet<T>> for Vec<Span<T>> {
    fn from(set: SpanSet<T>) -> Self {
        set.spans
    }
}

impl<T: SpanValue> From<Span<T>> for SpanSet<T> {
    fn from(span: Span<T>) -> Self {
        Self::from_span(span)
    }
}

/// Merge overlapping or adjacent neighbours of spans sorted by lower bound
fn normalize_sorted<T: SpanValue>(sorted: impl IntoIterator<Item = Span<T>>) -> Vec<Span<T>> {
    let mut result: Vec<Span<T>> = Vec::new();
    for span in sorted {
        match result.last_mut() {
            Some(current) if current.overlaps(&span) || current.adjacent(&span) => {
                current.expand(&span)
            }
            _ => result.push(span),
        }
    }
    result
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T: SpanValue> SpanSet<T> {
    /// Build a span set from spans in any order, merging overlapping and adjacent ones
    ///
    /// # Errors
    /// [`SpanBoxError::InvalidArgument`] if no span is given.
    pub fn from_spans(spans: impl IntoIterator<Item = Span<T>>) -> Result<Self> {
        let mut spans: Vec<Span<T>> = spans.into_iter().collect();
        if spans.is_empty() {
            return Err(SpanBoxError::InvalidArgument(
                "a span set needs at least one span".to_string(),
            ));
        }
        spans.sort_unstable();
        Ok(Self::from_canonical(normalize_sorted(spans)))
    }

    pub fn from_span(span: Span<T>) -> Self {
        Self {
            spans: vec![span],
            bounding: span,
        }
    }

    /// Wrap spans that are already non-empty, ordered, disjoint and non-adjacent
    pub(crate) fn from_canonical(spans: Vec<Span<T>>) -> Self {
        debug_assert!(!spans.is_empty());
        debug_assert!(spans.windows(2).all(|w| w[0].left_of(&w[1]) && !w[0].adjacent(&w[1])));
        let first = spans[0];
        let last = spans[spans.len() - 1];
        let bounding = Span::from_parts(first.lower(), last.upper(), first.lower_inc(), last.upper_inc());
        Self { spans, bounding }
    }

    /// Wrap spans sorted by lower bound, normalizing them; `None` if there are none
    fn from_sorted(spans: Vec<Span<T>>) -> Option<Self> {
        (!spans.is_empty()).then(|| Self::from_canonical(normalize_sorted(spans)))
    }

    // ---- Accessors ----

    #[inline]
    pub fn spans(&self) -> &[Span<T>] {
        &self.spans
    }

    #[inline]
    pub fn num_spans(&self) -> usize {
        self.spans.len()
    }

    #[inline]
    pub fn span_n(&self, index: usize) -> Option<&Span<T>> {
        self.spans.get(index)
    }

    #[inline]
    pub fn start_span(&self) -> &Span<T> {
        &self.spans[0]
    }

    #[inline]
    pub fn end_span(&self) -> &Span<T> {
        &self.spans[self.spans.len() - 1]
    }

    /// Span from the first lower bound to the last upper bound
    #[inline]
    pub fn bounding_span(&self) -> &Span<T> {
        &self.bounding
    }

    #[inline]
    pub fn lower(&self) -> T {
        self.bounding.lower()
    }

    #[inline]
    pub fn upper(&self) -> T {
        self.bounding.upper()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Span<T>> {
        self.spans.iter()
    }

    /// Sum of the widths of the component spans, ignoring the gaps
    pub fn width(&self) -> f64 {
        self.spans.iter().map(Span::width).sum()
    }

    /// Index of the first component span not entirely before `value`
    fn find_value(&self, value: &T) -> usize {
        self.spans.partition_point(|s| s.left_of_value(value))
    }

    /// Index of the first component span not entirely before `span`
    fn find_span(&self, span: &Span<T>) -> usize {
        self.spans.partition_point(|s| s.left_of(span))
    }

    // ---- Containment ----

    pub fn contains_value(&self, value: &T) -> bool {
        if !self.bounding.contains_value(value) {
            return false;
        }
        self.spans
            .get(self.find_value(value))
            .is_some_and(|s| s.contains_value(value))
    }

    pub fn contains_span(&self, span: &Span<T>) -> bool {
        if !self.bounding.contains_span(span) {
            return false;
        }
        self.spans
            .get(self.find_span(span))
            .is_some_and(|s| s.contains_span(span))
    }

    /// Every span of `other` lies inside a single span of `self`
    pub fn contains_set(&self, other: &SpanSet<T>) -> bool {
        if !self.bounding.contains_span(&other.bounding) {
            return false;
        }
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (s1, s2) = (&self.spans[i], &other.spans[j]);
            if s1.left_of(s2) {
                i += 1;
            } else if s2.left_of(s1) || !s1.contains_span(s2) {
                return false;
            } else if s1.upper_bound().compare(&s2.upper_bound()) == Ordering::Equal {
                i += 1;
                j += 1;
            } else {
                j += 1;
            }
        }
        j == other.spans.len()
    }

    pub fn contained_in_span(&self, span: &Span<T>) -> bool {
        span.contains_span(&self.bounding)
    }

    // ---- Overlap ----

    pub fn overlaps_span(&self, span: &Span<T>) -> bool {
        if !self.bounding.overlaps(span) {
            return false;
        }
        for s in &self.spans[self.find_span(span)..] {
            if s.overlaps(span) {
                return true;
            }
            if span.left_of(s) {
                break;
            }
        }
        false
    }

    pub fn overlaps_set(&self, other: &SpanSet<T>) -> bool {
        if !self.bounding.overlaps(&other.bounding) {
            return false;
        }
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (s1, s2) = (&self.spans[i], &other.spans[j]);
            if s1.overlaps(s2) {
                return true;
            }
            match s1.upper_bound().compare(&s2.upper_bound()) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        false
    }

    // ---- Adjacency ----

    pub fn adjacent_value(&self, value: &T) -> bool {
        self.start_span().adjacent_value(value) || self.end_span().adjacent_value(value)
    }

    /// `span` touches the set from the outside: right after its end or right before its start
    pub fn adjacent_span(&self, span: &Span<T>) -> bool {
        let (first, last) = (self.start_span(), self.end_span());
        (last.upper().compare(&span.lower()) == Ordering::Equal
            && last.upper_inc() != span.lower_inc())
            || (span.upper().compare(&first.lower()) == Ordering::Equal
                && span.upper_inc() != first.lower_inc())
    }

    pub fn adjacent_set(&self, other: &SpanSet<T>) -> bool {
        let (first1, last1) = (self.start_span(), self.end_span());
        let (first2, last2) = (other.start_span(), other.end_span());
        (last1.upper().compare(&first2.lower()) == Ordering::Equal
            && last1.upper_inc() != first2.lower_inc())
            || (last2.upper().compare(&first1.lower()) == Ordering::Equal
                && last2.upper_inc() != first1.lower_inc())
    }

    // ---- Position ----

    pub fn left_of_value(&self, value: &T) -> bool {
        self.end_span().left_of_value(value)
    }

    pub fn left_of_span(&self, span: &Span<T>) -> bool {
        self.end_span().left_of(span)
    }

    pub fn left_of_set(&self, other: &SpanSet<T>) -> bool {
        self.end_span().left_of(other.start_span())
    }

    pub fn right_of_value(&self, value: &T) -> bool {
        self.start_span().right_of_value(value)
    }

    pub fn right_of_span(&self, span: &Span<T>) -> bool {
        span.left_of(self.start_span())
    }

    pub fn right_of_set(&self, other: &SpanSet<T>) -> bool {
        other.left_of_set(self)
    }

    pub fn overleft_value(&self, value: &T) -> bool {
        self.end_span().overleft_value(value)
    }

    pub fn overleft_span(&self, span: &Span<T>) -> bool {
        self.end_span().overleft(span)
    }

    pub fn overleft_set(&self, other: &SpanSet<T>) -> bool {
        self.end_span().overleft(other.end_span())
    }

    pub fn overright_value(&self, value: &T) -> bool {
        self.start_span().overright_value(value)
    }

    pub fn overright_span(&self, span: &Span<T>) -> bool {
        self.start_span().overright(span)
    }

    pub fn overright_set(&self, other: &SpanSet<T>) -> bool {
        self.start_span().overright(other.start_span())
    }

    // ---- Union ----

    pub fn union_value(&self, value: T) -> SpanSet<T> {
        self.union_span(&Span::point(value))
    }

    pub fn union_span(&self, span: &Span<T>) -> SpanSet<T> {
        self.union_set(&SpanSet::from_span(*span))
    }

    /// Merge walk over both sets, folding every overlapping or adjacent run into one span
    pub fn union_set(&self, other: &SpanSet<T>) -> SpanSet<T> {
        let mut result = Vec::with_capacity(self.spans.len() + other.spans.len());
        let mut current: Option<Span<T>> = None;
        let (mut i, mut j) = (0, 0);
        loop {
            let next = match (self.spans.get(i), other.spans.get(j)) {
                (Some(s1), Some(s2)) if s1 <= s2 => {
                    i += 1;
                    *s1
                }
                (_, Some(s2)) => {
                    j += 1;
                    *s2
                }
                (Some(s1), None) => {
                    i += 1;
                    *s1
                }
                (None, None) => break,
            };
            match current.as_mut() {
                Some(acc) if acc.overlaps(&next) || acc.adjacent(&next) => acc.expand(&next),
                Some(acc) => {
                    result.push(*acc);
                    current = Some(next);
                }
                None => current = Some(next),
            }
        }
        result.extend(current);
        SpanSet::from_canonical(result)
    }

    // ---- Intersection ----

    pub fn intersection_value(&self, value: &T) -> Option<T> {
        self.contains_value(value).then_some(*value)
    }

    pub fn intersection_span(&self, span: &Span<T>) -> Option<SpanSet<T>> {
        if !self.bounding.overlaps(span) {
            return None;
        }
        if span.contains_span(&self.bounding) {
            return Some(self.clone());
        }
        let mut result = Vec::new();
        for s in &self.spans[self.find_span(span)..] {
            if span.left_of(s) {
                break;
            }
            result.extend(s.intersection(span));
        }
        SpanSet::from_sorted(result)
    }

    pub fn intersection_set(&self, other: &SpanSet<T>) -> Option<SpanSet<T>> {
        if !self.bounding.overlaps(&other.bounding) {
            return None;
        }
        if self.bounding.contains_span(&other.bounding) && self.contains_set(other) {
            return Some(other.clone());
        }
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (s1, s2) = (&self.spans[i], &other.spans[j]);
            result.extend(s1.intersection(s2));
            match s1.upper_bound().compare(&s2.upper_bound()) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        SpanSet::from_sorted(result)
    }

    // ---- Difference ----

    pub fn difference_value(&self, value: &T) -> Option<SpanSet<T>> {
        self.difference_span(&Span::point(*value))
    }

    pub fn difference_span(&self, span: &Span<T>) -> Option<SpanSet<T>> {
        if !self.bounding.overlaps(span) {
            return Some(self.clone());
        }
        let result: Vec<Span<T>> = self
            .spans
            .iter()
            .flat_map(|s| s.difference(span))
            .collect();
        SpanSet::from_sorted(result)
    }

    /// Each span of `self` minus the contiguous run of spans of `other` that overlap it
    pub fn difference_set(&self, other: &SpanSet<T>) -> Option<SpanSet<T>> {
        if !self.bounding.overlaps(&other.bounding) {
            return Some(self.clone());
        }
        let mut result = Vec::with_capacity(self.spans.len());
        let mut j = 0;
        for s1 in &self.spans {
            // Spans of `other` ending before `s1` cannot touch any later span of `self`
            while j < other.spans.len() && other.spans[j].left_of(s1) {
                j += 1;
            }
            let run_end = j + other.spans[j..].partition_point(|s2| !s1.left_of(s2));
            result.extend(subtract_run(*s1, &other.spans[j..run_end]));
        }
        SpanSet::from_sorted(result)
    }

    // ---- Distance ----

    /// Distance between the bounding span and `value`
    pub fn distance_value(&self, value: &T) -> f64 {
        self.bounding.distance_value(value)
    }

    /// Distance between the bounding span and `span`
    pub fn distance_span(&self, span: &Span<T>) -> f64 {
        self.bounding.distance(span)
    }

    /// Distance between the two bounding spans
    pub fn distance_set(&self, other: &SpanSet<T>) -> f64 {
        self.bounding.distance(&other.bounding)
    }
}

impl<'a, T: SpanValue> IntoIterator for &'a SpanSet<T> {
    type Item = &'a Span<T>;
    type IntoIter = std::slice::Iter<'a, Span<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.spans.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fspan(lower: f64, upper: f64, lower_inc: bool, upper_inc: bool) -> Span<f64> {
        Span::new(lower, upper, lower_inc, upper_inc).unwrap()
    }

    fn closed(lower: f64, upper: f64) -> Span<f64> {
        fspan(lower, upper, true, true)
    }

    fn closed_open(lower: f64, upper: f64) -> Span<f64> {
        fspan(lower, upper, true, false)
    }

    fn sample() -> SpanSet<f64> {
        SpanSet::from_spans([closed(7.0, 10.0), closed_open(1.0, 5.0)]).unwrap()
    }

    #[test]
    fn test_from_spans_sorts_and_merges() {
        let set = SpanSet::from_spans([
            closed(8.0, 9.0),
            closed_open(1.0, 3.0),
            closed(3.0, 4.0),
            closed(2.0, 2.5),
        ])
        .unwrap();
        assert_eq!(set.spans(), &[closed(1.0, 4.0), closed(8.0, 9.0)]);
        assert_eq!(*set.bounding_span(), closed(1.0, 9.0));
        assert_eq!(set.num_spans(), 2);
        assert_eq!(set.width(), 4.0);
    }

    #[test]
    fn test_from_spans_empty() {
        let spans: Vec<Span<f64>> = Vec::new();
        assert!(matches!(
            SpanSet::from_spans(spans),
            Err(SpanBoxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_spans_keeps_gap_at_exclusive_bounds() {
        let set = SpanSet::from_spans([closed_open(1.0, 3.0), fspan(3.0, 5.0, false, true)]).unwrap();
        assert_eq!(set.num_spans(), 2, "the value 3 is in neither span");
        assert!(!set.contains_value(&3.0));
    }

    #[test]
    fn test_discrete_adjacent_spans_merge() {
        let set = SpanSet::from_spans([Span::closed(1i32, 3).unwrap(), Span::closed(4, 6).unwrap()])
            .unwrap();
        assert_eq!(set.spans(), &[Span::closed_open(1, 7).unwrap()]);
    }

    #[test]
    fn test_contains_value() {
        let set = sample();
        assert!(set.contains_value(&1.0));
        assert!(set.contains_value(&10.0));
        assert!(!set.contains_value(&5.0));
        assert!(!set.contains_value(&6.0));
        assert!(!set.contains_value(&11.0));
    }

    #[test]
    fn test_contains_span() {
        let set = sample();
        assert!(set.contains_span(&closed(2.0, 4.0)));
        assert!(set.contains_span(&fspan(7.0, 10.0, false, true)));
        assert!(!set.contains_span(&closed(4.0, 8.0)));
        assert!(!set.contains_span(&closed(2.0, 5.0)));
    }

    #[test]
    fn test_contains_set() {
        let set = sample();
        let inner = SpanSet::from_spans([closed(1.0, 2.0), closed(3.0, 4.0), closed(8.0, 10.0)]).unwrap();
        assert!(set.contains_set(&inner));
        assert!(set.contains_set(&set));
        let straddling = SpanSet::from_spans([closed(1.0, 2.0), closed(4.0, 7.5)]).unwrap();
        assert!(!set.contains_set(&straddling));
        let open_end = SpanSet::from_span(closed(1.0, 5.0));
        assert!(!set.contains_set(&open_end));
    }

    #[test]
    fn test_overlaps() {
        let set = sample();
        assert!(set.overlaps_span(&closed(4.0, 6.0)));
        assert!(!set.overlaps_span(&closed(5.0, 6.5)));
        assert!(set.overlaps_span(&closed(0.0, 20.0)));

        let other = SpanSet::from_spans([closed(5.0, 6.0), closed(10.0, 11.0)]).unwrap();
        assert!(set.overlaps_set(&other));
        let gaps = SpanSet::from_spans([closed(5.0, 6.0), fspan(10.0, 11.0, false, true)]).unwrap();
        assert!(!set.overlaps_set(&gaps));
    }

    #[test]
    fn test_adjacent() {
        let set = sample();
        assert!(set.adjacent_value(&5.0));
        assert!(!set.adjacent_value(&7.0));
        assert!(set.adjacent_span(&fspan(10.0, 12.0, false, true)));
        assert!(set.adjacent_span(&closed_open(0.0, 1.0)));
        assert!(!set.adjacent_span(&closed(10.0, 12.0)));
        let after = SpanSet::from_span(fspan(10.0, 11.0, false, true));
        assert!(set.adjacent_set(&after));
        assert!(after.adjacent_set(&set));
    }

    #[test]
    fn test_position() {
        let set = sample();
        assert!(set.left_of_value(&10.5));
        assert!(!set.left_of_value(&10.0));
        assert!(set.right_of_value(&0.0));
        assert!(set.left_of_span(&closed(11.0, 12.0)));
        assert!(set.right_of_span(&closed_open(0.0, 1.0)));
        assert!(set.overleft_span(&closed(0.0, 10.0)));
        assert!(set.overright_span(&closed(0.0, 1.0)));
        let later = SpanSet::from_span(closed(11.0, 12.0));
        assert!(set.left_of_set(&later));
        assert!(later.right_of_set(&set));
        assert!(set.overleft_set(&later));
        assert!(later.overright_set(&set));
        assert!(set.overleft_value(&10.0));
        assert!(set.overright_value(&1.0));
    }

    #[test]
    fn test_union_bridges_gap() {
        let result = sample().union_span(&closed_open(4.0, 8.0));
        assert_eq!(result.spans(), &[closed(1.0, 10.0)]);
    }

    #[test]
    fn test_union_set() {
        let a = SpanSet::from_spans([closed(1.0, 2.0), closed(5.0, 6.0), closed(9.0, 10.0)]).unwrap();
        let b = SpanSet::from_spans([closed(0.0, 0.5), fspan(2.0, 3.0, false, true), closed(5.5, 9.0)])
            .unwrap();
        let result = a.union_set(&b);
        assert_eq!(result.spans(), &[closed(0.0, 0.5), closed(1.0, 3.0), closed(5.0, 10.0)]);
        assert_eq!(a.union_value(4.0).num_spans(), 4);
    }

    #[test]
    fn test_intersection_span() {
        let set = sample();
        let result = set.intersection_span(&closed(3.0, 8.0)).unwrap();
        assert_eq!(result.spans(), &[closed_open(3.0, 5.0), closed(7.0, 8.0)]);
        assert!(set.intersection_span(&closed(5.0, 6.0)).is_none());
        assert_eq!(set.intersection_span(&closed(0.0, 20.0)), Some(set.clone()));
    }

    #[test]
    fn test_intersection_set() {
        let a = sample();
        let b = SpanSet::from_spans([closed(0.0, 2.0), closed(4.0, 8.0), closed(9.5, 12.0)]).unwrap();
        let result = a.intersection_set(&b).unwrap();
        assert_eq!(
            result.spans(),
            &[closed(1.0, 2.0), closed_open(4.0, 5.0), closed(7.0, 8.0), closed(9.5, 10.0)]
        );
        assert_eq!(a.intersection_value(&2.0), Some(2.0));
        assert_eq!(a.intersection_value(&6.0), None);
    }

    #[test]
    fn test_difference_span() {
        let result = sample().difference_span(&closed_open(2.0, 8.0)).unwrap();
        assert_eq!(result.spans(), &[closed_open(1.0, 2.0), closed(8.0, 10.0)]);
        assert!(sample().difference_span(&closed(0.0, 10.0)).is_none());
        assert_eq!(sample().difference_span(&closed(11.0, 12.0)), Some(sample()));
    }

    #[test]
    fn test_difference_value() {
        let result = sample().difference_value(&3.0).unwrap();
        assert_eq!(
            result.spans(),
            &[closed_open(1.0, 3.0), fspan(3.0, 5.0, false, false), closed(7.0, 10.0)]
        );
    }

    #[test]
    fn test_difference_set_long_right_span() {
        // One span on the right covers parts of two spans on the left
        let a = SpanSet::from_spans([closed(0.0, 4.0), closed(6.0, 10.0), closed(12.0, 14.0)]).unwrap();
        let b = SpanSet::from_spans([closed(1.0, 2.0), closed(3.0, 7.0), closed(13.0, 20.0)]).unwrap();
        let result = a.difference_set(&b).unwrap();
        assert_eq!(
            result.spans(),
            &[
                closed_open(0.0, 1.0),
                fspan(2.0, 3.0, false, false),
                fspan(7.0, 10.0, false, true),
                closed_open(12.0, 13.0),
            ]
        );
        assert!(a.difference_set(&a).is_none());
    }

    #[test]
    fn test_distance_uses_bounding_spans() {
        let set = sample();
        assert_eq!(set.distance_value(&6.0), 0.0, "value inside the bounding span");
        assert_eq!(set.distance_value(&12.0), 2.0);
        assert_eq!(set.distance_span(&closed(-3.0, -1.0)), 2.0);
        let other = SpanSet::from_span(closed(15.0, 16.0));
        assert_eq!(set.distance_set(&other), 5.0);
    }

    #[test]
    fn test_accessors() {
        let set = sample();
        assert_eq!(set.lower(), 1.0);
        assert_eq!(set.upper(), 10.0);
        assert_eq!(*set.start_span(), closed_open(1.0, 5.0));
        assert_eq!(*set.end_span(), closed(7.0, 10.0));
        assert_eq!(set.span_n(1), Some(&closed(7.0, 10.0)));
        assert_eq!(set.span_n(2), None);
        assert_eq!(set.iter().count(), 2);
        assert!(set.contained_in_span(&closed(0.0, 10.0)));
    }

    fn arb_set() -> impl Strategy<Value = SpanSet<f64>> {
        prop::collection::vec(
            (-30i32..30, 0i32..8, any::<bool>(), any::<bool>()).prop_filter_map(
                "span with no values",
                |(lower, width, lower_inc, upper_inc)| {
                    Span::new(lower as f64, (lower + width) as f64, lower_inc, upper_inc).ok()
                },
            ),
            1..8,
        )
        .prop_map(|spans| SpanSet::from_spans(spans).unwrap())
    }

    proptest! {
        #[test]
        fn test_canonical_form(set in arb_set()) {
            for pair in set.spans().windows(2) {
                prop_assert!(pair[0].left_of(&pair[1]));
                prop_assert!(!pair[0].adjacent(&pair[1]));
            }
            prop_assert_eq!(SpanSet::from_spans(set.spans().to_vec()).unwrap(), set);
        }

        #[test]
        fn test_union_laws(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(a.union_set(&a), a.clone());
            let union = a.union_set(&b);
            prop_assert!(union.contains_set(&a));
            prop_assert!(union.contains_set(&b));
            prop_assert_eq!(union, b.union_set(&a));
        }

        #[test]
        fn test_intersection_matches_overlaps(a in arb_set(), b in arb_set()) {
            let inter = a.intersection_set(&b);
            prop_assert_eq!(inter.is_none(), !a.overlaps_set(&b));
            if let Some(inter) = inter {
                prop_assert!(a.contains_set(&inter));
                prop_assert!(b.contains_set(&inter));
            }
        }

        #[test]
        fn test_difference_disjoint(a in arb_set(), b in arb_set()) {
            if let Some(rest) = a.difference_set(&b) {
                prop_assert!(!rest.overlaps_set(&b));
                prop_assert!(a.contains_set(&rest));
                prop_assert_eq!(rest.union_set(&b), a.union_set(&b));
            } else {
                prop_assert!(b.contains_set(&a));
            }
        }

        #[test]
        fn test_membership_of_values(a in arb_set(), v in -40i32..40) {
            let v = v as f64;
            let brute = a.spans().iter().any(|s| s.contains_value(&v));
            prop_assert_eq!(a.contains_value(&v), brute);
        }

        #[test]
        fn test_integer_canonical_form(set in arb_int_set()) {
            for span in set.spans() {
                prop_assert!(span.lower_inc() && !span.upper_inc());
            }
            for pair in set.spans().windows(2) {
                prop_assert!(pair[0].upper() < pair[1].lower());
            }
            prop_assert_eq!(SpanSet::from_spans(set.spans().to_vec()).unwrap(), set);
        }

        #[test]
        fn test_integer_algebra_matches_membership(a in arb_int_set(), b in arb_int_set()) {
            let union = a.union_set(&b);
            let inter = a.intersection_set(&b);
            let rest = a.difference_set(&b);
            for v in -40i32..50 {
                let (in_a, in_b) = (a.contains_value(&v), b.contains_value(&v));
                prop_assert_eq!(union.contains_value(&v), in_a || in_b, "union at {}", v);
                prop_assert_eq!(
                    inter.as_ref().is_some_and(|s| s.contains_value(&v)),
                    in_a && in_b,
                    "intersection at {}",
                    v
                );
                prop_assert_eq!(
                    rest.as_ref().is_some_and(|s| s.contains_value(&v)),
                    in_a && !in_b,
                    "difference at {}",
                    v
                );
            }
        }
    }

    fn arb_int_set() -> impl Strategy<Value = SpanSet<i32>> {
        prop::collection::vec(
            (-30i32..30, 0i32..8, any::<bool>(), any::<bool>()).prop_filter_map(
                "span with no values",
                |(lower, width, lower_inc, upper_inc)| {
                    Span::new(lower, lower + width, lower_inc, upper_inc).ok()
                },
            ),
            1..8,
        )
        .prop_map(|spans| SpanSet::from_spans(spans).unwrap())
    }
}
