//! Node split, penalty and union callbacks of the R-tree
//!
//! The split is the double-sorting heuristic: every axis the entries share is projected to
//! intervals, sorted once by lower and once by upper bound, and all `(left upper, right lower)`
//! pairs that can bound a two-group partition are scored by their overlap along that axis.
//! Entries that fit either group ("common entries") are distributed afterwards by penalty.

use crate::stbox::Axis;
use crate::utils::non_negative;
use crate::{Result, SpanBoxError, StBox};

use tracing::{debug, trace, warn};

/// Partition of node entries produced by [`split`]
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// Indices of the entries of the left group
    pub left: Vec<usize>,
    /// Indices of the entries of the right group
    pub right: Vec<usize>,
    /// Union of the left group
    pub left_box: StBox,
    /// Union of the right group
    pub right_box: StBox,
}

/// Smallest box covering all `boxes`
///
/// # Errors
/// - [`SpanBoxError::InvalidArgument`] when there are no boxes
/// - [`SpanBoxError::SridMismatch`] when the boxes are in incompatible reference systems
pub fn union_of<'a>(boxes: impl IntoIterator<Item = &'a StBox>) -> Result<StBox> {
    let mut iter = boxes.into_iter();
    let first = iter.next().ok_or_else(|| {
        SpanBoxError::InvalidArgument("cannot compute the union of zero boxes".to_string())
    })?;
    iter.try_fold(*first, |acc, b| acc.union(b))
}

/// Hyper-volume of a box: the product of its extents, time in seconds
///
/// A degenerate axis makes the size zero, a NaN extent makes it infinite.
pub fn box_size(b: &StBox) -> f64 {
    let mut ranges = [None; 4];
    for (slot, axis) in ranges.iter_mut().zip(Axis::ALL) {
        *slot = match axis {
            Axis::T => b.period().map(|p| (0.0, p.width())),
            _ => b.axis_range(axis),
        };
    }
    let ranges = ranges.into_iter().flatten();
    if ranges.clone().any(|(min, max)| max <= min) {
        return 0.0;
    }
    if ranges.clone().any(|(_, max)| max.is_nan()) {
        return f64::INFINITY;
    }
    ranges.map(|(min, max)| max - min).product()
}

/// Growth of `existing` when `inserted` is added to it
pub fn penalty(existing: &StBox, inserted: &StBox) -> f64 {
    let mut grown = *existing;
    grown.expand(inserted);
    box_size(&grown) - box_size(existing)
}

/// Projection of one entry onto the split axis
#[derive(Debug, Clone, Copy)]
struct SplitInterval {
    lower: f64,
    upper: f64,
}

/// Best split found so far
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    axis: Axis,
    /// Size of the smaller group relative to the entry count
    ratio: f64,
    /// Overlap of the groups, relative to the axis range (negative for a gap)
    overlap: f64,
    /// Range of the whole node along the axis
    range: f64,
    left_upper: f64,
    right_lower: f64,
}

struct SplitContext {
    entries: usize,
    min_fill_ratio: f64,
    best: Option<SplitCandidate>,
}

impl SplitContext {
    /// Keep the split `(.., left_upper] [right_lower, ..)` if it beats the current best
    ///
    /// `min_left` entries have to go left, and at most `max_left` can.
    fn consider(
        &mut self,
        axis: Axis,
        range: f64,
        right_lower: f64,
        min_left: usize,
        left_upper: f64,
        max_left: usize,
    ) {
        let n = self.entries;
        // Assume common entries are distributed as evenly as possible
        let left_count = if min_left >= n.div_ceil(2) {
            min_left
        } else if max_left <= n / 2 {
            max_left
        } else {
            n / 2
        };
        let right_count = n - left_count;
        let ratio = left_count.min(right_count) as f64 / n as f64;
        if ratio <= self.min_fill_ratio {
            return;
        }

        let overlap = if range > 0.0 {
            (left_upper - right_lower) / range
        } else {
            left_upper - right_lower
        };
        let select = match &self.best {
            None => true,
            Some(best) if best.axis == axis => {
                overlap < best.overlap || (overlap == best.overlap && ratio > best.ratio)
            }
            Some(best) => {
                non_negative(overlap) < non_negative(best.overlap)
                    || (range > best.range && non_negative(overlap) <= non_negative(best.overlap))
            }
        };
        if select {
            trace!(
                ?axis,
                overlap, ratio, left_upper, right_lower, "Selected split candidate"
            );
            self.best = Some(SplitCandidate {
                axis,
                ratio,
                overlap,
                range,
                left_upper,
                right_lower,
            });
        }
    }

    /// Enumerate the candidate splits along one axis
    fn scan_axis(&mut self, axis: Axis, range: f64, intervals: &[SplitInterval]) {
        let n = intervals.len();
        let mut by_lower = intervals.to_vec();
        let mut by_upper = intervals.to_vec();
        by_lower.sort_by(|a, b| {
            a.lower
                .total_cmp(&b.lower)
                .then_with(|| a.upper.total_cmp(&b.upper))
        });
        by_upper.sort_by(|a, b| {
            a.upper
                .total_cmp(&b.upper)
                .then_with(|| a.lower.total_cmp(&b.lower))
        });

        // Each lower bound as the start of the right group, with the smallest left upper bound
        let (mut i1, mut i2) = (0, 0);
        let mut right_lower = by_lower[0].lower;
        let mut left_upper = by_upper[0].lower;
        loop {
            while i1 < n && right_lower == by_lower[i1].lower {
                if left_upper < by_lower[i1].upper {
                    left_upper = by_lower[i1].upper;
                }
                i1 += 1;
            }
            if i1 >= n {
                break;
            }
            right_lower = by_lower[i1].lower;
            while i2 < n && by_upper[i2].upper <= left_upper {
                i2 += 1;
            }
            self.consider(axis, range, right_lower, i1, left_upper, i2);
        }

        // Each upper bound as the end of the left group, with the greatest right lower bound.
        // `i1` and `i2` count the entries before the cursor.
        let (mut i1, mut i2) = (n, n);
        let mut right_lower = by_lower[n - 1].upper;
        let mut left_upper = by_upper[n - 1].upper;
        loop {
            while i2 > 0 && left_upper == by_upper[i2 - 1].upper {
                if right_lower > by_upper[i2 - 1].lower {
                    right_lower = by_upper[i2 - 1].lower;
                }
                i2 -= 1;
            }
            if i2 == 0 {
                break;
            }
            left_upper = by_upper[i2 - 1].upper;
            while i1 > 0 && by_lower[i1 - 1].lower >= right_lower {
                i1 -= 1;
            }
            self.consider(axis, range, right_lower, i1, left_upper, i2);
        }
    }
}

/// Entry distribution with the bounding box of each group
#[derive(Default)]
struct Groups {
    left: Vec<usize>,
    right: Vec<usize>,
    left_box: Option<StBox>,
    right_box: Option<StBox>,
}

impl Groups {
    fn place_left(&mut self, index: usize, b: &StBox) {
        self.left.push(index);
        match self.left_box.as_mut() {
            Some(acc) => acc.expand(b),
            None => self.left_box = Some(*b),
        }
    }

    fn place_right(&mut self, index: usize, b: &StBox) {
        self.right.push(index);
        match self.right_box.as_mut() {
            Some(acc) => acc.expand(b),
            None => self.right_box = Some(*b),
        }
    }

    fn into_result(self) -> Option<SplitResult> {
        Some(SplitResult {
            left_box: self.left_box?,
            right_box: self.right_box?,
            left: self.left,
            right: self.right,
        })
    }
}

/// Growth of a group that may still be empty
fn group_penalty(group: &Option<StBox>, b: &StBox) -> f64 {
    group.as_ref().map_or(0.0, |g| penalty(g, b))
}

/// First half left, second half right
fn fallback_split(entries: &[StBox]) -> Result<SplitResult> {
    let half = entries.len() / 2;
    Ok(SplitResult {
        left: (0..half).collect(),
        right: (half..entries.len()).collect(),
        left_box: union_of(&entries[..half])?,
        right_box: union_of(&entries[half..])?,
    })
}

fn check_split_input(entries: &[StBox], min_fill_ratio: f64) -> Result<()> {
    if entries.len() < 2 {
        return Err(SpanBoxError::InvalidArgument(format!(
            "cannot split {} entries, at least two are needed",
            entries.len()
        )));
    }
    if !(min_fill_ratio > 0.0 && min_fill_ratio <= 0.5) {
        return Err(SpanBoxError::InvalidArgument(format!(
            "minimum fill ratio {min_fill_ratio} is outside of (0, 0.5]"
        )));
    }
    let mut reference: Option<&StBox> = None;
    for b in entries.iter().filter(|b| b.has_x()) {
        match reference {
            None if b.srid() != 0 => reference = Some(b),
            Some(r) if (b.srid() != 0 && b.srid() != r.srid()) || b.is_geodetic() != r.is_geodetic() => {
                return Err(SpanBoxError::InvalidArgument(format!(
                    "cannot split entries with SRIDs {} and {}",
                    r.srid(),
                    b.srid()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Split node entries into two groups with the double-sorting heuristic
///
/// Only candidates whose smaller group holds more than `min_fill_ratio` of the entries are
/// accepted; without any, the entries are split in half in their given order.
///
/// # Errors
/// [`SpanBoxError::InvalidArgument`] for fewer than two entries, entries in different
/// reference systems, or a ratio outside of `(0, 0.5]`.
pub fn split(entries: &[StBox], min_fill_ratio: f64) -> Result<SplitResult> {
    #[cfg(feature = "profiling")]
    profiling::scope!("split");

    check_split_input(entries, min_fill_ratio)?;
    let n = entries.len();
    let mut bounding = entries[0];
    for b in &entries[1..] {
        bounding.expand(b);
    }

    let mut context = SplitContext {
        entries: n,
        min_fill_ratio,
        best: None,
    };
    for axis in Axis::ALL {
        let Some((min, max)) = bounding.axis_range(axis) else {
            continue;
        };
        let intervals: Option<Vec<SplitInterval>> = entries
            .iter()
            .map(|b| {
                b.axis_range(axis)
                    .map(|(lower, upper)| SplitInterval { lower, upper })
            })
            .collect();
        // Axes missing from some entry cannot separate them
        if let Some(intervals) = intervals {
            context.scan_axis(axis, max - min, &intervals);
        }
    }

    let Some(best) = context.best else {
        warn!(entries = n, "No acceptable split candidate, using trivial split");
        return fallback_split(entries);
    };

    // Distribute entries that fit only one group, collect the ones that fit both
    let mut groups = Groups::default();
    let mut common = Vec::new();
    for (index, b) in entries.iter().enumerate() {
        let Some((lower, upper)) = b.axis_range(best.axis) else {
            groups.place_right(index, b);
            continue;
        };
        if upper <= best.left_upper {
            if lower >= best.right_lower {
                common.push(index);
            } else {
                groups.place_left(index, b);
            }
        } else {
            groups.place_right(index, b);
        }
    }

    if !common.is_empty() {
        // Minimum number of entries in each group to reach the fill ratio
        let m = (min_fill_ratio * n as f64).ceil() as usize;
        let mut common: Vec<(usize, f64)> = common
            .into_iter()
            .map(|index| {
                let b = &entries[index];
                let delta = (group_penalty(&groups.left_box, b)
                    - group_penalty(&groups.right_box, b))
                .abs();
                (index, delta)
            })
            .collect();
        common.sort_by(|a, b| a.1.total_cmp(&b.1));

        let count = common.len();
        for (i, (index, _)) in common.into_iter().enumerate() {
            let b = &entries[index];
            let remaining = count - i;
            if groups.left.len() + remaining <= m {
                groups.place_left(index, b);
            } else if groups.right.len() + remaining <= m {
                groups.place_right(index, b);
            } else if group_penalty(&groups.left_box, b) < group_penalty(&groups.right_box, b) {
                groups.place_left(index, b);
            } else {
                groups.place_right(index, b);
            }
        }
    }

    debug!(
        axis = ?best.axis,
        left = groups.left.len(),
        right = groups.right.len(),
        overlap = best.overlap,
        "Split node"
    );
    match groups.into_result() {
        Some(result) => Ok(result),
        None => {
            warn!(entries = n, "Split left a group empty, using trivial split");
            fallback_split(entries)
        }
    }
}
