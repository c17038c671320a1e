//! StBox - axis-aligned bounding volume over space and time
//!
//! A box has an optional spatial part (x/y, optionally z, with an SRID) and an optional
//! temporal part (a timestamp span); at least one of them is present. Topological predicates
//! only look at the dimensions both boxes share, and compare bound values without regard to
//! inclusivity, so answers computed on boxes are approximations of answers on the values they
//! bound.

use crate::utils::{self, extent};
use crate::value::{SpanValue, Timestamp, shift_timestamp};
use crate::{Result, Span, SpanBoxError};

use chrono::TimeDelta;
use geo::{Coord, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensions present in a box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoxFlags {
    /// x/y extent present
    pub has_x: bool,
    /// z extent present (implies `has_x`)
    pub has_z: bool,
    /// Period present
    pub has_t: bool,
    /// Coordinates are longitude/latitude on a spheroid
    pub geodetic: bool,
}

/// Dimension a predicate can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dimension {
    X,
    Z,
    T,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::X => write!(f, "spatial"),
            Dimension::Z => write!(f, "Z"),
            Dimension::T => write!(f, "temporal"),
        }
    }
}

/// Single axis of a box, projected onto the real line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    X,
    Y,
    Z,
    T,
}

impl Axis {
    pub(crate) const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::T];
}

/// Spatiotemporal bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawStBox", into = "RawStBox"))]
pub struct StBox {
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
    period: Option<Span<Timestamp>>,
    srid: i32,
    flags: BoxFlags,
}

/// Unvalidated serialized form, validated again through [`StBox::new`]
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct RawStBox {
    flags: BoxFlags,
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
    period: Option<Span<Timestamp>>,
    srid: i32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawStBox> for StBox {
    type Error = SpanBoxError;

    fn try_from(raw: RawStBox) -> Result<Self> {
        StBox::new(
            raw.flags,
            [raw.xmin, raw.xmax, raw.ymin, raw.ymax, raw.zmin, raw.zmax],
            raw.period,
            raw.srid,
        )
    }
}

#[cfg(feature = "serde")]
impl From<StBox> for RawStBox {
    fn from(b: StBox) -> Self {
        Self {
            flags: b.flags,
            xmin: b.xmin,
            xmax: b.xmax,
            ymin: b.ymin,
            ymax: b.ymax,
            zmin: b.zmin,
            zmax: b.zmax,
            period: b.period,
            srid: b.srid,
        }
    }
}

/// Dimensions shared by two boxes with compatible reference systems
struct Shared<'a> {
    x: bool,
    z: bool,
    t: Option<(&'a Span<Timestamp>, &'a Span<Timestamp>)>,
}

/// Closed-range intersection test: `None` if disjoint, otherwise whether they only touch
fn closed_overlap<V: PartialOrd + Copy>(amin: V, amax: V, bmin: V, bmax: V) -> Option<bool> {
    let lo = if amin > bmin { amin } else { bmin };
    let hi = if amax < bmax { amax } else { bmax };
    if lo > hi { None } else { Some(lo == hi) }
}

/// Gap between two closed ranges, zero when they overlap
fn gap(amin: f64, amax: f64, bmin: f64, bmax: f64) -> f64 {
    utils::non_negative(amin.max(bmin) - amax.min(bmax))
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    if min.is_nan() || max.is_nan() {
        return Err(SpanBoxError::InvalidRange(format!("{name} extent is NaN")));
    }
    if min > max {
        return Err(SpanBoxError::InvalidRange(format!(
            "{name}min {min} must be less than or equal to {name}max {max}"
        )));
    }
    Ok(())
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl StBox {
    /// Create a box, validating flags against the given extents
    ///
    /// `extent` holds `[xmin, xmax, ymin, ymax, zmin, zmax]`; spatial values are ignored (and
    /// zeroed) when the flags do not ask for them, and so is the SRID of a box without X.
    ///
    /// # Errors
    /// - [`SpanBoxError::InvalidArgument`] when neither X nor T is present, when Z is given
    ///   without X, or when `has_t` disagrees with `period`
    /// - [`SpanBoxError::InvalidRange`] for inverted or NaN spatial ranges
    pub fn new(
        flags: BoxFlags,
        extent: [f64; 6],
        period: Option<Span<Timestamp>>,
        srid: i32,
    ) -> Result<Self> {
        if !flags.has_x && !flags.has_t {
            return Err(SpanBoxError::InvalidArgument(
                "a box needs a spatial or a temporal dimension".to_string(),
            ));
        }
        if flags.has_z && !flags.has_x {
            return Err(SpanBoxError::InvalidArgument(
                "a box with Z must also have X and Y".to_string(),
            ));
        }
        if flags.has_t != period.is_some() {
            return Err(SpanBoxError::InvalidArgument(
                "temporal flag does not match the presence of a period".to_string(),
            ));
        }

        let [xmin, xmax, ymin, ymax, zmin, zmax] = extent;
        let mut result = Self {
            xmin: 0.0,
            xmax: 0.0,
            ymin: 0.0,
            ymax: 0.0,
            zmin: 0.0,
            zmax: 0.0,
            period,
            srid: 0,
            flags: BoxFlags {
                geodetic: flags.geodetic && flags.has_x,
                ..flags
            },
        };
        if flags.has_x {
            check_range("x", xmin, xmax)?;
            check_range("y", ymin, ymax)?;
            (result.xmin, result.xmax, result.ymin, result.ymax) = (xmin, xmax, ymin, ymax);
            result.srid = srid;
        }
        if flags.has_z {
            check_range("z", zmin, zmax)?;
            (result.zmin, result.zmax) = (zmin, zmax);
        }
        Ok(result)
    }

    /// Temporal-only box
    pub fn from_period(period: Span<Timestamp>) -> Self {
        Self {
            xmin: 0.0,
            xmax: 0.0,
            ymin: 0.0,
            ymax: 0.0,
            zmin: 0.0,
            zmax: 0.0,
            period: Some(period),
            srid: 0,
            flags: BoxFlags {
                has_t: true,
                ..Default::default()
            },
        }
    }

    pub fn from_xy(xmin: f64, xmax: f64, ymin: f64, ymax: f64, srid: i32) -> Result<Self> {
        let flags = BoxFlags {
            has_x: true,
            ..Default::default()
        };
        Self::new(flags, [xmin, xmax, ymin, ymax, 0.0, 0.0], None, srid)
    }

    pub fn from_xyz(
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        zmin: f64,
        zmax: f64,
        srid: i32,
    ) -> Result<Self> {
        let flags = BoxFlags {
            has_x: true,
            has_z: true,
            ..Default::default()
        };
        Self::new(flags, [xmin, xmax, ymin, ymax, zmin, zmax], None, srid)
    }

    /// Planar box covering a [`geo::Rect`]
    pub fn from_rect(rect: Rect<f64>, srid: i32) -> Result<Self> {
        let (min, max) = (rect.min(), rect.max());
        Self::from_xy(min.x, max.x, min.y, max.y, srid)
    }

    /// Add (or replace) the temporal dimension
    pub fn with_period(mut self, period: Span<Timestamp>) -> Self {
        self.period = Some(period);
        self.flags.has_t = true;
        self
    }

    /// Mark the spatial coordinates as geodetic; no effect on a box without X
    pub fn with_geodetic(mut self, geodetic: bool) -> Self {
        self.flags.geodetic = geodetic && self.flags.has_x;
        self
    }

    // ---- Accessors ----

    #[inline]
    pub fn flags(&self) -> BoxFlags {
        self.flags
    }

    #[inline]
    pub fn has_x(&self) -> bool {
        self.flags.has_x
    }

    #[inline]
    pub fn has_z(&self) -> bool {
        self.flags.has_z
    }

    #[inline]
    pub fn has_t(&self) -> bool {
        self.flags.has_t
    }

    #[inline]
    pub fn is_geodetic(&self) -> bool {
        self.flags.geodetic
    }

    #[inline]
    pub fn srid(&self) -> i32 {
        self.srid
    }

    #[inline]
    pub fn period(&self) -> Option<&Span<Timestamp>> {
        self.period.as_ref()
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        self.has_x().then_some((self.xmin, self.xmax))
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        self.has_x().then_some((self.ymin, self.ymax))
    }

    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.has_z().then_some((self.zmin, self.zmax))
    }

    /// x/y footprint as a [`geo::Rect`]
    pub fn spatial_rect(&self) -> Option<Rect<f64>> {
        self.has_x().then(|| {
            Rect::new(
                Coord {
                    x: self.xmin,
                    y: self.ymin,
                },
                Coord {
                    x: self.xmax,
                    y: self.ymax,
                },
            )
        })
    }

    /// Range of one axis on the real line; time is in microseconds since the epoch
    pub(crate) fn axis_range(&self, axis: Axis) -> Option<(f64, f64)> {
        match axis {
            Axis::X => self.x_range(),
            Axis::Y => self.y_range(),
            Axis::Z => self.z_range(),
            Axis::T => self
                .period
                .as_ref()
                .map(|p| (p.lower().to_f64(), p.upper().to_f64())),
        }
    }

    fn require(&self, dim: Dimension) -> Result<()> {
        let present = match dim {
            Dimension::X => self.has_x(),
            Dimension::Z => self.has_z(),
            Dimension::T => self.has_t(),
        };
        if present {
            Ok(())
        } else {
            Err(SpanBoxError::MissingDimension(dim))
        }
    }

    /// SRID of a combination of both boxes
    ///
    /// An SRID of 0 is unknown and adopts the other one. Geodetic and planar boxes never mix.
    fn common_srid(&self, other: &StBox) -> Result<i32> {
        if !self.has_x() || !other.has_x() {
            return Ok(if self.has_x() { self.srid } else { other.srid });
        }
        let mismatch = SpanBoxError::SridMismatch {
            left: self.srid,
            right: other.srid,
        };
        if self.is_geodetic() != other.is_geodetic() {
            return Err(mismatch);
        }
        match (self.srid, other.srid) {
            (a, b) if a == b => Ok(a),
            (0, b) => Ok(b),
            (a, 0) => Ok(a),
            _ => Err(mismatch),
        }
    }

    fn shared<'a>(&'a self, other: &'a StBox) -> Option<Shared<'a>> {
        self.common_srid(other).ok()?;
        let x = self.has_x() && other.has_x();
        let t = self.period.as_ref().zip(other.period.as_ref());
        if !x && t.is_none() {
            return None;
        }
        Some(Shared {
            x,
            z: self.has_z() && other.has_z(),
            t,
        })
    }

    // ---- Set operations ----

    /// Grow `self` to cover `other`, taking dimensions from whichever box has them
    ///
    /// No reference system checks are made; see [`StBox::union`].
    pub fn expand(&mut self, other: &StBox) {
        if other.has_x() {
            if self.has_x() {
                self.xmin = self.xmin.min(other.xmin);
                self.xmax = self.xmax.max(other.xmax);
                self.ymin = self.ymin.min(other.ymin);
                self.ymax = self.ymax.max(other.ymax);
                if self.srid == 0 {
                    self.srid = other.srid;
                }
            } else {
                (self.xmin, self.xmax) = (other.xmin, other.xmax);
                (self.ymin, self.ymax) = (other.ymin, other.ymax);
                self.srid = other.srid;
                self.flags.has_x = true;
                self.flags.geodetic = other.is_geodetic();
            }
            if other.has_z() {
                if self.has_z() {
                    self.zmin = self.zmin.min(other.zmin);
                    self.zmax = self.zmax.max(other.zmax);
                } else {
                    (self.zmin, self.zmax) = (other.zmin, other.zmax);
                    self.flags.has_z = true;
                }
            }
        }
        if let Some(period) = &other.period {
            match self.period.as_mut() {
                Some(mine) => mine.expand(period),
                None => self.period = Some(*period),
            }
            self.flags.has_t = true;
        }
    }

    /// Smallest box covering both boxes
    ///
    /// # Errors
    /// [`SpanBoxError::SridMismatch`] for boxes in incompatible reference systems.
    pub fn union(&self, other: &StBox) -> Result<StBox> {
        let srid = self.common_srid(other)?;
        let mut result = *self;
        result.expand(other);
        if result.has_x() {
            result.srid = srid;
        }
        Ok(result)
    }

    /// Box of the shared dimensions covered by both boxes, `None` if they do not intersect
    ///
    /// # Errors
    /// [`SpanBoxError::SridMismatch`] for boxes in incompatible reference systems.
    pub fn intersection(&self, other: &StBox) -> Result<Option<StBox>> {
        let srid = self.common_srid(other)?;
        let has_x = self.has_x() && other.has_x();
        let has_z = self.has_z() && other.has_z();
        let has_t = self.has_t() && other.has_t();
        if !has_x && !has_t {
            return Ok(None);
        }

        let mut extent = [0.0; 6];
        if has_x {
            extent[..4].copy_from_slice(&[
                self.xmin.max(other.xmin),
                self.xmax.min(other.xmax),
                self.ymin.max(other.ymin),
                self.ymax.min(other.ymax),
            ]);
            if extent[0] > extent[1] || extent[2] > extent[3] {
                return Ok(None);
            }
        }
        if has_z {
            extent[4] = self.zmin.max(other.zmin);
            extent[5] = self.zmax.min(other.zmax);
            if extent[4] > extent[5] {
                return Ok(None);
            }
        }
        let period = match (&self.period, &other.period) {
            (Some(a), Some(b)) => match a.intersection(b) {
                Some(p) => Some(p),
                None => return Ok(None),
            },
            _ => None,
        };

        let flags = BoxFlags {
            has_x,
            has_z,
            has_t,
            geodetic: has_x && self.is_geodetic(),
        };
        StBox::new(flags, extent, period, srid).map(Some)
    }

    // ---- Topological predicates ----

    /// `other` lies inside `self` on every shared dimension
    pub fn contains(&self, other: &StBox) -> bool {
        let Some(shared) = self.shared(other) else {
            return false;
        };
        if shared.x
            && !(other.xmin >= self.xmin
                && other.xmax <= self.xmax
                && other.ymin >= self.ymin
                && other.ymax <= self.ymax)
        {
            return false;
        }
        if shared.z && !(other.zmin >= self.zmin && other.zmax <= self.zmax) {
            return false;
        }
        match shared.t {
            Some((p, q)) => q.lower() >= p.lower() && q.upper() <= p.upper(),
            None => true,
        }
    }

    pub fn contained(&self, other: &StBox) -> bool {
        other.contains(self)
    }

    pub fn overlaps(&self, other: &StBox) -> bool {
        self.touching(other).is_some()
    }

    pub fn same(&self, other: &StBox) -> bool {
        let Some(shared) = self.shared(other) else {
            return false;
        };
        if shared.x
            && !(self.xmin == other.xmin
                && self.xmax == other.xmax
                && self.ymin == other.ymin
                && self.ymax == other.ymax)
        {
            return false;
        }
        if shared.z && !(self.zmin == other.zmin && self.zmax == other.zmax) {
            return false;
        }
        match shared.t {
            Some((p, q)) => p.lower() == q.lower() && p.upper() == q.upper(),
            None => true,
        }
    }

    /// The boxes intersect, and the intersection is degenerate in at least one shared dimension
    pub fn adjacent(&self, other: &StBox) -> bool {
        self.touching(other) == Some(true)
    }

    /// `None` when the boxes are disjoint on some shared dimension, otherwise whether the
    /// closed intersection has zero width on any of them
    fn touching(&self, other: &StBox) -> Option<bool> {
        let shared = self.shared(other)?;
        let mut degenerate = false;
        if shared.x {
            degenerate |= closed_overlap(self.xmin, self.xmax, other.xmin, other.xmax)?;
            degenerate |= closed_overlap(self.ymin, self.ymax, other.ymin, other.ymax)?;
        }
        if shared.z {
            degenerate |= closed_overlap(self.zmin, self.zmax, other.zmin, other.zmax)?;
        }
        if let Some((p, q)) = shared.t {
            degenerate |= closed_overlap(p.lower(), p.upper(), q.lower(), q.upper())?;
        }
        Some(degenerate)
    }

    // ---- Position predicates ----

    fn require_both(&self, other: &StBox, dim: Dimension) -> Result<()> {
        self.require(dim)?;
        other.require(dim)?;
        if dim != Dimension::T {
            self.common_srid(other)?;
        }
        Ok(())
    }

    fn periods<'a>(&'a self, other: &'a StBox) -> Result<(&'a Span<Timestamp>, &'a Span<Timestamp>)> {
        self.period
            .as_ref()
            .zip(other.period.as_ref())
            .ok_or(SpanBoxError::MissingDimension(Dimension::T))
    }

    pub fn left(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.xmax < other.xmin)
    }

    pub fn overleft(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.xmax <= other.xmax)
    }

    pub fn right(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.xmin > other.xmax)
    }

    pub fn overright(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.xmin >= other.xmin)
    }

    pub fn below(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.ymax < other.ymin)
    }

    pub fn overbelow(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.ymax <= other.ymax)
    }

    pub fn above(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.ymin > other.ymax)
    }

    pub fn overabove(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::X)?;
        Ok(self.ymin >= other.ymin)
    }

    pub fn front(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::Z)?;
        Ok(self.zmax < other.zmin)
    }

    pub fn overfront(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::Z)?;
        Ok(self.zmax <= other.zmax)
    }

    pub fn back(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::Z)?;
        Ok(self.zmin > other.zmax)
    }

    pub fn overback(&self, other: &StBox) -> Result<bool> {
        self.require_both(other, Dimension::Z)?;
        Ok(self.zmin >= other.zmin)
    }

    pub fn before(&self, other: &StBox) -> Result<bool> {
        let (p, q) = self.periods(other)?;
        Ok(p.left_of(q))
    }

    pub fn overbefore(&self, other: &StBox) -> Result<bool> {
        let (p, q) = self.periods(other)?;
        Ok(p.overleft(q))
    }

    pub fn after(&self, other: &StBox) -> Result<bool> {
        let (p, q) = self.periods(other)?;
        Ok(p.right_of(q))
    }

    pub fn overafter(&self, other: &StBox) -> Result<bool> {
        let (p, q) = self.periods(other)?;
        Ok(p.overright(q))
    }

    // ---- Measures ----

    /// Planar area of the x/y footprint (coordinate units, also for geodetic boxes)
    pub fn area(&self) -> Result<f64> {
        self.require(Dimension::X)?;
        Ok(extent(self.xmin, self.xmax) * extent(self.ymin, self.ymax))
    }

    pub fn perimeter(&self) -> Result<f64> {
        self.require(Dimension::X)?;
        Ok(2.0 * (extent(self.xmin, self.xmax) + extent(self.ymin, self.ymax)))
    }

    pub fn volume(&self) -> Result<f64> {
        self.require(Dimension::Z)?;
        Ok(self.area()? * extent(self.zmin, self.zmax))
    }

    pub fn duration_secs(&self) -> Result<f64> {
        self.require(Dimension::T)?;
        Ok(self.period.as_ref().map_or(0.0, Span::width))
    }

    /// Box grown by `distance` on every spatial axis
    ///
    /// # Errors
    /// [`SpanBoxError::MissingDimension`] without X, [`SpanBoxError::InvalidRange`] when a
    /// negative distance collapses an axis.
    pub fn expand_space(&self, distance: f64) -> Result<StBox> {
        self.require(Dimension::X)?;
        let mut extent = [
            self.xmin - distance,
            self.xmax + distance,
            self.ymin - distance,
            self.ymax + distance,
            0.0,
            0.0,
        ];
        if self.has_z() {
            extent[4] = self.zmin - distance;
            extent[5] = self.zmax + distance;
        }
        StBox::new(self.flags, extent, self.period, self.srid)
    }

    /// Box whose period is grown by `delta` on both ends
    pub fn expand_time(&self, delta: TimeDelta) -> Result<StBox> {
        self.require(Dimension::T)?;
        let mut result = *self;
        if let Some(p) = &self.period {
            result.period = Some(Span::new(
                shift_timestamp(p.lower(), -delta),
                shift_timestamp(p.upper(), delta),
                p.lower_inc(),
                p.upper_inc(),
            )?);
        }
        Ok(result)
    }

    /// Nearest approach distance on the shared spatial axes
    ///
    /// Zero when the boxes overlap in space (or share only time), infinite when their periods
    /// are disjoint or when they share no dimension at all.
    pub fn distance(&self, other: &StBox) -> f64 {
        let Some(shared) = self.shared(other) else {
            return f64::INFINITY;
        };
        if let Some((p, q)) = shared.t
            && closed_overlap(p.lower(), p.upper(), q.lower(), q.upper()).is_none()
        {
            return f64::INFINITY;
        }
        if !shared.x {
            return 0.0;
        }
        let dx = gap(self.xmin, self.xmax, other.xmin, other.xmax);
        let dy = gap(self.ymin, self.ymax, other.ymin, other.ymax);
        let dz = if shared.z {
            gap(self.zmin, self.zmax, other.zmin, other.zmax)
        } else {
            0.0
        };
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
