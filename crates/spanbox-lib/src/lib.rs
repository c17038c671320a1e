//! Spanbox Library - Interval and Box Algebra with an R-tree Index
//!
//! This library provides ranges over ordered domains (integers, doubles, dates and timestamps),
//! canonical sets of such ranges, and axis-aligned spatiotemporal bounding boxes, together with
//! the callbacks of a balanced R-tree over those boxes and a ready-made in-memory tree.
//!
//! # Architecture
//!
//! - **[`Span`]**: Contiguous interval with inclusive/exclusive bounds
//! - **[`SpanSet`]**: Canonical ordered union of disjoint spans
//! - **[`StBox`]**: Bounding box over x/y(/z) and a timestamp period
//! - **[`consistent`], [`union_of`], [`penalty`], [`split`]**: R-tree callbacks, the split being
//!   the double-sorting heuristic
//! - **[`SpatialIndex`]**: In-memory R-tree built on those callbacks
//! - **[`wire`]**: Stable little-endian binary layout
//!
//! # Performance Characteristics
//!
//! - **Span set lookups**: O(log N) binary search over the component spans
//! - **Span set algebra**: O(N + M) merge walks
//! - **Split**: O(N log N) per axis
//! - **Index search**: O(log N + K) for selective queries, K=results

mod consistent;
mod rtree;
mod span;
mod spanset;
mod split;
mod stbox;
pub mod utils;
mod value;
pub mod wire;

// Public API exports
pub use consistent::{Consistency, NodeKind, Strategy, consistent, index_distance};
pub use rtree::{IndexConfig, SearchHit, SpatialIndex};
pub use span::{Span, SpanBound};
pub use spanset::SpanSet;
pub use split::{SplitResult, box_size, penalty, split, union_of};
pub use stbox::{BoxFlags, Dimension, StBox};
pub use value::{BaseType, SpanValue, Timestamp};

/// Error types for the span and box algebra
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpanBoxError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("SRID mismatch: {left} and {right}")]
    SridMismatch { left: i32, right: i32 },

    #[error("Missing dimension: box has no {0} dimension")]
    MissingDimension(Dimension),
}

pub type Result<T> = std::result::Result<T, SpanBoxError>;
