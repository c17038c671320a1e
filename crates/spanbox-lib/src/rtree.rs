//! In-memory R-tree over [`StBox`] keys
//!
//! The tree is a thin host around the index callbacks: [`consistent`] drives the descent,
//! [`penalty`] picks the subtree for an insertion and [`split`] divides overflowing nodes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consistent::{NodeKind, Strategy, consistent, index_distance};
use crate::split::{SplitResult, box_size, penalty, split, union_of};
use crate::stbox::Axis;
use crate::{Result, SpanBoxError, StBox};

/// Configuration for the spatial index
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexConfig {
    /// Maximum number of entries a node holds before it is split
    pub max_entries: usize,

    /// Smallest share of a node's entries each half of a split must receive
    ///
    /// Must lie in `(0, 0.5]`.
    pub min_fill_ratio: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_entries: 16,
            min_fill_ratio: 0.3,
        }
    }
}

impl IndexConfig {
    /// Smallest node capacity accepted by [`IndexConfig::validate`]
    pub const MIN_CAPACITY: usize = 4;

    /// Check that the configuration can build a tree
    pub fn validate(&self) -> Result<()> {
        if self.max_entries < Self::MIN_CAPACITY {
            return Err(SpanBoxError::InvalidArgument(format!(
                "node capacity {} is below {}",
                self.max_entries,
                Self::MIN_CAPACITY
            )));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 0.5) {
            return Err(SpanBoxError::InvalidArgument(format!(
                "minimum fill ratio {} is outside of (0, 0.5]",
                self.min_fill_ratio
            )));
        }
        Ok(())
    }
}

/// One result of [`SpatialIndex::search`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<Id> {
    pub id: Id,
    /// The box matched but the indexed value itself still has to be tested
    pub recheck: bool,
}

#[derive(Debug, Clone)]
enum Node<Id> {
    Leaf(Vec<(StBox, Id)>),
    Internal(Vec<(StBox, Node<Id>)>),
}

impl<Id> Node<Id> {
    fn kind(&self) -> NodeKind {
        match self {
            Node::Leaf(_) => NodeKind::Leaf,
            Node::Internal(_) => NodeKind::Internal,
        }
    }
}

/// Second half of a node that overflowed, to be added next to it in the parent
struct Overflow<Id> {
    left_box: StBox,
    right_box: StBox,
    right: Node<Id>,
}

/// R-tree mapping boxes to caller-chosen ids
///
/// All keys must share a reference system; inserting a box whose SRID or geodetic flag
/// conflicts with the keys already stored fails with [`SpanBoxError::SridMismatch`].
#[derive(Debug, Clone)]
pub struct SpatialIndex<Id> {
    config: IndexConfig,
    root: Node<Id>,
    root_box: Option<StBox>,
    len: usize,
    depth: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<Id> SpatialIndex<Id> {
    /// Create an empty index
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            root: Node::Leaf(Vec::new()),
            root_box: None,
            len: 0,
            depth: 1,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, 1 while the root is a leaf
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Box covering every stored key, `None` for an empty index
    pub fn root_box(&self) -> Option<StBox> {
        self.root_box
    }

    /// Add an entry
    ///
    /// The entry descends into the child whose box grows the least (ties go to the smaller
    /// box). Nodes holding more than `max_entries` are split, and a split of the root adds
    /// a level to the tree.
    pub fn insert(&mut self, bbox: StBox, id: Id) -> Result<()> {
        let root_box = match &self.root_box {
            Some(current) => current.union(&bbox)?,
            None => bbox,
        };

        if let Some(overflow) = insert_into(&mut self.root, bbox, id, &self.config)? {
            let left = std::mem::replace(&mut self.root, Node::Leaf(Vec::new()));
            self.root = Node::Internal(vec![
                (overflow.left_box, left),
                (overflow.right_box, overflow.right),
            ]);
            self.depth += 1;
            debug!(depth = self.depth, entries = self.len + 1, "Promoted new root");
        }

        self.root_box = Some(root_box);
        self.len += 1;
        Ok(())
    }

    /// Find the entries whose key satisfies `strategy` against `query`
    ///
    /// Internal nodes are pruned with the relaxed check, leaves are tested exactly. Each
    /// hit carries the recheck flag of the strategy.
    pub fn search(&self, strategy: Strategy, query: &StBox) -> Vec<SearchHit<Id>>
    where
        Id: Clone,
    {
        let mut hits = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            let kind = node.kind();
            match node {
                Node::Leaf(entries) => {
                    for (key, id) in entries {
                        let check = consistent(kind, strategy, key, query);
                        if check.matches {
                            hits.push(SearchHit {
                                id: id.clone(),
                                recheck: check.recheck,
                            });
                        }
                    }
                }
                Node::Internal(children) => {
                    for (key, child) in children {
                        if consistent(kind, strategy, key, query).matches {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        hits
    }

    /// Run [`SpatialIndex::search`] for many queries in parallel
    ///
    /// Results are returned in the order of `queries`.
    pub fn search_batch(&self, strategy: Strategy, queries: &[StBox]) -> Vec<Vec<SearchHit<Id>>>
    where
        Id: Clone + Send + Sync,
    {
        queries
            .par_iter()
            .map(|query| self.search(strategy, query))
            .collect()
    }

    /// Up to `k` entries closest to `query`, nearest first
    ///
    /// Entries at infinite distance (no shared dimension, or disjoint periods) are never
    /// returned.
    pub fn nearest(&self, query: &StBox, k: usize) -> Vec<(Id, f64)>
    where
        Id: Clone,
    {
        let mut found = Vec::with_capacity(k.min(self.len));
        if k == 0 {
            return found;
        }

        let mut queue = BinaryHeap::new();
        queue.push(Candidate {
            distance: 0.0,
            item: Item::Node(&self.root),
        });
        while let Some(Candidate { distance, item }) = queue.pop() {
            match item {
                Item::Entry(id) => {
                    found.push((id.clone(), distance));
                    if found.len() == k {
                        break;
                    }
                }
                Item::Node(Node::Leaf(entries)) => {
                    for (key, id) in entries {
                        let distance = index_distance(key, query);
                        if distance.is_finite() {
                            queue.push(Candidate {
                                distance,
                                item: Item::Entry(id),
                            });
                        }
                    }
                }
                Item::Node(Node::Internal(children)) => {
                    for (key, child) in children {
                        let distance = index_distance(key, query);
                        if distance.is_finite() {
                            queue.push(Candidate {
                                distance,
                                item: Item::Node(child),
                            });
                        }
                    }
                }
            }
        }
        found
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<Id: Send> SpatialIndex<Id> {
    /// Build an index from all entries at once with Sort-Tile-Recursive packing
    ///
    /// Entries are sorted by the center of their first axis, cut into vertical slices,
    /// and each slice is sorted by the center of the second axis and cut into full nodes.
    /// The same packing is repeated on the node boxes until a single root remains.
    ///
    /// # Errors
    /// - [`SpanBoxError::InvalidArgument`] for an invalid configuration
    /// - [`SpanBoxError::SridMismatch`] when the keys are in incompatible reference systems
    pub fn bulk_load(config: IndexConfig, entries: Vec<(StBox, Id)>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("rtree::bulk_load");

        let mut index = Self::new(config)?;
        if entries.is_empty() {
            return Ok(index);
        }
        let root_box = union_of(entries.iter().map(|(b, _)| b))?;
        let axes = packing_axes(&root_box);
        let len = entries.len();

        let mut level: Vec<(StBox, Node<Id>)> = pack(entries, config.max_entries, axes)
            .into_iter()
            .map(|group| -> Result<(StBox, Node<Id>)> {
                Ok((union_of(group.iter().map(|(b, _)| b))?, Node::Leaf(group)))
            })
            .collect::<Result<_>>()?;
        let mut depth = 1;
        while level.len() > 1 {
            level = pack(level, config.max_entries, axes)
                .into_iter()
                .map(|group| -> Result<(StBox, Node<Id>)> {
                    Ok((
                        union_of(group.iter().map(|(b, _)| b))?,
                        Node::Internal(group),
                    ))
                })
                .collect::<Result<_>>()?;
            depth += 1;
        }

        if let Some((_, root)) = level.pop() {
            index.root = root;
        }
        index.root_box = Some(root_box);
        index.len = len;
        index.depth = depth;
        debug!(entries = len, depth, "Bulk loaded index");
        Ok(index)
    }
}

/// Insert below `node`; returns the new sibling when `node` had to be split
fn insert_into<Id>(
    node: &mut Node<Id>,
    bbox: StBox,
    id: Id,
    config: &IndexConfig,
) -> Result<Option<Overflow<Id>>> {
    match node {
        Node::Leaf(entries) => {
            entries.push((bbox, id));
            if entries.len() <= config.max_entries {
                return Ok(None);
            }
            let (right, result) = match split_entries(entries, config) {
                Ok(halves) => halves,
                Err(err) => {
                    entries.pop();
                    return Err(err);
                }
            };
            Ok(Some(Overflow {
                left_box: result.left_box,
                right_box: result.right_box,
                right: Node::Leaf(right),
            }))
        }
        Node::Internal(children) => {
            let chosen = choose_subtree(children, &bbox);
            let (key, child) = &mut children[chosen];
            key.expand(&bbox);
            if let Some(overflow) = insert_into(child, bbox, id, config)? {
                *key = overflow.left_box;
                children.push((overflow.right_box, overflow.right));
            }
            if children.len() <= config.max_entries {
                return Ok(None);
            }
            let (right, result) = split_entries(children, config)?;
            Ok(Some(Overflow {
                left_box: result.left_box,
                right_box: result.right_box,
                right: Node::Internal(right),
            }))
        }
    }
}

/// Child whose box needs the least enlargement, the smaller one on ties
fn choose_subtree<T>(children: &[(StBox, T)], bbox: &StBox) -> usize {
    children
        .iter()
        .map(|(key, _)| (penalty(key, bbox), box_size(key)))
        .enumerate()
        .min_by(|(_, a), (_, b)| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

/// Divide the entries of an overflowing node into the two groups chosen by [`split`]
///
/// `entries` keeps the left group and the right group is returned. On error `entries` is
/// left untouched.
fn split_entries<T>(
    entries: &mut Vec<(StBox, T)>,
    config: &IndexConfig,
) -> Result<(Vec<(StBox, T)>, SplitResult)> {
    let boxes: Vec<StBox> = entries.iter().map(|(b, _)| *b).collect();
    let result = split(&boxes, config.min_fill_ratio)?;

    let mut goes_left = vec![false; entries.len()];
    for &index in &result.left {
        goes_left[index] = true;
    }
    let mut left = Vec::with_capacity(result.left.len());
    let mut right = Vec::with_capacity(result.right.len());
    for (entry, is_left) in entries.drain(..).zip(goes_left) {
        if is_left {
            left.push(entry);
        } else {
            right.push(entry);
        }
    }
    *entries = left;
    Ok((right, result))
}

/// The two axes used to order entries while packing
fn packing_axes(root_box: &StBox) -> (Axis, Axis) {
    let mut present = Axis::ALL
        .into_iter()
        .filter(|&axis| root_box.axis_range(axis).is_some());
    let first = present.next().unwrap_or(Axis::T);
    let second = present.next().unwrap_or(first);
    (first, second)
}

fn center(b: &StBox, axis: Axis) -> f64 {
    b.axis_range(axis)
        .map(|(lower, upper)| lower + (upper - lower) / 2.0)
        .unwrap_or(f64::NEG_INFINITY)
}

/// Sort-Tile-Recursive grouping of one level into nodes of at most `capacity` entries
fn pack<T: Send>(
    mut items: Vec<(StBox, T)>,
    capacity: usize,
    (first, second): (Axis, Axis),
) -> Vec<Vec<(StBox, T)>> {
    let nodes = items.len().div_ceil(capacity);
    let slices = (nodes as f64).sqrt().ceil().max(1.0) as usize;
    let slice_len = capacity * nodes.div_ceil(slices);

    items.par_sort_by(|a, b| center(&a.0, first).total_cmp(&center(&b.0, first)));

    let mut groups = Vec::with_capacity(nodes);
    let mut rest = items;
    while !rest.is_empty() {
        let tail = rest.split_off(slice_len.min(rest.len()));
        let mut slice = std::mem::replace(&mut rest, tail);
        slice.par_sort_by(|a, b| center(&a.0, second).total_cmp(&center(&b.0, second)));
        while !slice.is_empty() {
            let tail = slice.split_off(capacity.min(slice.len()));
            groups.push(std::mem::replace(&mut slice, tail));
        }
    }
    groups
}

enum Item<'a, Id> {
    Node(&'a Node<Id>),
    Entry(&'a Id),
}

/// Queue element of the nearest-neighbour scan, ordered so the heap pops the closest first
struct Candidate<'a, Id> {
    distance: f64,
    item: Item<'a, Id>,
}

impl<Id> PartialEq for Candidate<'_, Id> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<Id> Eq for Candidate<'_, Id> {}

impl<Id> PartialOrd for Candidate<'_, Id> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Id> Ord for Candidate<'_, Id> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Entries pop before nodes at the same distance
        let rank = |item: &Item<'_, Id>| match item {
            Item::Entry(_) => 0,
            Item::Node(_) => 1,
        };
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| rank(&other.item).cmp(&rank(&self.item)))
    }
}
