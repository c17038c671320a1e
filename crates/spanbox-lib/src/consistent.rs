//! Consistency checks of the R-tree
//!
//! A leaf entry is tested with the exact box predicate. An internal entry is tested with a
//! relaxation that is false only when no box inside it can satisfy the predicate, so a search
//! never prunes a matching leaf.

use crate::{Result, StBox};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of node an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Leaf,
    Internal,
}

/// Box predicate answered by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    Overlaps,
    Contains,
    ContainedBy,
    Same,
    Adjacent,
    Left,
    OverLeft,
    Right,
    OverRight,
    Below,
    OverBelow,
    Above,
    OverAbove,
    Front,
    OverFront,
    Back,
    OverBack,
    Before,
    OverBefore,
    After,
    OverAfter,
}

impl Strategy {
    pub const ALL: [Strategy; 21] = [
        Strategy::Overlaps,
        Strategy::Contains,
        Strategy::ContainedBy,
        Strategy::Same,
        Strategy::Adjacent,
        Strategy::Left,
        Strategy::OverLeft,
        Strategy::Right,
        Strategy::OverRight,
        Strategy::Below,
        Strategy::OverBelow,
        Strategy::Above,
        Strategy::OverAbove,
        Strategy::Front,
        Strategy::OverFront,
        Strategy::Back,
        Strategy::OverBack,
        Strategy::Before,
        Strategy::OverBefore,
        Strategy::After,
        Strategy::OverAfter,
    ];

    /// Whether a leaf match only approximates the predicate on the indexed value
    ///
    /// Topological predicates on boxes, adjacency included, ignore bound inclusivity and the
    /// shape inside the box. Directional predicates compare only minima and maxima and are
    /// exact.
    pub fn recheck(self) -> bool {
        match self {
            Strategy::Overlaps
            | Strategy::Contains
            | Strategy::ContainedBy
            | Strategy::Same
            | Strategy::Adjacent => true,
            Strategy::Left
            | Strategy::OverLeft
            | Strategy::Right
            | Strategy::OverRight
            | Strategy::Below
            | Strategy::OverBelow
            | Strategy::Above
            | Strategy::OverAbove
            | Strategy::Front
            | Strategy::OverFront
            | Strategy::Back
            | Strategy::OverBack
            | Strategy::Before
            | Strategy::OverBefore
            | Strategy::After
            | Strategy::OverAfter => false,
        }
    }
}

/// Answer of a consistency check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consistency {
    /// The entry (or something below it) may satisfy the predicate
    pub matches: bool,
    /// A match has to be confirmed on the indexed value
    pub recheck: bool,
}

/// Predicates that fail on a missing dimension are undefined and never match
fn defined(result: Result<bool>) -> bool {
    result.unwrap_or(false)
}

/// Negation of a predicate that stays false when the predicate is undefined
fn not(result: Result<bool>) -> bool {
    result.map(|v| !v).unwrap_or(false)
}

fn leaf_consistent(strategy: Strategy, key: &StBox, query: &StBox) -> bool {
    match strategy {
        Strategy::Overlaps => key.overlaps(query),
        Strategy::Contains => key.contains(query),
        Strategy::ContainedBy => key.contained(query),
        Strategy::Same => key.same(query),
        Strategy::Adjacent => key.adjacent(query),
        Strategy::Left => defined(key.left(query)),
        Strategy::OverLeft => defined(key.overleft(query)),
        Strategy::Right => defined(key.right(query)),
        Strategy::OverRight => defined(key.overright(query)),
        Strategy::Below => defined(key.below(query)),
        Strategy::OverBelow => defined(key.overbelow(query)),
        Strategy::Above => defined(key.above(query)),
        Strategy::OverAbove => defined(key.overabove(query)),
        Strategy::Front => defined(key.front(query)),
        Strategy::OverFront => defined(key.overfront(query)),
        Strategy::Back => defined(key.back(query)),
        Strategy::OverBack => defined(key.overback(query)),
        Strategy::Before => defined(key.before(query)),
        Strategy::OverBefore => defined(key.overbefore(query)),
        Strategy::After => defined(key.after(query)),
        Strategy::OverAfter => defined(key.overafter(query)),
    }
}

/// `key` bounds a subtree: test whether any box inside it could match
fn internal_consistent(strategy: Strategy, key: &StBox, query: &StBox) -> bool {
    match strategy {
        Strategy::Overlaps | Strategy::ContainedBy => key.overlaps(query),
        Strategy::Contains | Strategy::Same => key.contains(query),
        Strategy::Adjacent => key.adjacent(query) || key.overlaps(query),
        Strategy::Left => not(key.overright(query)),
        Strategy::OverLeft => not(key.right(query)),
        Strategy::Right => not(key.overleft(query)),
        Strategy::OverRight => not(key.left(query)),
        Strategy::Below => not(key.overabove(query)),
        Strategy::OverBelow => not(key.above(query)),
        Strategy::Above => not(key.overbelow(query)),
        Strategy::OverAbove => not(key.below(query)),
        Strategy::Front => not(key.overback(query)),
        Strategy::OverFront => not(key.back(query)),
        Strategy::Back => not(key.overfront(query)),
        Strategy::OverBack => not(key.front(query)),
        Strategy::Before => not(key.overafter(query)),
        Strategy::OverBefore => not(key.after(query)),
        Strategy::After => not(key.overbefore(query)),
        Strategy::OverAfter => not(key.before(query)),
    }
}

/// Test an index entry against a query box
pub fn consistent(kind: NodeKind, strategy: Strategy, key: &StBox, query: &StBox) -> Consistency {
    let matches = match kind {
        NodeKind::Leaf => leaf_consistent(strategy, key, query),
        NodeKind::Internal => internal_consistent(strategy, key, query),
    };
    Consistency {
        matches,
        recheck: strategy.recheck(),
    }
}

/// Distance used to order nearest-neighbour scans; a lower bound for every box inside `key`
pub fn index_distance(key: &StBox, query: &StBox) -> f64 {
    key.distance(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Span, Timestamp};
    use chrono::{TimeZone, Utc};
    use proptest::strategy::Strategy as _;
    use proptest::{prop_assert, proptest};

    fn ts(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn cube(x: f64, y: f64, z: f64, size: f64, from: u32, to: u32) -> StBox {
        StBox::from_xyz(x, x + size, y, y + size, z, z + size, 0)
            .unwrap()
            .with_period(Span::closed(ts(from), ts(to)).unwrap())
    }

    #[test]
    fn test_recheck_flags() {
        assert!(Strategy::Overlaps.recheck());
        assert!(Strategy::Same.recheck());
        assert!(Strategy::Adjacent.recheck());
        assert!(!Strategy::Left.recheck());
        assert!(!Strategy::OverAfter.recheck());
        assert_eq!(Strategy::ALL.iter().filter(|s| s.recheck()).count(), 5);
    }

    #[test]
    fn test_adjacent_periods_sharing_an_instant_need_recheck() {
        let key = StBox::from_period(Span::closed(ts(1), ts(2)).unwrap());
        let query = StBox::from_period(Span::closed(ts(2), ts(3)).unwrap());
        // The closed periods overlap at ts(2), the boxes only touch
        assert!(key.period().unwrap().overlaps(query.period().unwrap()));
        assert!(!key.period().unwrap().adjacent(query.period().unwrap()));
        let check = consistent(NodeKind::Leaf, Strategy::Adjacent, &key, &query);
        assert_eq!(
            check,
            Consistency {
                matches: true,
                recheck: true
            }
        );
    }

    #[test]
    fn test_leaf_is_exact() {
        let key = cube(0.0, 0.0, 0.0, 1.0, 1, 2);
        let query = cube(2.0, 0.0, 0.0, 1.0, 1, 2);
        let left = consistent(NodeKind::Leaf, Strategy::Left, &key, &query);
        assert_eq!(
            left,
            Consistency {
                matches: true,
                recheck: false
            }
        );
        assert!(!consistent(NodeKind::Leaf, Strategy::Overlaps, &key, &query).matches);
        assert!(consistent(NodeKind::Leaf, Strategy::Overlaps, &key, &key).recheck);
    }

    #[test]
    fn test_internal_relaxation_keeps_candidates() {
        // The parent overlaps the query although its own right edge is beyond it
        let parent = StBox::from_xy(0.0, 10.0, 0.0, 10.0, 0).unwrap();
        let query = StBox::from_xy(5.0, 6.0, 0.0, 1.0, 0).unwrap();
        assert!(!consistent(NodeKind::Leaf, Strategy::Left, &parent, &query).matches);
        assert!(consistent(NodeKind::Internal, Strategy::Left, &parent, &query).matches);
        let beyond = StBox::from_xy(6.0, 10.0, 0.0, 10.0, 0).unwrap();
        assert!(!consistent(NodeKind::Internal, Strategy::Left, &beyond, &query).matches);
    }

    #[test]
    fn test_missing_dimension_never_matches() {
        let spatial = StBox::from_xy(0.0, 1.0, 0.0, 1.0, 0).unwrap();
        let temporal = StBox::from_period(Span::closed(ts(1), ts(2)).unwrap());
        for strategy in Strategy::ALL {
            for kind in [NodeKind::Leaf, NodeKind::Internal] {
                assert!(
                    !consistent(kind, strategy, &spatial, &temporal).matches,
                    "{strategy:?} on {kind:?} matched without a shared dimension"
                );
            }
        }
    }

    #[test]
    fn test_index_distance() {
        let a = StBox::from_xy(0.0, 1.0, 0.0, 1.0, 0).unwrap();
        let b = StBox::from_xy(4.0, 5.0, 0.0, 1.0, 0).unwrap();
        assert_eq!(index_distance(&a, &b), 3.0);
    }

    fn arb_cube() -> impl proptest::strategy::Strategy<Value = StBox> {
        (0u8..10, 0u8..10, 0u8..10, 1u8..4, 0u32..20, 0u32..4).prop_map(
            |(x, y, z, size, from, len)| {
                cube(
                    x as f64,
                    y as f64,
                    z as f64,
                    size as f64,
                    from,
                    from + len,
                )
            },
        )
    }

    proptest! {
        #[test]
        fn test_internal_never_prunes_a_match(
            children in proptest::collection::vec(arb_cube(), 1..6),
            query in arb_cube(),
        ) {
            let mut parent = children[0];
            for child in &children[1..] {
                parent.expand(child);
            }
            for strategy in Strategy::ALL {
                let any_leaf = children
                    .iter()
                    .any(|c| consistent(NodeKind::Leaf, strategy, c, &query).matches);
                if any_leaf {
                    prop_assert!(
                        consistent(NodeKind::Internal, strategy, &parent, &query).matches,
                        "{:?} pruned a matching child",
                        strategy
                    );
                }
            }
        }
    }
}
