//! Fractional sort ranks. A new rank is always derived from its neighbours,
//! so inserting never renumbers anything else.

use planner_shared::InsertPosition;
use uuid::Uuid;

/// Rank for a slot between two neighbours. One missing neighbour shifts the
/// other by one; no neighbours at all gives zero.
pub fn rank_between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (Some(lo), Some(hi)) => (lo + hi) / 2.0,
        (Some(lo), None) => lo + 1.0,
        (None, Some(hi)) => hi - 1.0,
        (None, None) => 0.0,
    }
}

/// Rank that puts an item after everything in `ordered`.
pub fn rank_after_last(ordered: &[(Uuid, f64)], moving: Uuid) -> f64 {
    let last = ordered
        .iter()
        .filter(|(id, _)| *id != moving)
        .map(|(_, rank)| *rank)
        .last();
    rank_between(last, None)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertPlan {
    /// Ordinal among the other items once the mover is taken out.
    pub index: usize,
    pub rank: f64,
    /// False when the mover already sits at `index`.
    pub changed: bool,
}

/// Works out where `moving` lands when dropped before/after `anchor`.
///
/// `ordered` is the destination bucket in display order and may or may not
/// contain `moving`. Returns `None` when the anchor is the mover itself or is
/// not in the bucket.
pub fn plan_insert(
    ordered: &[(Uuid, f64)],
    moving: Uuid,
    anchor: Uuid,
    position: InsertPosition,
) -> Option<InsertPlan> {
    if anchor == moving {
        return None;
    }

    let current = ordered.iter().position(|(id, _)| *id == moving);
    let others: Vec<(Uuid, f64)> = ordered
        .iter()
        .copied()
        .filter(|(id, _)| *id != moving)
        .collect();

    let anchor_idx = others.iter().position(|(id, _)| *id == anchor)?;
    let index = match position {
        InsertPosition::Before => anchor_idx,
        InsertPosition::After => anchor_idx + 1,
    };

    let before = index.checked_sub(1).and_then(|i| others.get(i)).map(|(_, r)| *r);
    let after = others.get(index).map(|(_, r)| *r);

    Some(InsertPlan {
        index,
        rank: rank_between(before, after),
        changed: current != Some(index),
    })
}
