//! Round-robin selection over the rotation order.

use crate::error::NoEligibleReviewer;
use crate::state::{ReviewerId, RosterEntry};

/// Pick the head of `eligible` and move it to the tail of `order`.
///
/// Entries are matched by id, so `eligible` may be any sub-sequence built from
/// `order`. On failure `order` is untouched because nothing is returned.
pub fn select(
    order: &[RosterEntry],
    eligible: &[&RosterEntry],
) -> Result<(RosterEntry, Vec<RosterEntry>), NoEligibleReviewer> {
    let chosen = eligible.first().ok_or(NoEligibleReviewer)?;
    let new_order = move_to_tail(order, &chosen.id);
    Ok(((*chosen).clone(), new_order))
}

/// `order` with the entry for `id` moved to the back; other entries keep
/// their relative order. An unknown id is appended.
pub fn move_to_tail(order: &[RosterEntry], id: &ReviewerId) -> Vec<RosterEntry> {
    let mut moved = None;
    let mut new_order = Vec::with_capacity(order.len());
    for entry in order {
        if &entry.id == id {
            moved = Some(entry.clone());
        } else {
            new_order.push(entry.clone());
        }
    }
    new_order.push(moved.unwrap_or_else(|| RosterEntry::new(id.clone())));
    new_order
}
