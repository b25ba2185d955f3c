//! Per-request exclusion rules.

use std::collections::HashSet;

use crate::state::{ReviewerId, RosterEntry};

/// Why a roster member cannot review a particular pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exclusion {
    /// They opened it.
    Creator,
    /// It is already assigned to them.
    CurrentAssignee,
    /// On vacation or travelling today.
    Unavailable,
}

/// Return the first exclusion that applies to `id`, if any.
fn exclusion_for(
    id: &ReviewerId,
    creator_id: &ReviewerId,
    current_assignee_id: Option<&ReviewerId>,
    unavailable_ids: &HashSet<ReviewerId>,
) -> Option<Exclusion> {
    if id == creator_id {
        Some(Exclusion::Creator)
    } else if current_assignee_id == Some(id) {
        Some(Exclusion::CurrentAssignee)
    } else if unavailable_ids.contains(id) {
        Some(Exclusion::Unavailable)
    } else {
        None
    }
}

/// The sub-sequence of `order` that may be selected for this request.
///
/// Relative order is preserved, so the head of the result is the eligible
/// member who has waited longest.
pub fn filter_eligible<'a>(
    order: &'a [RosterEntry],
    creator_id: &ReviewerId,
    current_assignee_id: Option<&ReviewerId>,
    unavailable_ids: &HashSet<ReviewerId>,
) -> Vec<&'a RosterEntry> {
    order
        .iter()
        .filter(|entry| {
            exclusion_for(&entry.id, creator_id, current_assignee_id, unavailable_ids).is_none()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(ids: &[&str]) -> Vec<RosterEntry> {
        ids.iter().map(|id| RosterEntry::new(*id)).collect()
    }

    fn ids<'a>(entries: &[&'a RosterEntry]) -> Vec<&'a str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_creator_excluded() {
        let order = roster(&["alice", "bob", "carol"]);
        let eligible = filter_eligible(&order, &"alice".into(), None, &HashSet::new());
        assert_eq!(ids(&eligible), vec!["bob", "carol"]);
    }

    #[test]
    fn test_assignee_and_unavailable_excluded() {
        let order = roster(&["alice", "bob", "carol", "dave"]);
        let unavailable: HashSet<ReviewerId> = [ReviewerId::from("carol")].into_iter().collect();
        let assignee = ReviewerId::from("bob");
        let eligible = filter_eligible(&order, &"erin".into(), Some(&assignee), &unavailable);
        assert_eq!(ids(&eligible), vec!["alice", "dave"]);
    }

    #[test]
    fn test_everyone_excluded_gives_empty() {
        let order = roster(&["alice"]);
        let eligible = filter_eligible(&order, &"alice".into(), None, &HashSet::new());
        assert!(eligible.is_empty());
    }

    #[test]
    fn test_unknown_unavailable_ids_are_harmless() {
        let order = roster(&["alice", "bob"]);
        let unavailable: HashSet<ReviewerId> = [ReviewerId::from("zoe")].into_iter().collect();
        let eligible = filter_eligible(&order, &"dave".into(), None, &unavailable);
        assert_eq!(ids(&eligible), vec!["alice", "bob"]);
    }

    #[test]
    fn test_exclusion_precedence() {
        // Creator wins when the creator is also the assignee and away
        let me = ReviewerId::from("alice");
        let unavailable: HashSet<ReviewerId> = [me.clone()].into_iter().collect();
        assert_eq!(
            exclusion_for(&me, &me, Some(&me), &unavailable),
            Some(Exclusion::Creator)
        );
        assert_eq!(
            exclusion_for(&me, &"bob".into(), None, &unavailable),
            Some(Exclusion::Unavailable)
        );
    }
}
