//! Roster drift detection.
//!
//! Team membership changes between requests. The persisted order is merged
//! with the live roster so that members who stay keep their place in the
//! rotation and newcomers join at the back.

use std::collections::HashSet;

use crate::state::{ReviewerId, RosterEntry};

/// Merge the live roster into the persisted rotation order.
///
/// Membership is compared as a set. When the sets match the persisted order
/// is returned as is, even if the live roster lists members differently.
/// Otherwise the surviving persisted entries keep their relative order and
/// unseen live entries are appended in live order. Duplicate ids in the live
/// roster collapse to their first occurrence.
pub fn reconcile(persisted: &[RosterEntry], live: &[RosterEntry]) -> Vec<RosterEntry> {
    let live_ids: HashSet<&ReviewerId> = live.iter().map(|e| &e.id).collect();
    let persisted_ids: HashSet<&ReviewerId> = persisted.iter().map(|e| &e.id).collect();

    if !persisted.is_empty() && persisted_ids == live_ids {
        return persisted.to_vec();
    }

    let mut seen: HashSet<&ReviewerId> = HashSet::with_capacity(live.len());
    let mut order = Vec::with_capacity(live.len());

    for entry in persisted.iter().chain(live.iter()) {
        if live_ids.contains(&entry.id) && seen.insert(&entry.id) {
            order.push(entry.clone());
        }
    }

    order
}

/// True when the persisted order no longer matches live membership.
pub fn has_drifted(persisted: &[RosterEntry], live: &[RosterEntry]) -> bool {
    let live_ids: HashSet<&ReviewerId> = live.iter().map(|e| &e.id).collect();
    let persisted_ids: HashSet<&ReviewerId> = persisted.iter().map(|e| &e.id).collect();
    persisted.is_empty() || persisted_ids != live_ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roster(ids: &[&str]) -> Vec<RosterEntry> {
        ids.iter().map(|id| RosterEntry::new(*id)).collect()
    }

    fn ids(order: &[RosterEntry]) -> Vec<&str> {
        order.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_empty_persisted_takes_live_order() {
        let live = roster(&["alice", "bob", "carol"]);
        assert_eq!(ids(&reconcile(&[], &live)), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_same_members_keeps_persisted_order() {
        let persisted = roster(&["carol", "alice", "bob"]);
        let live = roster(&["alice", "bob", "carol"]);
        assert_eq!(ids(&reconcile(&persisted, &live)), vec!["carol", "alice", "bob"]);
        assert!(!has_drifted(&persisted, &live));
    }

    #[test]
    fn test_same_members_keeps_persisted_display() {
        let persisted = vec![RosterEntry::new("alice").with_avatar("old")];
        let live = vec![RosterEntry::new("alice").with_avatar("new")];
        let order = reconcile(&persisted, &live);
        assert_eq!(order[0].display.avatar_url.as_deref(), Some("old"));
    }

    #[test]
    fn test_new_member_appended_at_tail() {
        let persisted = roster(&["carol", "alice", "bob"]);
        let live = roster(&["dave", "alice", "bob", "carol"]);
        assert_eq!(
            ids(&reconcile(&persisted, &live)),
            vec!["carol", "alice", "bob", "dave"]
        );
    }

    #[test]
    fn test_removed_member_dropped_without_reordering() {
        let persisted = roster(&["carol", "alice", "bob", "dave"]);
        let live = roster(&["alice", "bob", "dave"]);
        assert_eq!(ids(&reconcile(&persisted, &live)), vec!["alice", "bob", "dave"]);
    }

    #[test]
    fn test_swap_of_same_size_is_detected() {
        // A length-only comparison would miss this
        let persisted = roster(&["alice", "bob"]);
        let live = roster(&["alice", "erin"]);
        assert!(has_drifted(&persisted, &live));
        assert_eq!(ids(&reconcile(&persisted, &live)), vec!["alice", "erin"]);
    }

    #[test]
    fn test_empty_live_roster_empties_order() {
        let persisted = roster(&["alice", "bob"]);
        assert!(reconcile(&persisted, &[]).is_empty());
    }

    #[test]
    fn test_duplicate_live_ids_collapse() {
        let live = roster(&["alice", "bob", "alice"]);
        assert_eq!(ids(&reconcile(&[], &live)), vec!["alice", "bob"]);
    }

    fn arb_ids() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::hash_set("[a-h]", 0..8).prop_map(|s| s.into_iter().collect())
    }

    proptest! {
        /// Property: result membership equals live membership.
        #[test]
        fn reconciled_set_equals_live_set(persisted in arb_ids(), live in arb_ids()) {
            let persisted: Vec<RosterEntry> = persisted.iter().map(|s| RosterEntry::new(s.as_str())).collect();
            let live: Vec<RosterEntry> = live.iter().map(|s| RosterEntry::new(s.as_str())).collect();
            let order = reconcile(&persisted, &live);

            let got: HashSet<&ReviewerId> = order.iter().map(|e| &e.id).collect();
            let want: HashSet<&ReviewerId> = live.iter().map(|e| &e.id).collect();
            prop_assert_eq!(got, want);
            prop_assert_eq!(order.len(), live.len());
        }

        /// Property: members common to both rosters keep their persisted relative order,
        /// and newcomers sit behind all of them.
        #[test]
        fn reconcile_preserves_survivor_positions(persisted in arb_ids(), live in arb_ids()) {
            let persisted: Vec<RosterEntry> = persisted.iter().map(|s| RosterEntry::new(s.as_str())).collect();
            let live: Vec<RosterEntry> = live.iter().map(|s| RosterEntry::new(s.as_str())).collect();
            let order = reconcile(&persisted, &live);

            let live_ids: HashSet<&ReviewerId> = live.iter().map(|e| &e.id).collect();
            let survivors: Vec<&ReviewerId> = persisted
                .iter()
                .map(|e| &e.id)
                .filter(|id| live_ids.contains(id))
                .collect();
            let head: Vec<&ReviewerId> = order.iter().take(survivors.len()).map(|e| &e.id).collect();
            prop_assert_eq!(head, survivors);
        }

        /// Property: removing one member keeps everyone else's relative order.
        #[test]
        fn removing_member_preserves_relative_order(persisted in arb_ids(), victim in 0usize..8) {
            prop_assume!(!persisted.is_empty());
            let persisted: Vec<RosterEntry> = persisted.iter().map(|s| RosterEntry::new(s.as_str())).collect();
            let victim = victim % persisted.len();
            let mut live = persisted.clone();
            live.remove(victim);
            live.reverse();

            let order = reconcile(&persisted, &live);
            let mut expected = persisted.clone();
            expected.remove(victim);
            prop_assert_eq!(order, expected);
        }
    }
}
