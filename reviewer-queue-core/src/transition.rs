//! Pure assignment transition.
//!
//! `(state, request) -> (state', result)`. The function has no side effects;
//! callers load the state, run the transition, perform the review request and
//! only then store the new state.
//!
//! Shadows are dropped from the live roster first, so they never enter the
//! order, whatever the team membership says.
//!
//! Per request the queue walks `Reconciling -> Filtering -> Selecting ->
//! ShadowResolving -> Recording`. If filtering leaves nobody, the walk stops
//! at `NoEligible` and there is no new state to store.

use crate::eligibility::filter_eligible;
use crate::reconcile::reconcile;
use crate::rotation::select;
use crate::shadows::{resolve_shadows, ShadowMap};
use crate::state::{AssignmentRequest, AssignmentResult, AssignmentState, RosterEntry};
use crate::stats::record_assignment;

/// Result of running one assignment request through the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// A reviewer was picked; `state` must be persisted once the review request succeeds.
    Assigned {
        state: AssignmentState,
        result: AssignmentResult,
    },
    /// Everyone was excluded. Nothing to persist.
    NoEligibleReviewer {
        /// How many roster members were considered.
        roster_size: usize,
    },
}

impl AssignmentOutcome {
    pub fn result(&self) -> Option<&AssignmentResult> {
        match self {
            Self::Assigned { result, .. } => Some(result),
            Self::NoEligibleReviewer { .. } => None,
        }
    }
}

/// Run one assignment request against `state`.
pub fn assign(
    state: &AssignmentState,
    request: &AssignmentRequest,
    shadow_map: &ShadowMap,
) -> AssignmentOutcome {
    let shadow_ids = shadow_map.shadow_ids();
    let rotation: Vec<RosterEntry> = request
        .live_roster
        .iter()
        .filter(|entry| !shadow_ids.contains(&entry.id))
        .cloned()
        .collect();
    let order = reconcile(&state.order, &rotation);

    let eligible = filter_eligible(
        &order,
        &request.creator_id,
        request.current_assignee_id.as_ref(),
        &request.unavailable_ids,
    );

    let (reviewer, new_order) = match select(&order, &eligible) {
        Ok(selected) => selected,
        Err(_) => {
            return AssignmentOutcome::NoEligibleReviewer {
                roster_size: order.len(),
            }
        }
    };

    let shadows = resolve_shadows(&reviewer.id, shadow_map, &request.creator_id);
    let counts = record_assignment(state.counts.clone(), &reviewer.id);

    AssignmentOutcome::Assigned {
        state: AssignmentState {
            order: new_order,
            counts,
        },
        result: AssignmentResult { reviewer, shadows },
    }
}

/// The state after an explicit stats reset: no counts, and an empty order so
/// the next request rebuilds it from the live roster.
pub fn reset() -> AssignmentState {
    AssignmentState::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ReviewerId;
    use crate::stats::report;
    use proptest::prelude::*;

    fn roster(ids: &[&str]) -> Vec<RosterEntry> {
        ids.iter().map(|id| RosterEntry::new(*id)).collect()
    }

    fn order_ids(state: &AssignmentState) -> Vec<&str> {
        state.order.iter().map(|e| e.id.as_str()).collect()
    }

    fn expect_assigned(outcome: AssignmentOutcome) -> (AssignmentState, AssignmentResult) {
        match outcome {
            AssignmentOutcome::Assigned { state, result } => (state, result),
            other => panic!("expected Assigned, got {:?}", other),
        }
    }

    #[test]
    fn test_three_assignments_rotate_through_roster() {
        let live = roster(&["alice", "bob", "carol"]);
        let shadows = ShadowMap::new();
        let mut state = AssignmentState::default();
        let mut picked = Vec::new();

        for _ in 0..3 {
            let request = AssignmentRequest::new("dave", live.clone());
            let (next, result) = expect_assigned(assign(&state, &request, &shadows));
            picked.push(result.reviewer.id.0.clone());
            state = next;
        }

        assert_eq!(picked, vec!["alice", "bob", "carol"]);
        let lines = report(&state.counts);
        assert!(lines.iter().all(|l| l.percentage == 33 && l.count == 1));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_creator_skipped_and_selected_moves_to_tail() {
        let request = AssignmentRequest::new("alice", roster(&["alice", "bob", "carol"]));
        let (state, result) =
            expect_assigned(assign(&AssignmentState::default(), &request, &ShadowMap::new()));
        assert_eq!(result.reviewer.id.as_str(), "bob");
        assert_eq!(order_ids(&state), vec!["alice", "carol", "bob"]);
    }

    #[test]
    fn test_sole_member_is_creator() {
        let before = AssignmentState {
            order: roster(&["alice"]),
            ..Default::default()
        };
        let request = AssignmentRequest::new("alice", roster(&["alice"]));
        let outcome = assign(&before, &request, &ShadowMap::new());
        assert_eq!(
            outcome,
            AssignmentOutcome::NoEligibleReviewer { roster_size: 1 }
        );
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_empty_roster_has_no_eligible_reviewer() {
        let request = AssignmentRequest::new("alice", vec![]);
        let outcome = assign(&AssignmentState::default(), &request, &ShadowMap::new());
        assert!(matches!(
            outcome,
            AssignmentOutcome::NoEligibleReviewer { roster_size: 0, .. }
        ));
    }

    #[test]
    fn test_shadows_resolved_for_selected_reviewer() {
        let mut shadows = ShadowMap::new();
        shadows.insert("alice", ["zoe"]);
        let request = AssignmentRequest::new("dave", roster(&["alice", "bob"]));
        let (state, result) =
            expect_assigned(assign(&AssignmentState::default(), &request, &shadows));
        assert_eq!(result.shadows, vec![ReviewerId::from("zoe")]);
        // Shadows never count
        assert!(!state.counts.contains_key(&ReviewerId::from("zoe")));
        assert!(!order_ids(&state).contains(&"zoe"));
    }

    #[test]
    fn test_shadow_on_the_team_is_never_rotated() {
        let mut shadows = ShadowMap::new();
        shadows.insert("alice", ["zoe"]);
        let live = roster(&["alice", "zoe"]);
        let mut state = AssignmentState::default();

        for _ in 0..2 {
            let request = AssignmentRequest::new("dave", live.clone());
            let (next, result) = expect_assigned(assign(&state, &request, &shadows));
            assert_eq!(result.reviewer.id.as_str(), "alice");
            assert_eq!(result.shadows, vec![ReviewerId::from("zoe")]);
            state = next;
        }
        assert_eq!(order_ids(&state), vec!["alice"]);
        assert!(!state.counts.contains_key(&ReviewerId::from("zoe")));
    }

    #[test]
    fn test_persisted_shadow_drops_out_of_order() {
        let mut shadows = ShadowMap::new();
        shadows.insert("alice", ["zoe"]);
        let state = AssignmentState {
            order: roster(&["zoe", "alice"]),
            ..Default::default()
        };
        let request = AssignmentRequest::new("dave", roster(&["alice", "zoe"]));
        let (state, result) = expect_assigned(assign(&state, &request, &shadows));
        assert_eq!(result.reviewer.id.as_str(), "alice");
        assert_eq!(order_ids(&state), vec!["alice"]);
    }

    #[test]
    fn test_only_shadows_left_has_no_eligible_reviewer() {
        let mut shadows = ShadowMap::new();
        shadows.insert("alice", ["zoe"]);
        let request = AssignmentRequest::new("alice", roster(&["alice", "zoe"]));
        assert_eq!(
            assign(&AssignmentState::default(), &request, &shadows),
            AssignmentOutcome::NoEligibleReviewer { roster_size: 1 }
        );
    }

    #[test]
    fn test_shadow_equal_to_creator_omitted() {
        let mut shadows = ShadowMap::new();
        shadows.insert("alice", ["dave"]);
        let request = AssignmentRequest::new("dave", roster(&["alice", "bob"]));
        let (_, result) = expect_assigned(assign(&AssignmentState::default(), &request, &shadows));
        assert_eq!(result.reviewer.id.as_str(), "alice");
        assert!(result.shadows.is_empty());
    }

    #[test]
    fn test_assignee_and_unavailable_skipped() {
        let request = AssignmentRequest::new("dave", roster(&["alice", "bob", "carol"]))
            .with_assignee("alice")
            .with_unavailable(["bob"]);
        let (state, result) =
            expect_assigned(assign(&AssignmentState::default(), &request, &ShadowMap::new()));
        assert_eq!(result.reviewer.id.as_str(), "carol");
        // Skipped members keep their place at the head
        assert_eq!(order_ids(&state), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_new_member_joins_at_back_of_queue() {
        let state = AssignmentState {
            order: roster(&["bob", "alice"]),
            ..Default::default()
        };
        let request = AssignmentRequest::new("zed", roster(&["alice", "bob", "erin"]));
        let (state, result) = expect_assigned(assign(&state, &request, &ShadowMap::new()));
        assert_eq!(result.reviewer.id.as_str(), "bob");
        assert_eq!(order_ids(&state), vec!["alice", "erin", "bob"]);
    }

    #[test]
    fn test_reset_clears_everything() {
        assert_eq!(reset(), AssignmentState::default());
        assert!(reset().order.is_empty());
    }

    fn arb_roster() -> impl Strategy<Value = Vec<RosterEntry>> {
        proptest::collection::hash_set("[a-l]{1,3}", 1..10)
            .prop_map(|ids| ids.into_iter().map(|id| RosterEntry::new(id.as_str())).collect())
    }

    proptest! {
        /// Property: with no exclusions, N assignments touch each of N members once,
        /// in the order they held at the start of the cycle.
        #[test]
        fn full_cycle_is_fair(live in arb_roster(), warmup in 0usize..5) {
            let shadows = ShadowMap::new();
            let mut state = AssignmentState::default();
            for _ in 0..warmup {
                let request = AssignmentRequest::new("outsider", live.clone());
                state = expect_assigned(assign(&state, &request, &shadows)).0;
            }
            // Make sure the order is reconciled before snapshotting the cycle start
            let start: Vec<ReviewerId> = if state.order.is_empty() {
                live.iter().map(|e| e.id.clone()).collect()
            } else {
                state.order.iter().map(|e| e.id.clone()).collect()
            };

            let mut picked = Vec::new();
            for _ in 0..live.len() {
                let request = AssignmentRequest::new("outsider", live.clone());
                let (next, result) = expect_assigned(assign(&state, &request, &shadows));
                picked.push(result.reviewer.id);
                state = next;
            }
            prop_assert_eq!(picked, start);
        }

        /// Property: creator and current assignee are never the primary reviewer,
        /// and each success adds exactly one to exactly one counter.
        #[test]
        fn exclusions_hold_and_counts_grow_by_one(
            live in arb_roster(),
            creator_idx in 0usize..10,
            assignee_idx in proptest::option::of(0usize..10),
            rounds in 1usize..15,
        ) {
            let shadows = ShadowMap::new();
            let creator = live[creator_idx % live.len()].id.clone();
            let assignee = assignee_idx.map(|i| live[i % live.len()].id.clone());
            let mut state = AssignmentState::default();

            for _ in 0..rounds {
                let mut request = AssignmentRequest::new(creator.clone(), live.clone());
                request.current_assignee_id = assignee.clone();
                match assign(&state, &request, &shadows) {
                    AssignmentOutcome::Assigned { state: next, result } => {
                        prop_assert_ne!(&result.reviewer.id, &creator);
                        prop_assert_ne!(Some(&result.reviewer.id), assignee.as_ref());
                        prop_assert_eq!(next.total_assignments(), state.total_assignments() + 1);
                        prop_assert_eq!(
                            next.counts[&result.reviewer.id],
                            state.counts.get(&result.reviewer.id).copied().unwrap_or(0) + 1
                        );
                        prop_assert_eq!(&next.order.last().unwrap().id, &result.reviewer.id);
                        state = next;
                    }
                    AssignmentOutcome::NoEligibleReviewer { .. } => {
                        let excluded = 1 + usize::from(assignee.as_ref().is_some_and(|a| *a != creator));
                        prop_assert_eq!(live.len(), excluded);
                    }
                }
            }
        }

        /// Property: whoever is configured as a shadow is never the primary
        /// reviewer and never enters the rotation order or the counts.
        #[test]
        fn shadows_never_rotate(
            live in arb_roster(),
            shadow_mask in proptest::collection::vec(any::<bool>(), 10),
            mentor_idx in 0usize..10,
            rounds in 1usize..12,
        ) {
            let mentor = live[mentor_idx % live.len()].id.clone();
            let shadowed: Vec<ReviewerId> = live
                .iter()
                .zip(&shadow_mask)
                .filter(|(e, masked)| **masked && e.id != mentor)
                .map(|(e, _)| e.id.clone())
                .collect();
            let mut shadows = ShadowMap::new();
            shadows.insert(mentor.clone(), shadowed.clone());
            let mut state = AssignmentState::default();

            for _ in 0..rounds {
                let request = AssignmentRequest::new("outsider", live.clone());
                let (next, result) = expect_assigned(assign(&state, &request, &shadows));
                prop_assert!(!shadowed.contains(&result.reviewer.id));
                prop_assert!(next.order.iter().all(|e| !shadowed.contains(&e.id)));
                prop_assert!(next.counts.keys().all(|id| !shadowed.contains(id)));
                state = next;
            }
        }
    }
}
