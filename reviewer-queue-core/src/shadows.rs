//! Shadow reviewers.
//!
//! A shadow is someone learning the codebase who tags along on another
//! member's reviews. Anyone listed as a shadow is kept out of the rotation,
//! even if they are also on the reviewer team, and never accrues counts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::state::{ReviewerId, RosterEntry};

/// Reviewer -> ordered list of their shadows. Read-only configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShadowMap(HashMap<ReviewerId, Vec<ReviewerId>>);

/// A configuration smell found by [`ShadowMap::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowConfigWarning {
    /// The shadow is also on the reviewer team; they are left out of the rotation.
    ShadowInRoster { reviewer: ReviewerId, shadow: ReviewerId },
    /// A reviewer lists themselves; the entry is ignored at resolve time.
    SelfShadow { reviewer: ReviewerId },
}

impl std::fmt::Display for ShadowConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShadowInRoster { reviewer, shadow } => write!(
                f,
                "{} shadows {} and is skipped by the reviewer rotation",
                shadow, reviewer
            ),
            Self::SelfShadow { reviewer } => write!(f, "{} is listed as their own shadow", reviewer),
        }
    }
}

impl ShadowMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON form `{"reviewer": ["shadow", ...]}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert<I, T>(&mut self, reviewer: impl Into<ReviewerId>, shadows: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<ReviewerId>,
    {
        self.0
            .insert(reviewer.into(), shadows.into_iter().map(Into::into).collect());
    }

    pub fn shadows_of(&self, reviewer: &ReviewerId) -> &[ReviewerId] {
        self.0.get(reviewer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Everyone listed as somebody else's shadow.
    pub fn shadow_ids(&self) -> HashSet<&ReviewerId> {
        self.0
            .iter()
            .flat_map(|(reviewer, shadows)| shadows.iter().filter(move |s| *s != reviewer))
            .collect()
    }

    /// Check the map against the live roster. Results are sorted for stable logging.
    pub fn validate(&self, roster: &[RosterEntry]) -> Vec<ShadowConfigWarning> {
        let members: HashSet<&ReviewerId> = roster.iter().map(|e| &e.id).collect();
        let mut warnings = Vec::new();

        let mut reviewers: Vec<&ReviewerId> = self.0.keys().collect();
        reviewers.sort();

        for reviewer in reviewers {
            for shadow in self.shadows_of(reviewer) {
                if shadow == reviewer {
                    warnings.push(ShadowConfigWarning::SelfShadow {
                        reviewer: reviewer.clone(),
                    });
                } else if members.contains(shadow) {
                    warnings.push(ShadowConfigWarning::ShadowInRoster {
                        reviewer: reviewer.clone(),
                        shadow: shadow.clone(),
                    });
                }
            }
        }

        warnings
    }
}

/// Shadows to request alongside `reviewer_id`, in configured order.
///
/// The creator is dropped: nobody is asked to review their own pull request,
/// not even as a shadow. Duplicates and the reviewer themselves are dropped too.
pub fn resolve_shadows(
    reviewer_id: &ReviewerId,
    shadow_map: &ShadowMap,
    creator_id: &ReviewerId,
) -> Vec<ReviewerId> {
    let mut seen = HashSet::new();
    shadow_map
        .shadows_of(reviewer_id)
        .iter()
        .filter(|shadow| *shadow != creator_id && *shadow != reviewer_id)
        .filter(|shadow| seen.insert(*shadow))
        .cloned()
        .collect()
}
