//! State types for the reviewer queue.
//!
//! `AssignmentState` is the only value that gets persisted. Everything else
//! here is either supplied per request or derived from the state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Newtype for a reviewer's account login to prevent mixing with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewerId(pub String);

impl ReviewerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReviewerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReviewerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Presentation data carried alongside a roster member.
///
/// The queue never looks at these; they are stored with the order so that a
/// reply can show the reviewer's avatar without another API round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// One member of the rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ReviewerId,
    #[serde(default)]
    pub display: DisplayAttributes,
}

impl RosterEntry {
    pub fn new(id: impl Into<ReviewerId>) -> Self {
        Self {
            id: id.into(),
            display: DisplayAttributes::default(),
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.display.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Persisted rotation order and per-reviewer assignment counters.
///
/// The tail of `order` is the most recently selected reviewer. An empty
/// `order` means "rebuild from the live roster on next use".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentState {
    #[serde(default)]
    pub order: Vec<RosterEntry>,
    #[serde(default)]
    pub counts: BTreeMap<ReviewerId, u64>,
}

impl AssignmentState {
    /// Ids of `order`, head first.
    pub fn order_ids(&self) -> Vec<&ReviewerId> {
        self.order.iter().map(|e| &e.id).collect()
    }

    pub fn total_assignments(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Everything the queue needs to know about one assignment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    pub creator_id: ReviewerId,
    pub current_assignee_id: Option<ReviewerId>,
    pub unavailable_ids: HashSet<ReviewerId>,
    pub live_roster: Vec<RosterEntry>,
}

impl AssignmentRequest {
    pub fn new(creator_id: impl Into<ReviewerId>, live_roster: Vec<RosterEntry>) -> Self {
        Self {
            creator_id: creator_id.into(),
            current_assignee_id: None,
            unavailable_ids: HashSet::new(),
            live_roster,
        }
    }

    pub fn with_assignee(mut self, assignee: impl Into<ReviewerId>) -> Self {
        self.current_assignee_id = Some(assignee.into());
        self
    }

    pub fn with_unavailable<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ReviewerId>,
    {
        self.unavailable_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// The selected reviewer and the shadows to request alongside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentResult {
    pub reviewer: RosterEntry,
    pub shadows: Vec<ReviewerId>,
}

impl AssignmentResult {
    /// Everyone who should be asked for a review, primary first.
    pub fn review_request_ids(&self) -> Vec<ReviewerId> {
        std::iter::once(self.reviewer.id.clone())
            .chain(self.shadows.iter().cloned())
            .collect()
    }
}
