//! Narrow ports the assignment service talks to the outside world through.
//!
//! Production implementations live in `github` and `calendar`; tests plug in
//! fakes.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use reviewer_queue_core::{AssignmentResult, ReviewerId, RosterEntry};

/// Who opened a pull request and who currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestContext {
    pub creator_id: ReviewerId,
    pub current_assignee_id: Option<ReviewerId>,
    pub display_url: String,
}

/// Team membership: the people eligible to ever be considered reviewers.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_live_roster(&self) -> Result<Vec<RosterEntry>>;
}

#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn fetch_pull_request_context(&self, repo: &str, number: u64)
        -> Result<PullRequestContext>;
}

/// People who are away today.
///
/// Infallible on purpose: availability data is best effort, so
/// implementations log their failures and return an empty set.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn fetch_unavailable_ids(&self) -> HashSet<ReviewerId>;
}

/// Assign the pull request and request reviews on the code host.
#[async_trait]
pub trait ReviewRequester: Send + Sync {
    async fn request_review(&self, repo: &str, number: u64, result: &AssignmentResult)
        -> Result<()>;
}

/// Availability source used when no calendar is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryoneAvailable;

#[async_trait]
impl AvailabilitySource for EveryoneAvailable {
    async fn fetch_unavailable_ids(&self) -> HashSet<ReviewerId> {
        HashSet::new()
    }
}
