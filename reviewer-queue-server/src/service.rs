//! The serialized assignment service.
//!
//! Every read-modify-write of the queue state happens under one lock. Upstream
//! reads happen before taking it; the review request happens inside it and
//! before the save, so a failed request never commits a rotation.
//!
//! The lock only covers this process. Saves carry the version that was loaded,
//! so a concurrent write from another process (the CLI, say) makes this one
//! fail as `Persistence` instead of silently overwriting it.

use std::sync::Arc;

use reviewer_queue_core::{
    assign, reconcile::has_drifted, report, reset, AssignError, AssignmentOutcome,
    AssignmentRequest, AssignmentResult, ShadowConfigWarning, ShadowMap, StatsLine,
};
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collaborators::{
    AvailabilitySource, PullRequestContext, PullRequestSource, ReviewRequester, RosterSource,
};
use crate::repository::{RepositoryError, StateRepository};

/// A successful assignment, with the link to show back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub result: AssignmentResult,
    pub display_url: String,
}

pub struct Collaborators {
    pub roster: Arc<dyn RosterSource>,
    pub pull_requests: Arc<dyn PullRequestSource>,
    pub availability: Arc<dyn AvailabilitySource>,
    pub requester: Arc<dyn ReviewRequester>,
}

pub struct ReviewerQueue {
    repository: Arc<dyn StateRepository>,
    collaborators: Collaborators,
    shadows: ShadowMap,
    lock: Mutex<()>,
}

fn persistence(e: RepositoryError) -> AssignError {
    if let RepositoryError::Conflict { .. } = e {
        warn!("Queue state changed underneath this request; it must re-read state and retry");
    }
    AssignError::Persistence(e.to_string())
}

impl ReviewerQueue {
    pub fn new(
        repository: Arc<dyn StateRepository>,
        collaborators: Collaborators,
        shadows: ShadowMap,
    ) -> Self {
        Self {
            repository,
            collaborators,
            shadows,
            lock: Mutex::new(()),
        }
    }

    pub fn shadows(&self) -> &ShadowMap {
        &self.shadows
    }

    /// Check the shadow configuration against the live team and log what looks wrong.
    pub async fn check_shadow_config(&self) -> Result<Vec<ShadowConfigWarning>, AssignError> {
        let roster = self
            .collaborators
            .roster
            .fetch_live_roster()
            .await
            .map_err(|e| AssignError::upstream("team roster", format!("{:#}", e)))?;
        let warnings = self.shadows.validate(&roster);
        for warning in &warnings {
            warn!("Shadow configuration: {}", warning);
        }
        Ok(warnings)
    }

    /// Pick a reviewer for `repo#number`, request the review, then commit the rotation.
    pub async fn assign_reviewer(&self, repo: &str, number: u64) -> Result<Assignment, AssignError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("assign_reviewer", %request_id, repo, number);
        self.assign_reviewer_inner(repo, number).instrument(span).await
    }

    async fn assign_reviewer_inner(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Assignment, AssignError> {
        let roster = async {
            self.collaborators
                .roster
                .fetch_live_roster()
                .await
                .map_err(|e| AssignError::upstream("team roster", format!("{:#}", e)))
        };
        let pull_request = async {
            self.collaborators
                .pull_requests
                .fetch_pull_request_context(repo, number)
                .await
                .map_err(|e| AssignError::upstream("pull request", format!("{:#}", e)))
        };
        let availability = async {
            Ok::<_, AssignError>(self.collaborators.availability.fetch_unavailable_ids().await)
        };
        let (live_roster, pr, unavailable_ids): (_, PullRequestContext, _) =
            tokio::try_join!(roster, pull_request, availability)?;

        let request = AssignmentRequest {
            creator_id: pr.creator_id,
            current_assignee_id: pr.current_assignee_id,
            unavailable_ids,
            live_roster,
        };

        let _guard = self.lock.lock().await;
        let stored = self.repository.load().await.map_err(persistence)?;

        let (next_state, result) = match assign(&stored.state, &request, &self.shadows) {
            AssignmentOutcome::Assigned { state, result } => (state, result),
            AssignmentOutcome::NoEligibleReviewer { roster_size } => {
                info!(
                    "No eligible reviewer among {} team members for {}#{}",
                    roster_size, repo, number
                );
                return Err(AssignError::NoEligibleReviewer);
            }
        };

        if !stored.state.order.is_empty() && has_drifted(&stored.state.order, &next_state.order) {
            info!("Team membership changed since the last assignment; reconciled rotation");
        }

        self.collaborators
            .requester
            .request_review(repo, number, &result)
            .await
            .map_err(|e| AssignError::ReviewRequest(format!("{:#}", e)))?;

        self.repository
            .save(&next_state, stored.version)
            .await
            .map_err(persistence)?;

        info!(
            "Assigned {} to {}#{} (shadows: {:?})",
            result.reviewer.id, repo, number, result.shadows
        );
        Ok(Assignment {
            result,
            display_url: pr.display_url,
        })
    }

    /// Forget all counts and the rotation order.
    pub async fn reset_stats(&self) -> Result<(), AssignError> {
        let _guard = self.lock.lock().await;
        let stored = self.repository.load().await.map_err(persistence)?;
        self.repository
            .save(&reset(), stored.version)
            .await
            .map_err(persistence)?;
        info!("Reviewer stats reset");
        Ok(())
    }

    pub async fn stats_report(&self) -> Result<Vec<StatsLine>, AssignError> {
        let stored = self.repository.load().await.map_err(persistence)?;
        Ok(report(&stored.state.counts))
    }
}
