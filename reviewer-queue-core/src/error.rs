use thiserror::Error;

/// Every candidate was excluded for this request.
///
/// This is a reported outcome rather than a fault: nothing was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no eligible reviewer")]
pub struct NoEligibleReviewer;

/// Failures surfaced to whoever asked for an assignment.
#[derive(Debug, Error)]
pub enum AssignError {
    /// Required configuration is absent; the queue should never have been built.
    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("no eligible reviewer")]
    NoEligibleReviewer,

    /// Fetching the roster or the pull request failed. Safe to retry.
    #[error("failed to fetch {source_name}: {message}")]
    UpstreamFetch {
        source_name: &'static str,
        message: String,
    },

    /// The reviewer could not be assigned on the code host. State was not committed.
    #[error("failed to request review: {0}")]
    ReviewRequest(String),

    /// Loading or saving queue state failed. Re-read state before retrying.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AssignError {
    pub fn upstream(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamFetch {
            source_name,
            message: message.into(),
        }
    }

    /// Whether repeating the whole request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamFetch { .. } | Self::ReviewRequest(_) | Self::Persistence(_)
        )
    }
}

impl From<NoEligibleReviewer> for AssignError {
    fn from(_: NoEligibleReviewer) -> Self {
        Self::NoEligibleReviewer
    }
}
