use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use reviewer_queue_core::{AssignmentResult, DisplayAttributes, ReviewerId, RosterEntry};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::collaborators::{PullRequestContext, PullRequestSource, ReviewRequester, RosterSource};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub REST client scoped to one organization and one reviewer team.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: String,
    org: String,
    reviewer_team: String,
    /// Log write calls instead of sending them.
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl From<GitHubUser> for RosterEntry {
    fn from(user: GitHubUser) -> Self {
        RosterEntry {
            id: ReviewerId::from(user.login),
            display: DisplayAttributes {
                avatar_url: user.avatar_url,
                html_url: user.html_url,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub number: u64,
    pub html_url: String,
    pub user: GitHubUser,
    pub assignee: Option<GitHubUser>,
}

impl From<PullRequestResponse> for PullRequestContext {
    fn from(pr: PullRequestResponse) -> Self {
        PullRequestContext {
            creator_id: ReviewerId::from(pr.user.login),
            current_assignee_id: pr.assignee.map(|a| ReviewerId::from(a.login)),
            display_url: pr.html_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdateAssigneesRequest<'a> {
    assignees: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct RequestReviewersRequest<'a> {
    reviewers: Vec<&'a str>,
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .context("Failed to read error response body")?;
    error!("GitHub API error {}: {} - {}", what, status, error_text);
    Err(anyhow!(
        "GitHub API error {}: {} - {}",
        what,
        status,
        error_text
    ))
}

impl GitHubClient {
    pub fn new(
        token: String,
        org: impl Into<String>,
        reviewer_team: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, token, org, reviewer_team, dry_run)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: String,
        org: impl Into<String>,
        reviewer_team: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            client: create_github_client(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            org: org.into(),
            reviewer_team: reviewer_team.into(),
            dry_run,
        }
    }

    fn team_members_url(&self) -> String {
        format!(
            "{}/orgs/{}/teams/{}/members?per_page=100",
            self.api_base, self.org, self.reviewer_team
        )
    }

    fn pull_request_url(&self, repo: &str, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, self.org, repo, number
        )
    }

    fn issue_url(&self, repo: &str, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}",
            self.api_base, self.org, repo, number
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    /// Members of the reviewer team, in the order GitHub lists them.
    pub async fn get_team_members(&self) -> Result<Vec<GitHubUser>> {
        info!(
            "Fetching members of team {}/{}",
            self.org, self.reviewer_team
        );

        let response = self
            .get(&self.team_members_url())
            .send()
            .await
            .context("Failed to send team members request")?;
        let response = ensure_success(response, "fetching team members").await?;

        let members: Vec<GitHubUser> = response
            .json()
            .await
            .context("Failed to parse team members response")?;

        info!("Fetched {} team members", members.len());
        Ok(members)
    }

    pub async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequestResponse> {
        info!("Fetching PR #{} from {}/{}", number, self.org, repo);

        let response = self
            .get(&self.pull_request_url(repo, number))
            .send()
            .await
            .context("Failed to send get pull request request")?;
        let response = ensure_success(response, "fetching PR").await?;

        response
            .json()
            .await
            .context("Failed to parse pull request response")
    }

    /// Replace the PR's assignees with `login`.
    pub async fn set_assignee(&self, repo: &str, number: u64, login: &str) -> Result<()> {
        if self.dry_run {
            info!(
                "Dry run: would assign {} to {}/{}#{}",
                login, self.org, repo, number
            );
            return Ok(());
        }

        let body = UpdateAssigneesRequest {
            assignees: vec![login],
        };
        let response = self
            .client
            .patch(self.issue_url(repo, number))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .context("Failed to send assignee update")?;
        ensure_success(response, "updating assignee").await?;

        info!("Assigned {} to {}/{}#{}", login, self.org, repo, number);
        Ok(())
    }

    pub async fn request_reviewers(&self, repo: &str, number: u64, logins: &[&str]) -> Result<()> {
        if self.dry_run {
            info!(
                "Dry run: would request reviews from {:?} on {}/{}#{}",
                logins, self.org, repo, number
            );
            return Ok(());
        }

        let body = RequestReviewersRequest {
            reviewers: logins.to_vec(),
        };
        let response = self
            .client
            .post(format!("{}/requested_reviewers", self.pull_request_url(repo, number)))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .context("Failed to send review request")?;
        ensure_success(response, "requesting reviewers").await?;

        info!(
            "Requested reviews from {:?} on {}/{}#{}",
            logins, self.org, repo, number
        );
        Ok(())
    }
}

#[async_trait]
impl RosterSource for GitHubClient {
    async fn fetch_live_roster(&self) -> Result<Vec<RosterEntry>> {
        let members = self.get_team_members().await?;
        Ok(members.into_iter().map(RosterEntry::from).collect())
    }
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    async fn fetch_pull_request_context(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestContext> {
        let pr = self.get_pull_request(repo, number).await?;
        Ok(pr.into())
    }
}

#[async_trait]
impl ReviewRequester for GitHubClient {
    async fn request_review(
        &self,
        repo: &str,
        number: u64,
        result: &AssignmentResult,
    ) -> Result<()> {
        self.set_assignee(repo, number, result.reviewer.id.as_str())
            .await?;

        let ids = result.review_request_ids();
        let logins: Vec<&str> = ids.iter().map(ReviewerId::as_str).collect();
        self.request_reviewers(repo, number, &logins).await
    }
}

pub fn create_github_client() -> Client {
    Client::builder()
        .user_agent(concat!("reviewer-queue/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            error!("Failed to configure HTTP client, using defaults: {}", e);
            Client::new()
        })
}
