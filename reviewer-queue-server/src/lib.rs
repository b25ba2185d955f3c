pub mod calendar;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod github;
pub mod repository;
pub mod service;
pub mod webhook;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::calendar::TravelCalendar;
use crate::collaborators::{AvailabilitySource, EveryoneAvailable};
use crate::command::ReplyOptions;
use crate::config::Config;
use crate::github::GitHubClient;
use crate::repository::StateRepository;
use crate::service::{Collaborators, ReviewerQueue};
use crate::webhook::command_router;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_bot_version() -> String {
    // Deployments without a .git directory pass the hash in at build time
    if let Some(git_hash) = option_env!("REVIEWER_QUEUE_GIT_HASH") {
        git_hash.chars().take(8).collect()
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        git_hash.chars().take(8).collect()
    } else {
        "unknown".to_string()
    }
}

pub struct AppState {
    pub queue: Arc<ReviewerQueue>,
    pub reply_options: ReplyOptions,
    pub command_secret: Option<String>,
}

/// Wire the GitHub client and travel calendar from configuration.
pub fn build_queue(config: &Config, repository: Arc<dyn StateRepository>) -> ReviewerQueue {
    let github = Arc::new(match &config.github_api_url {
        Some(api_url) => GitHubClient::with_api_base(
            api_url.clone(),
            config.github_token.clone(),
            config.github_org.clone(),
            config.github_reviewer_team.clone(),
            config.debug,
        ),
        None => GitHubClient::new(
            config.github_token.clone(),
            config.github_org.clone(),
            config.github_reviewer_team.clone(),
            config.debug,
        ),
    });
    if config.debug {
        info!("Debug mode: GitHub writes will be logged, not sent");
    }

    let availability: Arc<dyn AvailabilitySource> = match &config.google_calendar {
        Some(google) => Arc::new(TravelCalendar::new(
            google.clone(),
            config.reviewer_email_map.clone(),
        )),
        None => {
            info!("Google Calendar not configured; everyone counts as available");
            Arc::new(EveryoneAvailable)
        }
    };

    ReviewerQueue::new(
        repository,
        Collaborators {
            roster: github.clone(),
            pull_requests: github.clone(),
            availability,
            requester: github,
        },
        config.shadows.clone(),
    )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "reviewer-queue",
        "version": get_bot_version(),
    }))
}

async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.queue.stats_report().await {
        Ok(lines) => {
            let total: u64 = lines.iter().map(|l| l.count).sum();
            Ok(Json(json!({ "total": total, "reviewers": lines })))
        }
        Err(e) => {
            error!("Failed to load stats: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats_handler))
        .merge(command_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
