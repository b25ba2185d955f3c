use anyhow::{Context, Result};
use reviewer_queue_core::AssignError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};

use reviewer_queue_server::config::Config;
use reviewer_queue_server::repository::SqliteRepository;
use reviewer_queue_server::{app, build_queue, command::ReplyOptions, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting reviewer queue {}",
        reviewer_queue_server::get_bot_version()
    );

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            let e = AssignError::ConfigurationMissing(format!("{:#}", e));
            error!("Reviewer queue is not loaded: {}", e);
            return Err(e.into());
        }
    };

    let db_path = config.state_db_path();
    info!("Using state database: {}", db_path.display());
    let repository =
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    let queue = Arc::new(build_queue(&config, Arc::new(repository)));
    info!(
        "Reviewing for team {}/{} with {} shadow entries",
        config.github_org,
        config.github_reviewer_team,
        queue.shadows().len()
    );

    if !queue.shadows().is_empty() {
        if let Err(e) = queue.check_shadow_config().await {
            warn!("Could not check shadow configuration: {}", e);
        }
    }

    if config.command_secret.is_none() {
        warn!("COMMAND_SECRET not set; /command accepts unsigned requests");
    }

    let state = Arc::new(AppState {
        queue,
        reply_options: ReplyOptions {
            with_avatar: config.with_avatar,
        },
        command_secret: config.command_secret.clone(),
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
