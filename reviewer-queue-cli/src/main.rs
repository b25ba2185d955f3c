use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use reviewer_queue_core::{render_report, report, reset, AssignError};
use reviewer_queue_server::command::{render_assignment, ReplyOptions};
use reviewer_queue_server::config::{Config, STATE_DB_FILE};
use reviewer_queue_server::repository::{InMemoryRepository, SqliteRepository, StateRepository};
use reviewer_queue_server::build_queue;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

/// Operator tool for the pull request reviewer queue
#[derive(Parser, Debug)]
#[command(name = "reviewer-queue")]
#[command(about = "Round-robin pull request reviewer queue", long_about = None)]
struct Cli {
    /// Directory holding the state database (defaults to STATE_DIR, then the current directory)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Keep state in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    in_memory: bool,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assign the next reviewer to a pull request
    Assign(AssignArgs),
    /// Print each reviewer's share of assignments
    Stats(StatsArgs),
    /// Forget all counts and the rotation order
    Reset,
    /// Check the shadow configuration against the live reviewer team
    CheckShadows,
}

#[derive(Parser, Debug)]
struct AssignArgs {
    /// Repository name within GITHUB_ORG
    repo: String,

    /// Pull request number
    number: u64,

    /// If set, do not change anything on GitHub, just log what would be done
    #[arg(long)]
    dry_run: bool,

    /// Print the reviewer's avatar URL
    #[arg(long)]
    with_avatar: bool,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// Print JSON instead of the chat table
    #[arg(long)]
    json: bool,
}

fn state_dir(cli: &Cli) -> PathBuf {
    cli.state_dir
        .clone()
        .or_else(|| std::env::var("STATE_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn open_repository(cli: &Cli) -> Result<Arc<dyn StateRepository>> {
    if cli.in_memory {
        return Ok(Arc::new(InMemoryRepository::new()));
    }
    let path = state_dir(cli).join(STATE_DB_FILE);
    let repository = SqliteRepository::new(&path)
        .with_context(|| format!("Failed to open state database {}", path.display()))?;
    Ok(Arc::new(repository))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()
        .map_err(|e| AssignError::ConfigurationMissing(format!("{:#}", e)))?;
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    Ok(config)
}

async fn run_assign(cli: &Cli, args: &AssignArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    config.debug |= args.dry_run;

    let queue = build_queue(&config, open_repository(cli)?);
    match queue.assign_reviewer(&args.repo, args.number).await {
        Ok(assignment) => {
            let options = ReplyOptions {
                with_avatar: args.with_avatar || config.with_avatar,
            };
            let now = chrono::Utc::now().timestamp_millis();
            for line in render_assignment(&assignment, options, now) {
                println!("{}", line);
            }
            Ok(())
        }
        Err(AssignError::NoEligibleReviewer) => Err(anyhow!(
            "No eligible reviewer for {}#{}",
            args.repo,
            args.number
        )),
        Err(e) => Err(e.into()),
    }
}

async fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<()> {
    let repository = open_repository(cli)?;
    let stored = repository.load().await.context("Failed to load state")?;
    let lines = report(&stored.state.counts);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&lines).context("Failed to serialize stats")?
        );
    } else {
        println!("{}", render_report(&lines));
    }
    Ok(())
}

async fn run_reset(cli: &Cli) -> Result<()> {
    let repository = open_repository(cli)?;
    let stored = repository.load().await.context("Failed to load state")?;
    repository
        .save(&reset(), stored.version)
        .await
        .context("Failed to reset state; was an assignment running? Try again")?;
    println!("Reset reviewer stats!");
    Ok(())
}

async fn run_check_shadows(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let queue = build_queue(&config, Arc::new(InMemoryRepository::new()));
    let warnings = queue.check_shadow_config().await?;
    if warnings.is_empty() {
        println!("Shadow configuration OK ({} entries)", queue.shadows().len());
    } else {
        for warning in warnings {
            println!("warning: {}", warning);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Assign(args) => run_assign(&cli, args).await,
        Commands::Stats(args) => run_stats(&cli, args).await,
        Commands::Reset => run_reset(&cli).await,
        Commands::CheckShadows => run_check_shadows(&cli).await,
    }
}
