use anyhow::{Context, Result};
use reviewer_queue_core::ShadowMap;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::calendar::GoogleCalendarConfig;

/// File name of the SQLite state database inside `state_dir`.
pub const STATE_DB_FILE: &str = "reviewer-queue-state.db";

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub github_org: String,
    /// Slug of the team whose members form the rotation.
    pub github_reviewer_team: String,
    /// Override for GitHub Enterprise hosts.
    pub github_api_url: Option<String>,
    /// Creator email on the travel calendar -> GitHub login.
    pub reviewer_email_map: HashMap<String, String>,
    pub with_avatar: bool,
    /// Log GitHub writes instead of sending them.
    pub debug: bool,
    pub shadows: ShadowMap,
    /// Present only when every Google setting is.
    pub google_calendar: Option<GoogleCalendarConfig>,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Shared secret for `X-Signature-256` on /command. Open when unset.
    pub command_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token = env::var("GITHUB_TOKEN")
            .context("GITHUB_TOKEN environment variable is required")?;

        let github_org =
            env::var("GITHUB_ORG").context("GITHUB_ORG environment variable is required")?;

        let github_reviewer_team = env::var("GITHUB_REVIEWER_TEAM")
            .context("GITHUB_REVIEWER_TEAM environment variable is required")?;

        let github_api_url = parse_optional_secret(env::var("GITHUB_API_URL").ok());

        let reviewer_email_map = parse_email_map(env::var("REVIEWER_EMAIL_MAP").ok())
            .context("REVIEWER_EMAIL_MAP must be a JSON object of email to login")?;

        let with_avatar = parse_flag(env::var("GITHUB_WITH_AVATAR").ok());
        let debug = parse_flag(env::var("REVIEWER_QUEUE_DEBUG").ok());

        let shadows = load_shadows(
            env::var("SHADOWS_PATH").ok().map(PathBuf::from),
            env::var("SHADOWS_JSON").ok(),
        )?;

        let google_calendar = parse_google_calendar(
            env::var("GOOGLE_CLIENT_ID").ok(),
            env::var("GOOGLE_CLIENT_SECRET").ok(),
            env::var("GOOGLE_REFRESH_TOKEN").ok(),
            env::var("GOOGLE_TRAVEL_CALENDAR_ID").ok(),
        );

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let command_secret = parse_optional_secret(env::var("COMMAND_SECRET").ok());

        Ok(Config {
            github_token,
            github_org,
            github_reviewer_team,
            github_api_url,
            reviewer_email_map,
            with_avatar,
            debug,
            shadows,
            google_calendar,
            port,
            state_dir,
            command_secret,
        })
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_dir.join(STATE_DB_FILE)
    }
}

/// `1` or `true` (any case) enables a flag; anything else leaves it off.
pub fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1") | Some("true")
    )
}

/// Returns None if the value is missing, empty, or contains only whitespace.
/// An empty secret would otherwise accept every signature.
pub fn parse_optional_secret(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub fn parse_email_map(value: Option<String>) -> Result<HashMap<String, String>> {
    match parse_optional_secret(value) {
        None => Ok(HashMap::new()),
        Some(json) => serde_json::from_str(&json).context("Failed to parse email map JSON"),
    }
}

/// Shadows come from a file, inline JSON, or nowhere. The file wins if both are set.
pub fn load_shadows(path: Option<PathBuf>, inline: Option<String>) -> Result<ShadowMap> {
    if let Some(path) = path {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read shadows file {}", path.display()))?;
        return ShadowMap::from_json(&json)
            .with_context(|| format!("Failed to parse shadows file {}", path.display()));
    }
    match parse_optional_secret(inline) {
        Some(json) => ShadowMap::from_json(&json).context("Failed to parse SHADOWS_JSON"),
        None => Ok(ShadowMap::new()),
    }
}

pub fn parse_google_calendar(
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    calendar_id: Option<String>,
) -> Option<GoogleCalendarConfig> {
    Some(GoogleCalendarConfig {
        client_id: parse_optional_secret(client_id)?,
        client_secret: parse_optional_secret(client_secret)?,
        refresh_token: parse_optional_secret(refresh_token)?,
        calendar_id: parse_optional_secret(calendar_id)?,
    })
}
