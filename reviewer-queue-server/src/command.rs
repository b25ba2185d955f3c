/// Chat command parsing and reply rendering for `reviewer ...` messages
use std::fmt;

use chrono::Utc;
use reviewer_queue_core::{render_report, AssignError};
use tracing::{error, info};

use crate::service::{Assignment, ReviewerQueue};

const KEYWORD: &str = "reviewer";

/// A parsed reviewer command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Pick the next reviewer for a pull request
    AssignReviewer { repo: String, number: u64 },
    ResetStats,
    ShowStats,
}

/// Result of parsing a chat message for reviewer commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// The message is not addressed to us
    NoMention,
    /// Starts with `reviewer` but is not a known command
    UnrecognizedCommand {
        /// The text after the keyword
        attempted: String,
    },
    Command(ChatCommand),
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatCommand::AssignReviewer { repo, number } => {
                write!(f, "reviewer for {} {}", repo, number)
            }
            ChatCommand::ResetStats => write!(f, "reviewer reset stats"),
            ChatCommand::ShowStats => write!(f, "reviewer show stats"),
        }
    }
}

fn is_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Drop a leading `@bot`, `@bot:` or `@bot,` mention.
fn strip_mention(line: &str) -> &str {
    if !line.starts_with('@') {
        return line;
    }
    match line.split_once(char::is_whitespace) {
        Some((_, rest)) => rest.trim_start(),
        None => "",
    }
}

fn parse_arguments(words: &[&str]) -> Option<ChatCommand> {
    match words {
        [action, repo, number] if action.eq_ignore_ascii_case("for") => {
            if !is_repo_name(repo) || !number.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(ChatCommand::AssignReviewer {
                repo: repo.to_string(),
                number: number.parse().ok()?,
            })
        }
        [action, object] if object.eq_ignore_ascii_case("stats") => {
            if action.eq_ignore_ascii_case("reset") {
                Some(ChatCommand::ResetStats)
            } else if action.eq_ignore_ascii_case("show") {
                Some(ChatCommand::ShowStats)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parse a chat message.
///
/// The first line starting with `reviewer` (after an optional `@mention`)
/// decides the result; later lines are not scanned. Matching is
/// case-insensitive and the keyword needs a whitespace boundary.
pub fn parse_command(text: &str) -> ParseResult {
    for line in text.lines() {
        let trimmed = strip_mention(line.trim());

        let Some(prefix) = trimmed.get(..KEYWORD.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(KEYWORD) {
            continue;
        }

        let rest = &trimmed[KEYWORD.len()..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            // e.g. "reviewers are great"
            continue;
        }

        let attempted = rest.trim();
        let words: Vec<&str> = attempted.split_whitespace().collect();
        return match parse_arguments(&words) {
            Some(command) => ParseResult::Command(command),
            None => ParseResult::UnrecognizedCommand {
                attempted: attempted.to_string(),
            },
        };
    }

    ParseResult::NoMention
}

/// How replies are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyOptions {
    /// Append the reviewer's avatar so chat clients show it inline.
    pub with_avatar: bool,
}

/// Cache-busted avatar URL that chat clients render as an image.
///
/// The timestamp is appended verbatim and any fragment becomes `#.png`.
pub fn avatar_line(avatar_url: &str, now_millis: i64) -> String {
    let mut url = format!("{}t={}", avatar_url, now_millis);
    if let Some(fragment) = url.find('#') {
        url.truncate(fragment);
    }
    url.push_str("#.png");
    url
}

pub fn render_assignment(
    assignment: &Assignment,
    options: ReplyOptions,
    now_millis: i64,
) -> Vec<String> {
    let reviewer = &assignment.result.reviewer;
    let mut replies = vec![format!(
        "{} has been assigned for {} as a reviewer",
        reviewer.id, assignment.display_url
    )];

    if !assignment.result.shadows.is_empty() {
        let names: Vec<&str> = assignment
            .result
            .shadows
            .iter()
            .map(|s| s.as_str())
            .collect();
        replies.push(format!("Shadows: {}", names.join(", ")));
    }

    if options.with_avatar {
        if let Some(avatar_url) = &reviewer.display.avatar_url {
            replies.push(avatar_line(avatar_url, now_millis));
        }
    }

    replies
}

pub fn render_error(error: &AssignError) -> String {
    format!("an error occurred.\n{}", error)
}

pub fn render_unrecognized(attempted: &str) -> String {
    format!(
        "I don't know `reviewer {}`. Try `reviewer for <repo> <number>`, `reviewer show stats` or `reviewer reset stats`.",
        attempted
    )
}

/// Run a parsed command against the queue and return the chat replies.
pub async fn execute(
    queue: &ReviewerQueue,
    command: &ChatCommand,
    options: ReplyOptions,
) -> Vec<String> {
    info!("Executing command: {}", command);
    match command {
        ChatCommand::AssignReviewer { repo, number } => {
            match queue.assign_reviewer(repo, *number).await {
                Ok(assignment) => {
                    render_assignment(&assignment, options, Utc::now().timestamp_millis())
                }
                Err(AssignError::NoEligibleReviewer) => {
                    vec![format!("No eligible reviewer for {}#{}", repo, number)]
                }
                Err(e) => {
                    error!("Failed to assign reviewer for {}#{}: {}", repo, number, e);
                    vec![render_error(&e)]
                }
            }
        }
        ChatCommand::ResetStats => match queue.reset_stats().await {
            Ok(()) => vec!["Reset reviewer stats!".to_string()],
            Err(e) => {
                error!("Failed to reset stats: {}", e);
                vec![render_error(&e)]
            }
        },
        ChatCommand::ShowStats => match queue.stats_report().await {
            Ok(lines) => vec![render_report(&lines)],
            Err(e) => {
                error!("Failed to load stats: {}", e);
                vec![render_error(&e)]
            }
        },
    }
}

/// Parse and execute a raw chat message. Messages not addressed to us get no reply.
pub async fn handle_message(queue: &ReviewerQueue, text: &str, options: ReplyOptions) -> Vec<String> {
    match parse_command(text) {
        ParseResult::NoMention => Vec::new(),
        ParseResult::UnrecognizedCommand { attempted } => {
            info!("Unrecognized reviewer command: {:?}", attempted);
            vec![render_unrecognized(&attempted)]
        }
        ParseResult::Command(command) => execute(queue, &command, options).await,
    }
}
