//! Travel calendar: who is away right now.
//!
//! Google offers no "events happening now" query, so we list events ending
//! after now and keep the ones that have already started.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::{Client, Url};
use reviewer_queue_core::ReviewerId;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::collaborators::AvailabilitySource;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Large enough that nothing happening now is missed.
const MAX_EVENTS: &str = "50";

/// Refresh the access token this long before Google says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct GoogleCalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub calendar_id: String,
}

/// When to stop using a token that Google says lasts `expires_in` seconds.
///
/// A lifetime chrono cannot represent counts as already expired, so the next
/// call refreshes again.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub creator: Option<EventCreator>,
}

#[derive(Debug, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<String>,
    /// All-day events only carry a date.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventCreator {
    #[serde(default)]
    pub email: Option<String>,
}

impl EventTime {
    fn instant(&self) -> Option<DateTime<Utc>> {
        if let Some(date_time) = &self.date_time {
            return DateTime::parse_from_rfc3339(date_time)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

/// Lowercase the keys so lookups ignore email case.
pub fn normalize_email_map(map: HashMap<String, String>) -> HashMap<String, ReviewerId> {
    map.into_iter()
        .map(|(email, login)| (email.to_lowercase(), ReviewerId::from(login)))
        .collect()
}

/// Reviewers who created an event that started before `now`.
///
/// Events with no creator email, an unmapped email or an unreadable start are
/// ignored.
pub fn unavailable_from_events(
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    email_map: &HashMap<String, ReviewerId>,
) -> HashSet<ReviewerId> {
    events
        .iter()
        .filter(|event| match event.start.as_ref().and_then(EventTime::instant) {
            Some(start) => start < now,
            None => {
                warn!("Skipping travel event with unreadable start: {:?}", event.start);
                false
            }
        })
        .filter_map(|event| event.creator.as_ref()?.email.as_deref())
        .filter_map(|email| email_map.get(&email.to_lowercase()).cloned())
        .collect()
}

/// Google Calendar backed availability source.
pub struct TravelCalendar {
    client: Client,
    config: GoogleCalendarConfig,
    email_map: HashMap<String, ReviewerId>,
    token_url: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl TravelCalendar {
    pub fn new(config: GoogleCalendarConfig, email_map: HashMap<String, String>) -> Self {
        Self::with_endpoints(config, email_map, GOOGLE_TOKEN_URL, GOOGLE_CALENDAR_API)
    }

    pub fn with_endpoints(
        config: GoogleCalendarConfig,
        email_map: HashMap<String, String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            email_map: normalize_email_map(email_map),
            token_url: token_url.into(),
            api_base: api_base.into(),
            token: Mutex::new(None),
        }
    }

    /// A valid access token, refreshing it when the cached one is (nearly) expired.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        info!("Refreshing Google access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Google token refresh failed: {} - {}",
                status,
                error_text
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;
        let expires_at = token_expiry(Utc::now(), token.expires_in);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    fn events_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).context("Invalid calendar API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Calendar API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(["calendars", self.config.calendar_id.as_str(), "events"]);
        Ok(url)
    }

    pub async fn fetch_current_events(&self, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let token = self.access_token().await?;
        let time_min = now.to_rfc3339();

        let response = self
            .client
            .get(self.events_url()?)
            .bearer_auth(token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("maxResults", MAX_EVENTS),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("timeZone", "UTC"),
            ])
            .send()
            .await
            .context("Failed to send calendar events request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Google Calendar API error: {} - {}",
                status,
                error_text
            ));
        }

        let list: EventList = response
            .json()
            .await
            .context("Failed to parse calendar events response")?;
        Ok(list.items)
    }
}

#[async_trait]
impl AvailabilitySource for TravelCalendar {
    async fn fetch_unavailable_ids(&self) -> HashSet<ReviewerId> {
        let now = Utc::now();
        match self.fetch_current_events(now).await {
            Ok(events) => {
                let away = unavailable_from_events(&events, now, &self.email_map);
                info!("{} reviewer(s) travelling", away.len());
                away
            }
            Err(e) => {
                error!("Error fetching travel calendar events: {:#}", e);
                HashSet::new()
            }
        }
    }
}
