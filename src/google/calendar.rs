//! Google Calendar event model and helpers

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::Result;

use super::{GoogleApi, Service};

const EVENTS: &str = "calendars/primary/events";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    /// Fields this crate does not model, kept so updates write them back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.date.is_some() && self.start.date_time.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(instant: DateTime<Utc>, time_zone: &str) -> Self {
        Self {
            date_time: Some(to_rfc3339(instant)),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

impl Attendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into(), ..Default::default() }
    }
}

#[derive(Debug, Default, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// Time window and filters for an event listing
#[derive(Debug, Clone)]
pub struct EventWindow {
    pub query: Option<String>,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub max_results: Option<u32>,
}

impl EventWindow {
    /// From now until `days` days ahead.
    pub fn upcoming(days: u32, max_results: u32) -> Self {
        let now = Utc::now();
        Self {
            query: None,
            time_min: now,
            time_max: now + Duration::days(i64::from(days)),
            max_results: Some(max_results),
        }
    }

    /// Local midnight to the following midnight.
    pub fn today() -> Self {
        let today = Local::now().date_naive();
        let start = local_to_utc(today.and_time(NaiveTime::MIN)).unwrap_or_else(Utc::now);
        Self {
            query: None,
            time_min: start,
            time_max: start + Duration::days(1),
            max_results: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}?", EVENTS);
        if let Some(q) = &self.query {
            endpoint.push_str(&format!("q={}&", urlencoding::encode(q)));
        }
        endpoint.push_str(&format!(
            "timeMin={}&timeMax={}",
            urlencoding::encode(&to_rfc3339(self.time_min)),
            urlencoding::encode(&to_rfc3339(self.time_max)),
        ));
        if let Some(max) = self.max_results {
            endpoint.push_str(&format!("&maxResults={}", max));
        }
        endpoint.push_str("&singleEvents=true&orderBy=startTime");
        endpoint
    }
}

fn event_path(id: &str) -> String {
    format!("{}/{}", EVENTS, urlencoding::encode(id))
}

pub async fn list_events(api: &GoogleApi, window: &EventWindow) -> Result<Vec<CalendarEvent>> {
    let value = api.calendar_get(&window.endpoint()).await?;
    let list: EventList = serde_json::from_value(value)?;
    Ok(list.items)
}

pub async fn get_event(api: &GoogleApi, id: &str) -> Result<CalendarEvent> {
    let value = api.calendar_get(&event_path(id)).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn insert_event(api: &GoogleApi, event: &CalendarEvent) -> Result<CalendarEvent> {
    let body = serde_json::to_value(event)?;
    let value = api.request(Service::Calendar, EVENTS, Method::POST, Some(&body)).await?;
    Ok(serde_json::from_value(value)?)
}

/// Full replacement of an existing event.
pub async fn update_event(api: &GoogleApi, id: &str, event: &CalendarEvent) -> Result<CalendarEvent> {
    let body = serde_json::to_value(event)?;
    let value = api.request(Service::Calendar, &event_path(id), Method::PUT, Some(&body)).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn delete_event(api: &GoogleApi, id: &str) -> Result<()> {
    api.request(Service::Calendar, &event_path(id), Method::DELETE, None).await?;
    Ok(())
}

pub fn to_rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local.from_local_datetime(&naive).earliest().map(|dt| dt.with_timezone(&Utc))
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %I:%M%p",
];

/// Parse user-supplied date/time text. Inputs without an offset are local time.
pub fn parse_date_time(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid = || Error::ToolExecution(format!("Invalid date/time format: {}", input));

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = DATE_TIME_FORMATS.iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(invalid)?;

    local_to_utc(naive).ok_or_else(invalid)
}

/// Human-readable start or end of an event.
pub fn format_event_time(time: &EventTime) -> String {
    if let Some(dt) = time.date_time.as_deref() {
        return match DateTime::parse_from_rfc3339(dt) {
            Ok(parsed) => format_instant(parsed.with_timezone(&Utc)),
            Err(_) => dt.to_string(),
        };
    }
    if let Some(date) = time.date.as_deref() {
        return match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(parsed) => parsed.format("%B %-d, %Y").to_string(),
            Err(_) => date.to_string(),
        };
    }
    "Unknown time".to_string()
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%B %-d, %Y %I:%M %p").to_string()
}
