//! Listing, searching and reading events

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::google::calendar::{self, format_event_time, CalendarEvent, EventWindow};
use crate::tools::{failure_output, parse_args, OutputMode, Tool, ToolContext, ToolOutput, UiPayload};
use crate::Result;

use super::{numbered_summaries, response_status_emoji};

fn default_max_results() -> u32 {
    10
}

fn default_upcoming_days() -> u32 {
    7
}

fn default_search_days() -> u32 {
    30
}

fn max_results_schema(description: &str) -> Value {
    json!({ "type": "integer", "minimum": 1, "maximum": 50, "default": 10, "description": description })
}

fn days_schema(default: u32, description: &str) -> Value {
    json!({ "type": "integer", "minimum": 1, "maximum": 365, "default": default, "description": description })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventListKind {
    /// The next N days
    Upcoming,
    /// Local midnight to midnight
    Today,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpcomingArgs {
    #[serde(default = "default_max_results")]
    max_results: u32,
    #[serde(default = "default_upcoming_days")]
    days: u32,
}

/// `getUpcomingEvents` and `getTodayEvents` in either tier
pub struct EventListTool {
    kind: EventListKind,
    mode: OutputMode,
    name: String,
    description: String,
}

impl EventListTool {
    pub fn new(kind: EventListKind, mode: OutputMode) -> Self {
        let (base, description) = match (kind, mode) {
            (EventListKind::Upcoming, OutputMode::Rendered) => (
                "getUpcomingEvents",
                "Get upcoming calendar events with structured data for UI rendering",
            ),
            (EventListKind::Upcoming, OutputMode::Text) => (
                "getUpcomingEvents",
                "Get upcoming calendar events from the user's primary calendar",
            ),
            (EventListKind::Today, OutputMode::Rendered) => (
                "getTodayEvents",
                "Get today's calendar events with structured data for UI rendering",
            ),
            (EventListKind::Today, OutputMode::Text) => ("getTodayEvents", "Get today's calendar events"),
        };
        Self {
            kind,
            mode,
            name: mode.tool_name(base),
            description: description.to_string(),
        }
    }

    fn render(&self, events: Vec<CalendarEvent>, days: u32) -> ToolOutput {
        match (self.mode, self.kind) {
            (OutputMode::Rendered, EventListKind::Upcoming) => ToolOutput::Rendered(UiPayload::Events {
                events,
                title: "Upcoming Events".to_string(),
                subtitle: Some(format!("Next {} days", days)),
                query: None,
                group_by_date: true,
            }),
            (OutputMode::Rendered, EventListKind::Today) => ToolOutput::Rendered(UiPayload::Events {
                events,
                title: "Today's Events".to_string(),
                subtitle: Some(Local::now().format("%A, %B %-d, %Y").to_string()),
                query: None,
                group_by_date: false,
            }),
            (OutputMode::Text, EventListKind::Upcoming) if events.is_empty() => {
                ToolOutput::Text(format!("📅 No upcoming events found in the next {} days.", days))
            }
            (OutputMode::Text, EventListKind::Upcoming) => ToolOutput::Text(format!(
                "📅 **Upcoming Events (Next {} days):**\n\n{}",
                days,
                numbered_summaries(&events)
            )),
            (OutputMode::Text, EventListKind::Today) if events.is_empty() => {
                ToolOutput::Text("📅 No events scheduled for today.".to_string())
            }
            (OutputMode::Text, EventListKind::Today) => {
                ToolOutput::Text(format!("📅 **Today's Events:**\n\n{}", numbered_summaries(&events)))
            }
        }
    }
}

#[async_trait]
impl Tool for EventListTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { &self.description }

    fn parameters(&self) -> Value {
        match self.kind {
            EventListKind::Upcoming => json!({
                "type": "object",
                "properties": {
                    "maxResults": max_results_schema("Maximum number of events to retrieve (1-50)"),
                    "days": days_schema(default_upcoming_days(), "Number of days to look ahead (1-365)")
                }
            }),
            EventListKind::Today => json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let (window, days) = match self.kind {
            EventListKind::Upcoming => {
                let args: UpcomingArgs = parse_args(&self.name, params)?;
                (EventWindow::upcoming(args.days, args.max_results), args.days)
            }
            EventListKind::Today => (EventWindow::today(), 1),
        };
        let events = calendar::list_events(&ctx.google, &window).await?;
        Ok(self.render(events, days))
    }

    fn failure_label(&self) -> &str {
        match self.kind {
            EventListKind::Upcoming => "Failed to get upcoming events",
            EventListKind::Today => "Failed to get today's events",
        }
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u32,
    #[serde(default = "default_search_days")]
    days: u32,
}

/// `searchEvents`
pub struct SearchEventsTool {
    mode: OutputMode,
    name: String,
}

impl SearchEventsTool {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode, name: mode.tool_name("searchEvents") }
    }
}

#[async_trait]
impl Tool for SearchEventsTool {
    fn name(&self) -> &str { &self.name }

    fn description(&self) -> &str {
        match self.mode {
            OutputMode::Rendered => "Search for calendar events with structured data for UI rendering",
            OutputMode::Text => "Search for calendar events by text query",
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to find events (searches in title, description, location)"
                },
                "maxResults": max_results_schema("Maximum number of events to return"),
                "days": days_schema(default_search_days(), "Number of days to search within")
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: SearchArgs = parse_args(&self.name, params)?;
        let window = EventWindow::upcoming(args.days, args.max_results).with_query(args.query.clone());
        let events = calendar::list_events(&ctx.google, &window).await?;

        Ok(match self.mode {
            OutputMode::Rendered => ToolOutput::Rendered(UiPayload::Events {
                title: "Search Results".to_string(),
                subtitle: Some(format!("Found {} events matching \"{}\"", events.len(), args.query)),
                events,
                query: Some(args.query),
                group_by_date: true,
            }),
            OutputMode::Text if events.is_empty() => ToolOutput::Text(format!(
                "📅 No events found matching \"{}\" in the next {} days.",
                args.query, args.days
            )),
            OutputMode::Text => ToolOutput::Text(format!(
                "📅 **Search Results for \"{}\":**\n\n{}",
                args.query,
                numbered_summaries(&events)
            )),
        })
    }

    fn failure_label(&self) -> &str {
        "Failed to search events"
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EventIdArgs {
    pub event_id: String,
}

pub(super) fn event_id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "eventId": { "type": "string", "description": description }
        },
        "required": ["eventId"]
    })
}

fn event_details_text(event: &CalendarEvent) -> String {
    let mut details = String::from("📅 **Event Details:**\n\n");
    details.push_str(&format!("**Title:** {}\n", event.summary));
    details.push_str(&format!("**Start:** {}\n", format_event_time(&event.start)));
    details.push_str(&format!("**End:** {}\n", format_event_time(&event.end)));

    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        details.push_str(&format!("**Description:** {}\n", description));
    }
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        details.push_str(&format!("**Location:** {}\n", location));
    }
    if !event.attendees.is_empty() {
        details.push_str("**Attendees:**\n");
        for attendee in &event.attendees {
            let name = attendee.display_name.as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default();
            details.push_str(&format!(
                "  {} {}{}\n",
                response_status_emoji(attendee.response_status.as_deref()),
                attendee.email,
                name
            ));
        }
    }
    if let Some(link) = &event.html_link {
        details.push_str(&format!("\n🔗 [View in Google Calendar]({})", link));
    }
    details
}

/// `getEventDetails`
pub struct EventDetailsTool {
    mode: OutputMode,
    name: String,
}

impl EventDetailsTool {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode, name: mode.tool_name("getEventDetails") }
    }
}

#[async_trait]
impl Tool for EventDetailsTool {
    fn name(&self) -> &str { &self.name }

    fn description(&self) -> &str {
        match self.mode {
            OutputMode::Rendered => {
                "Get detailed information about a specific calendar event with structured data for UI rendering"
            }
            OutputMode::Text => "Get detailed information about a specific calendar event",
        }
    }

    fn parameters(&self) -> Value {
        event_id_schema("The ID of the event to get details for")
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: EventIdArgs = parse_args(&self.name, params)?;
        let event = calendar::get_event(&ctx.google, &args.event_id).await?;
        Ok(match self.mode {
            OutputMode::Rendered => ToolOutput::Rendered(UiPayload::EventDetail {
                event,
                title: "Event Details".to_string(),
            }),
            OutputMode::Text => ToolOutput::Text(event_details_text(&event)),
        })
    }

    fn failure_label(&self) -> &str {
        "Failed to get event details"
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::calendar::Attendee;
    use crate::tools::test_support::context;
    use crate::tools::ToolRegistry;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upcoming_events_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(query_param("maxResults", "3"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "e1", "summary": "Standup", "start": {"date": "2025-09-15"}, "end": {"date": "2025-09-16"}},
                    {"id": "e2", "summary": "Offsite", "start": {"date": "2025-09-17"}, "end": {"date": "2025-09-18"}, "location": "Lisbon"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = ToolRegistry::new_with_defaults();
        let output = registry
            .execute(&context(&server), "getUpcomingEventsOriginal", json!({"maxResults": 3, "days": 14}))
            .await
            .unwrap();
        assert_eq!(
            output.as_text(),
            Some("📅 **Upcoming Events (Next 14 days):**\n\n1. 📅 **Standup**\n🕒 September 15, 2025\n\n2. 📅 **Offsite**\n🕒 September 17, 2025 at Lisbon")
        );
    }

    #[tokio::test]
    async fn test_upcoming_events_rendered_groups_by_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let output = EventListTool::new(EventListKind::Upcoming, OutputMode::Rendered)
            .execute(&context(&server), json!({}))
            .await
            .unwrap();
        match output {
            ToolOutput::Rendered(UiPayload::Events { title, subtitle, group_by_date, .. }) => {
                assert_eq!(title, "Upcoming Events");
                assert_eq!(subtitle.as_deref(), Some("Next 7 days"));
                assert!(group_by_date);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_with_no_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(query_param("q", "dentist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let output = SearchEventsTool::new(OutputMode::Text)
            .execute(&context(&server), json!({"query": "dentist"}))
            .await
            .unwrap();
        assert_eq!(output.as_text(), Some("📅 No events found matching \"dentist\" in the next 30 days."));
    }

    #[test]
    fn test_details_text_lists_attendees() {
        let mut accepted = Attendee::new("ada@example.com");
        accepted.response_status = Some("accepted".to_string());
        accepted.display_name = Some("Ada".to_string());
        let event = CalendarEvent {
            summary: "Planning".to_string(),
            attendees: vec![accepted, Attendee::new("bob@example.com")],
            html_link: Some("https://calendar.example/e1".to_string()),
            ..Default::default()
        };
        let text = event_details_text(&event);
        assert!(text.contains("**Attendees:**\n  ✅ ada@example.com (Ada)\n  ⏳ bob@example.com\n"));
        assert!(text.ends_with("🔗 [View in Google Calendar](https://calendar.example/e1)"));
    }

    #[tokio::test]
    async fn test_missing_event_in_rendered_tier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let registry = ToolRegistry::new_with_defaults();
        let output = registry.execute(&context(&server), "getEventDetails", json!({"eventId": "nope"})).await.unwrap();
        assert_eq!(
            output,
            ToolOutput::Rendered(UiPayload::Error {
                message: "Failed to get event details: Google API error: 404 Not Found".to_string()
            })
        );
    }
}
