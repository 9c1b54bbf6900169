//! Creating, updating and deleting events

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::google::calendar::{
    self, format_event_time, format_instant, parse_date_time, Attendee, CalendarEvent, EventTime,
};
use crate::tools::{parse_args, Tool, ToolContext, ToolOutput};
use crate::Result;

use super::reading::{event_id_schema, EventIdArgs};

const DEFAULT_TIME_ZONE: &str = "UTC";

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn view_link(event: &CalendarEvent) -> String {
    event.html_link.as_deref()
        .map(|link| format!("\n🔗 [View in Google Calendar]({})", link))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventArgs {
    summary: String,
    description: Option<String>,
    start_date_time: String,
    end_date_time: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
    location: Option<String>,
    #[serde(default = "default_time_zone")]
    time_zone: String,
}

/// `createEvent`
pub struct CreateEventTool;

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str { "createEvent" }
    fn description(&self) -> &str { "Create a new calendar event" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string", "description": "Event title/summary" },
                "description": { "type": "string", "description": "Event description" },
                "startDateTime": {
                    "type": "string",
                    "description": "Start date and time (e.g., '2025-09-15T10:00:00', '2025-09-15 10:00 AM')"
                },
                "endDateTime": {
                    "type": "string",
                    "description": "End date and time (if not provided, defaults to 1 hour after start)"
                },
                "attendees": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Array of attendee email addresses"
                },
                "location": { "type": "string", "description": "Event location" },
                "timeZone": {
                    "type": "string",
                    "default": DEFAULT_TIME_ZONE,
                    "description": "Timezone for the event (e.g., 'America/New_York')"
                }
            },
            "required": ["summary", "startDateTime"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: CreateEventArgs = parse_args(self.name(), params)?;

        let start = parse_date_time(&args.start_date_time)?;
        let end = match args.end_date_time.as_deref() {
            Some(end) => parse_date_time(end)?,
            None => start + Duration::hours(1),
        };

        let event = CalendarEvent {
            summary: args.summary,
            description: args.description.filter(|d| !d.is_empty()),
            start: EventTime::at(start, &args.time_zone),
            end: EventTime::at(end, &args.time_zone),
            attendees: args.attendees.iter().map(Attendee::new).collect(),
            location: args.location.clone().filter(|l| !l.is_empty()),
            ..Default::default()
        };
        let created = calendar::insert_event(&ctx.google, &event).await?;

        let mut text = format!(
            "✅ **Event Created Successfully!**\n\n📅 **{}**\n🕒 {} - {}\n",
            created.summary,
            format_instant(start),
            format_instant(end)
        );
        if let Some(location) = &event.location {
            text.push_str(&format!("📍 {}\n", location));
        }
        if !args.attendees.is_empty() {
            text.push_str(&format!("👥 Attendees: {}\n", args.attendees.join(", ")));
        }
        text.push_str(&view_link(&created));
        Ok(ToolOutput::Text(text))
    }

    fn failure_label(&self) -> &str {
        "Failed to create event"
    }
}

fn default_duration() -> i64 {
    60
}

fn default_meeting_time() -> String {
    "10:00 AM".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickMeetingArgs {
    attendee_email: String,
    date: String,
    #[serde(default = "default_meeting_time")]
    time: String,
    #[serde(default = "default_duration")]
    duration: i64,
    subject: Option<String>,
    location: Option<String>,
}

/// `scheduleQuickMeeting`
pub struct QuickMeetingTool;

#[async_trait]
impl Tool for QuickMeetingTool {
    fn name(&self) -> &str { "scheduleQuickMeeting" }
    fn description(&self) -> &str { "Quickly schedule a meeting with someone" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "attendeeEmail": { "type": "string", "description": "Email address of the person to meet with" },
                "date": { "type": "string", "description": "Date for the meeting (e.g., '2025-09-15')" },
                "time": {
                    "type": "string",
                    "description": "Time for the meeting (e.g., '10:00 AM', '14:30'). Defaults to 10:00 AM if not specified"
                },
                "duration": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 60,
                    "description": "Meeting duration in minutes (default: 60)"
                },
                "subject": { "type": "string", "description": "Meeting subject/title" },
                "location": { "type": "string", "description": "Meeting location (can be a physical location or video link)" }
            },
            "required": ["attendeeEmail", "date"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: QuickMeetingArgs = parse_args(self.name(), params)?;

        let start = parse_date_time(&format!("{} {}", args.date, args.time))?;
        let end = start + Duration::minutes(args.duration);

        let summary = args.subject.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| {
            let who = args.attendee_email.split('@').next().unwrap_or_default();
            format!("Meeting with {}", who)
        });

        let event = CalendarEvent {
            summary,
            start: EventTime::at(start, DEFAULT_TIME_ZONE),
            end: EventTime::at(end, DEFAULT_TIME_ZONE),
            attendees: vec![Attendee::new(args.attendee_email.clone())],
            location: args.location.clone().filter(|l| !l.is_empty()),
            ..Default::default()
        };
        let created = calendar::insert_event(&ctx.google, &event).await?;

        let mut text = format!(
            "✅ **Meeting Scheduled Successfully!**\n\n📅 **{}**\n🕒 {} ({} minutes)\n👥 With: {}\n",
            created.summary,
            format_instant(start),
            args.duration,
            args.attendee_email
        );
        if let Some(location) = &event.location {
            text.push_str(&format!("📍 {}\n", location));
        }
        text.push_str(&view_link(&created));
        Ok(ToolOutput::Text(text))
    }

    fn failure_label(&self) -> &str {
        "Failed to schedule meeting"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEventArgs {
    event_id: String,
    summary: Option<String>,
    description: Option<String>,
    start_date_time: Option<String>,
    end_date_time: Option<String>,
    location: Option<String>,
    #[serde(default)]
    add_attendees: Vec<String>,
    #[serde(default)]
    remove_attendees: Vec<String>,
}

impl UpdateEventArgs {
    /// Apply the requested changes on top of the stored event.
    fn apply(&self, mut event: CalendarEvent) -> Result<CalendarEvent> {
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            event.summary = summary.to_string();
        }
        if self.description.is_some() {
            event.description = self.description.clone();
        }
        if self.location.is_some() {
            event.location = self.location.clone();
        }
        if let Some(start) = self.start_date_time.as_deref().filter(|s| !s.is_empty()) {
            event.start.date_time = Some(calendar::to_rfc3339(parse_date_time(start)?));
        }
        if let Some(end) = self.end_date_time.as_deref().filter(|s| !s.is_empty()) {
            event.end.date_time = Some(calendar::to_rfc3339(parse_date_time(end)?));
        }

        event.attendees.retain(|a| !self.remove_attendees.contains(&a.email));
        for email in &self.add_attendees {
            if !event.attendees.iter().any(|a| &a.email == email) {
                event.attendees.push(Attendee::new(email.clone()));
            }
        }
        Ok(event)
    }
}

/// `updateEvent`
pub struct UpdateEventTool;

#[async_trait]
impl Tool for UpdateEventTool {
    fn name(&self) -> &str { "updateEvent" }
    fn description(&self) -> &str { "Update an existing calendar event" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "eventId": { "type": "string", "description": "ID of the event to update" },
                "summary": { "type": "string", "description": "New event title/summary" },
                "description": { "type": "string", "description": "New event description" },
                "startDateTime": { "type": "string", "description": "New start date and time" },
                "endDateTime": { "type": "string", "description": "New end date and time" },
                "location": { "type": "string", "description": "New event location" },
                "addAttendees": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Email addresses to add as attendees"
                },
                "removeAttendees": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Email addresses to remove from attendees"
                }
            },
            "required": ["eventId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: UpdateEventArgs = parse_args(self.name(), params)?;

        let existing = calendar::get_event(&ctx.google, &args.event_id).await?;
        let changed = args.apply(existing)?;
        let updated = calendar::update_event(&ctx.google, &args.event_id, &changed).await?;

        Ok(ToolOutput::Text(format!(
            "✅ **Event Updated Successfully!**\n\n📅 **{}**\n🕒 {}",
            updated.summary,
            format_event_time(&updated.start)
        )))
    }

    fn failure_label(&self) -> &str {
        "Failed to update event"
    }
}

/// `deleteEvent`
pub struct DeleteEventTool;

#[async_trait]
impl Tool for DeleteEventTool {
    fn name(&self) -> &str { "deleteEvent" }
    fn description(&self) -> &str { "Delete a calendar event" }

    fn parameters(&self) -> Value {
        event_id_schema("ID of the event to delete")
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: EventIdArgs = parse_args(self.name(), params)?;
        calendar::delete_event(&ctx.google, &args.event_id).await?;
        Ok(ToolOutput::Text("✅ **Event deleted successfully!**".to_string()))
    }

    fn failure_label(&self) -> &str {
        "Failed to delete event"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::context;
    use crate::tools::ToolRegistry;
    use wiremock::matchers::{any, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_event_defaults_to_one_hour() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(body_partial_json(json!({
                "summary": "Dentist",
                "start": {"dateTime": "2025-09-15T10:00:00.000Z", "timeZone": "UTC"},
                "end": {"dateTime": "2025-09-15T11:00:00.000Z", "timeZone": "UTC"},
                "attendees": [{"email": "pat@example.com"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ev1",
                "summary": "Dentist",
                "htmlLink": "https://calendar.example/ev1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = CreateEventTool
            .execute(&context(&server), json!({
                "summary": "Dentist",
                "startDateTime": "2025-09-15T10:00:00Z",
                "attendees": ["pat@example.com"]
            }))
            .await
            .unwrap();
        let text = output.as_text().unwrap();
        assert!(text.starts_with("✅ **Event Created Successfully!**\n\n📅 **Dentist**\n"));
        assert!(text.contains("👥 Attendees: pat@example.com\n"));
        assert!(text.ends_with("🔗 [View in Google Calendar](https://calendar.example/ev1)"));
    }

    #[tokio::test]
    async fn test_create_event_rejects_bad_date_without_calls() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let registry = ToolRegistry::new_with_defaults();
        let output = registry
            .execute(&context(&server), "createEvent", json!({"summary": "x", "startDateTime": "next blursday"}))
            .await
            .unwrap();
        assert_eq!(
            output.as_text(),
            Some("❌ Failed to create event: Invalid date/time format: next blursday")
        );
    }

    #[tokio::test]
    async fn test_quick_meeting_names_itself_after_attendee() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(body_partial_json(json!({"summary": "Meeting with sam"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ev2", "summary": "Meeting with sam"})))
            .expect(1)
            .mount(&server)
            .await;

        let output = QuickMeetingTool
            .execute(&context(&server), json!({"attendeeEmail": "sam@example.com", "date": "2025-09-15", "duration": 30}))
            .await
            .unwrap();
        let text = output.as_text().unwrap();
        assert!(text.contains("(30 minutes)\n👥 With: sam@example.com\n"));
    }

    #[test]
    fn test_update_merges_attendees() {
        let args: UpdateEventArgs = serde_json::from_value(json!({
            "eventId": "ev1",
            "summary": "Renamed",
            "addAttendees": ["new@example.com", "keep@example.com"],
            "removeAttendees": ["gone@example.com"]
        }))
        .unwrap();
        let existing = CalendarEvent {
            summary: "Old".to_string(),
            attendees: vec![Attendee::new("keep@example.com"), Attendee::new("gone@example.com")],
            ..Default::default()
        };

        let updated = args.apply(existing).unwrap();
        assert_eq!(updated.summary, "Renamed");
        let emails: Vec<&str> = updated.attendees.iter().map(|a| a.email.as_str()).collect();
        assert_eq!(emails, vec!["keep@example.com", "new@example.com"]);
    }

    #[tokio::test]
    async fn test_update_writes_back_unknown_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events/ev1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ev1",
                "summary": "Sync",
                "start": {"dateTime": "2025-09-15T10:00:00Z"},
                "end": {"dateTime": "2025-09-15T11:00:00Z"},
                "reminders": {"useDefault": true}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/calendar/v3/calendars/primary/events/ev1"))
            .and(body_partial_json(json!({"summary": "Sync v2", "reminders": {"useDefault": true}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ev1",
                "summary": "Sync v2",
                "start": {"dateTime": "2025-09-15T10:00:00Z"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = UpdateEventTool
            .execute(&context(&server), json!({"eventId": "ev1", "summary": "Sync v2"}))
            .await
            .unwrap();
        assert!(output.as_text().unwrap().starts_with("✅ **Event Updated Successfully!**\n\n📅 **Sync v2**\n🕒 "));
    }

    #[tokio::test]
    async fn test_delete_event() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendar/v3/calendars/primary/events/ev1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let output = DeleteEventTool.execute(&context(&server), json!({"eventId": "ev1"})).await.unwrap();
        assert_eq!(output.as_text(), Some("✅ **Event deleted successfully!**"));
    }
}
