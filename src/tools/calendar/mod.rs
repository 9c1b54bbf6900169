//! Google Calendar tools

mod reading;
mod writing;

pub use reading::{EventDetailsTool, EventListKind, EventListTool, SearchEventsTool};
pub use writing::{CreateEventTool, DeleteEventTool, QuickMeetingTool, UpdateEventTool};

use crate::google::calendar::{format_event_time, CalendarEvent};

/// Two-line summary used by the listings.
fn format_event_summary(event: &CalendarEvent) -> String {
    let location = event.location.as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!(" at {}", l))
        .unwrap_or_default();
    let attendees = match event.attendees.len() {
        0 => String::new(),
        n => format!(" ({} attendees)", n),
    };
    format!(
        "📅 **{}**\n🕒 {}{}{}",
        event.summary,
        format_event_time(&event.start),
        location,
        attendees
    )
}

fn numbered_summaries(events: &[CalendarEvent]) -> String {
    events.iter().enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, format_event_summary(e)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn response_status_emoji(status: Option<&str>) -> &'static str {
    match status {
        Some("accepted") => "✅",
        Some("declined") => "❌",
        Some("tentative") => "❓",
        _ => "⏳",
    }
}
