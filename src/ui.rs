use colored::*;
use serde_json::Value;
use terminal_size::{terminal_size, Height, Width};

use crate::google::calendar::{format_event_time, CalendarEvent};
use crate::google::gmail::EmailContent;
use crate::tools::UiPayload;

fn rule() -> String {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    "─".repeat(width.0 as usize)
}

pub fn print_header(title: &str, subtitle: &str) {
    let line = rule();
    println!("{}", line.black().bold());

    let name = "Orbit".cyan().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  🛰️  {} {}  {}", name, version, title.bold());
    println!("  {}", subtitle.cyan());

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// Rich rendering for a tool result, `None` when it carries no known `type`.
pub fn render_tool_result(result: &Value) -> Option<String> {
    UiPayload::from_value(result).map(|payload| render_payload(&payload))
}

pub fn render_payload(payload: &UiPayload) -> String {
    let mut out = Vec::new();
    match payload {
        UiPayload::Emails { emails, title, subtitle, message, query, compact } => {
            out.push(heading(title, subtitle.as_deref()));
            if let Some(query) = query {
                out.push(format!("  {} {}", "query:".black().bold(), query.italic()));
            }
            if emails.is_empty() {
                out.push(format!("  {}", message.as_deref().unwrap_or("No emails found.").dimmed()));
            }
            for (i, email) in emails.iter().enumerate() {
                out.push(email_card(i + 1, email, *compact));
            }
        }
        UiPayload::Events { events, title, subtitle, query, group_by_date } => {
            out.push(heading(title, subtitle.as_deref()));
            if let Some(query) = query {
                out.push(format!("  {} {}", "query:".black().bold(), query.italic()));
            }
            if events.is_empty() {
                out.push(format!("  {}", "No events found.".dimmed()));
            } else if *group_by_date {
                let mut current: Option<String> = None;
                for event in events {
                    let day = event_day(event);
                    if current.as_deref() != Some(day.as_str()) {
                        out.push(format!("  {}", day.magenta().bold()));
                        current = Some(day);
                    }
                    out.push(event_card(event));
                }
            } else {
                out.extend(events.iter().map(event_card));
            }
        }
        UiPayload::EmailDetail { email, title } => {
            out.push(heading(title, None));
            out.push(format!("  {} {}", "From:".bold(), email.from));
            out.push(format!("  {} {}", "Subject:".bold(), email.subject));
            out.push(format!("  {} {}", "Date:".bold(), email.date));
            out.push(format!("  {} {}", "ID:".bold(), email.id.black().bold()));
            out.push(String::new());
            out.extend(email.body.lines().map(|l| format!("  {}", l)));
        }
        UiPayload::EventDetail { event, title } => {
            out.push(heading(title, None));
            out.push(event_card(event));
            if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
                out.push(format!("    {}", description.dimmed()));
            }
            for attendee in &event.attendees {
                let status = attendee.response_status.as_deref().unwrap_or("needsAction");
                out.push(format!("    👤 {} ({})", attendee.email, status));
            }
            if let Some(link) = &event.html_link {
                out.push(format!("    🔗 {}", link.underline()));
            }
        }
        UiPayload::Error { message } => {
            out.push(format!("  {} {}", "❌".red().bold(), message.red()));
        }
    }
    out.join("\n")
}

fn heading(title: &str, subtitle: Option<&str>) -> String {
    match subtitle {
        Some(sub) => format!("{} {}", title.cyan().bold(), format!("· {}", sub).dimmed()),
        None => title.cyan().bold().to_string(),
    }
}

fn email_card(n: usize, email: &EmailContent, compact: bool) -> String {
    let mut card = format!(
        "  {}. 📧 {}\n     {} {}",
        n,
        email.subject.bold(),
        email.from.yellow(),
        email.date.dimmed()
    );
    if !compact && !email.snippet.is_empty() {
        card.push_str(&format!("\n     {}", email.snippet.dimmed()));
    }
    card.push_str(&format!("\n     {}", format!("id: {}", email.id).black().bold()));
    card
}

fn event_card(event: &CalendarEvent) -> String {
    let mut card = format!("  📅 {}\n     🕒 {}", event.summary.bold(), format_event_time(&event.start));
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        card.push_str(&format!("\n     📍 {}", location));
    }
    if !event.id.is_empty() {
        card.push_str(&format!("\n     {}", format!("id: {}", event.id).black().bold()));
    }
    card
}

fn event_day(event: &CalendarEvent) -> String {
    let time = format_event_time(&event.start);
    if event.is_all_day() {
        return time;
    }
    // "March 14, 2025 09:30 AM" -> "March 14, 2025"
    match time.rfind(' ').and_then(|i| time[..i].rfind(' ')) {
        Some(cut) => time[..cut].to_string(),
        None => time,
    }
}
