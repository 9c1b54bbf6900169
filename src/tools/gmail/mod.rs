//! Gmail tools

mod convenience;
mod management;
mod reading;
mod writing;

pub use convenience::{
    DeleteLatestEmailTool, ForwardLatestEmailTool, LatestEmailDetailsTool, ReplyLatestEmailTool,
};
pub use management::{DeleteEmailTool, ListLabelsTool, ManageLabelsTool, MarkEmailTool};
pub use reading::{EmailDetailsTool, EmailListKind, EmailListTool, SearchEmailsTool, UnreadCountTool};
pub use writing::{ComposeEmailTool, ForwardEmailTool, ReplyToEmailTool};

use chrono::DateTime;

use crate::google::gmail::EmailContent;

pub(crate) const EMAIL_SENT: &str = "Email sent successfully!";
pub(crate) const EMAIL_FORWARDED: &str = "Email forwarded successfully!";
pub(crate) const EMAIL_DELETED: &str = "Email permanently deleted!";
pub(crate) const EMAIL_MOVED_TO_TRASH: &str = "Email moved to trash!";
pub(crate) const EMAIL_MARKED_READ: &str = "Email marked as read!";
pub(crate) const EMAIL_MARKED_UNREAD: &str = "Email marked as unread!";
pub(crate) const REPLY_SENT: &str = "Reply sent successfully!";

pub(crate) const MIN_EMAIL_COUNT: u32 = 1;
pub(crate) const MAX_EMAIL_COUNT: u32 = 20;
pub(crate) const MAX_SUMMARIZE_COUNT: u32 = 10;
pub(crate) const DEFAULT_EMAIL_COUNT: u32 = 5;

fn default_email_count() -> u32 {
    DEFAULT_EMAIL_COUNT
}

fn count_schema(max: u32, default: u32, what: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "integer",
        "minimum": MIN_EMAIL_COUNT,
        "maximum": max,
        "default": default,
        "description": format!("{} ({}-{})", what, MIN_EMAIL_COUNT, max)
    })
}

fn format_email_for_list(email: &EmailContent, index: usize) -> String {
    format!(
        "{}. **{}**\n   From: {}\n   Date: {}\n   Preview: {}\n   ID: `{}`\n",
        index + 1,
        email.subject,
        email.from,
        email.date,
        email.snippet,
        email.id
    )
}

fn format_email_for_summary(email: &EmailContent, index: usize) -> String {
    let date = DateTime::parse_from_rfc2822(&email.date)
        .map(|d| d.format("%-m/%-d/%Y").to_string())
        .unwrap_or_else(|_| email.date.clone());
    let summary = if email.snippet.is_empty() {
        format!("{}...", email.body.chars().take(100).collect::<String>())
    } else {
        email.snippet.clone()
    };
    format!(
        "**{}. {}**\n• From: {}\n• Date: {}\n• Summary: {}\n",
        index + 1,
        email.subject,
        email.from,
        date,
        summary
    )
}

/// Ids are used as a path segment; anything else goes to Gmail and 404s there.
fn is_valid_message_id(id: &str) -> bool {
    let id = id.trim();
    !id.is_empty() && !id.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> EmailContent {
        EmailContent {
            id: "18c2f".to_string(),
            subject: "Invoice".to_string(),
            from: "billing@example.com".to_string(),
            date: "Mon, 15 Sep 2025 10:00:00 +0000".to_string(),
            body: "Your invoice is attached".to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_list_format_includes_id() {
        let text = format_email_for_list(&email(), 0);
        assert!(text.starts_with("1. **Invoice**"));
        assert!(text.contains("ID: `18c2f`"));
    }

    #[test]
    fn test_summary_falls_back_to_body() {
        let text = format_email_for_summary(&email(), 1);
        assert!(text.starts_with("**2. Invoice**"));
        assert!(text.contains("• Date: 9/15/2025"));
        assert!(text.contains("• Summary: Your invoice is attached..."));
    }

    #[test]
    fn test_message_id_validation() {
        assert!(is_valid_message_id("abc"));
        assert!(!is_valid_message_id("  "));
        assert!(!is_valid_message_id("../labels"));
    }
}
