//! Deleting, marking and labelling messages

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::google::gmail::{self, GmailLabel};
use crate::tools::{failure_text, parse_args, Tool, ToolContext, ToolOutput};
use crate::Result;

use super::{
    is_valid_message_id, EMAIL_DELETED, EMAIL_MARKED_READ, EMAIL_MARKED_UNREAD,
    EMAIL_MOVED_TO_TRASH,
};

const EMAIL_NOT_FOUND: &str = "❌ Email not found. The email may have already been deleted or the message ID is invalid. Please check the email list again and use the correct message ID.";

/// Trash or permanently delete message `id`.
pub(super) async fn delete_email(ctx: &ToolContext, id: &str, permanent: bool) -> Result<ToolOutput> {
    if !is_valid_message_id(id) {
        return Err(Error::InvalidMessageId);
    }

    let email = gmail::get_email_content(&ctx.google, id).await?;

    let text = if permanent {
        gmail::delete_message(&ctx.google, id).await?;
        format!(
            "{}\n\n**Deleted Email:**\n• Subject: {}\n• From: {}\n• Date: {}\n\n⚠️ This email cannot be recovered.",
            EMAIL_DELETED, email.subject, email.from, email.date
        )
    } else {
        gmail::trash_message(&ctx.google, id).await?;
        format!(
            "{}\n\n**Moved Email:**\n• Subject: {}\n• From: {}\n• Date: {}\n\n💡 You can still recover this email from the trash folder.",
            EMAIL_MOVED_TO_TRASH, email.subject, email.from, email.date
        )
    };
    Ok(ToolOutput::Text(text))
}

/// Delete failures, with a dedicated message for unknown ids.
pub(super) fn delete_failure(label: &str, err: &Error) -> ToolOutput {
    let text = match err {
        Error::Api { status: 404, .. } => EMAIL_NOT_FOUND.to_string(),
        Error::Api { body, .. } if body.contains("Requested entity was not found") => EMAIL_NOT_FOUND.to_string(),
        Error::InvalidMessageId => format!("❌ {}", err),
        _ => failure_text(label, err),
    };
    ToolOutput::Text(text)
}

pub(super) fn permanent_property() -> Value {
    json!({
        "type": "boolean",
        "default": false,
        "description": "If true, permanently delete the email; if false, move to trash"
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteArgs {
    message_id: String,
    #[serde(default)]
    permanent: bool,
}

/// `deleteEmail`
pub struct DeleteEmailTool;

#[async_trait]
impl Tool for DeleteEmailTool {
    fn name(&self) -> &str { "deleteEmail" }

    fn description(&self) -> &str {
        "Delete an email (move to trash or permanently delete). Use this when user wants to delete a specific email by message ID."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": { "type": "string", "description": "Gmail message ID of the email to delete" },
                "permanent": permanent_property()
            },
            "required": ["messageId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: DeleteArgs = parse_args(self.name(), params)?;
        delete_email(ctx, &args.message_id, args.permanent).await
    }

    fn failure_label(&self) -> &str {
        "Error deleting email"
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        delete_failure(self.failure_label(), err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkArgs {
    message_id: String,
    mark_as_read: bool,
}

/// `markEmailAsReadOrUnread`
pub struct MarkEmailTool;

#[async_trait]
impl Tool for MarkEmailTool {
    fn name(&self) -> &str { "markEmailAsReadOrUnread" }
    fn description(&self) -> &str { "Mark an email as read or unread" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": { "type": "string", "description": "Gmail message ID of the email to mark" },
                "markAsRead": { "type": "boolean", "description": "If true, mark as read; if false, mark as unread" }
            },
            "required": ["messageId", "markAsRead"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: MarkArgs = parse_args(self.name(), params)?;
        let email = gmail::get_email_content(&ctx.google, &args.message_id).await?;

        let unread = vec!["UNREAD".to_string()];
        let headline = if args.mark_as_read {
            gmail::modify_labels(&ctx.google, &args.message_id, &[], &unread).await?;
            EMAIL_MARKED_READ
        } else {
            gmail::modify_labels(&ctx.google, &args.message_id, &unread, &[]).await?;
            EMAIL_MARKED_UNREAD
        };

        Ok(ToolOutput::Text(format!(
            "{}\n\n**Email:**\n• Subject: {}\n• From: {}\n• Date: {}",
            headline, email.subject, email.from, email.date
        )))
    }

    fn failure_label(&self) -> &str {
        "Error marking email"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LabelAction {
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManageLabelsArgs {
    message_id: String,
    action: LabelAction,
    label_names: Vec<String>,
}

/// `manageEmailLabels`
pub struct ManageLabelsTool;

#[async_trait]
impl Tool for ManageLabelsTool {
    fn name(&self) -> &str { "manageEmailLabels" }
    fn description(&self) -> &str { "Add or remove labels from an email" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": { "type": "string", "description": "Gmail message ID of the email" },
                "action": { "type": "string", "enum": ["add", "remove"], "description": "Whether to add or remove labels" },
                "labelNames": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of label names to add or remove (e.g., ['Important', 'Work'])"
                }
            },
            "required": ["messageId", "action", "labelNames"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ManageLabelsArgs = parse_args(self.name(), params)?;
        let available = gmail::list_labels(&ctx.google).await?;

        let mut found: Vec<&GmailLabel> = Vec::new();
        let mut missing: Vec<&str> = Vec::new();
        for wanted in &args.label_names {
            match available.iter().find(|l| l.name.to_lowercase() == wanted.to_lowercase()) {
                Some(label) => found.push(label),
                None => missing.push(wanted),
            }
        }

        if found.is_empty() {
            let names: Vec<&str> = available.iter().take(10).map(|l| l.name.as_str()).collect();
            return Ok(ToolOutput::Text(format!(
                "❌ None of the specified labels were found: {}\n\nAvailable labels: {}{}",
                args.label_names.join(", "),
                names.join(", "),
                if available.len() > 10 { "..." } else { "" }
            )));
        }

        let email = gmail::get_email_content(&ctx.google, &args.message_id).await?;
        let ids: Vec<String> = found.iter().map(|l| l.id.clone()).collect();
        let (verb, heading) = match args.action {
            LabelAction::Add => {
                gmail::modify_labels(&ctx.google, &args.message_id, &ids, &[]).await?;
                ("added to", "Added")
            }
            LabelAction::Remove => {
                gmail::modify_labels(&ctx.google, &args.message_id, &[], &ids).await?;
                ("removed from", "Removed")
            }
        };

        let names: Vec<&str> = found.iter().map(|l| l.name.as_str()).collect();
        let mut text = format!(
            "🏷️ Labels {} email successfully!\n\n**Email:**\n• Subject: {}\n• From: {}\n\n**Labels {}:** {}",
            verb, email.subject, email.from, heading, names.join(", ")
        );
        if !missing.is_empty() {
            text.push_str(&format!("\n\n⚠️ **Labels not found:** {}", missing.join(", ")));
        }
        Ok(ToolOutput::Text(text))
    }

    fn failure_label(&self) -> &str {
        "Error managing email labels"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListLabelsArgs {
    message_id: Option<String>,
}

/// `listEmailLabels`
pub struct ListLabelsTool;

impl ListLabelsTool {
    async fn labels_for_message(ctx: &ToolContext, id: &str, available: &[GmailLabel]) -> Result<String> {
        let label_ids = gmail::message_label_ids(&ctx.google, id).await?;
        let names: Vec<&str> = label_ids.iter()
            .filter_map(|id| available.iter().find(|l| &l.id == id))
            .map(|l| l.name.as_str())
            .collect();
        let email = gmail::get_email_content(&ctx.google, id).await?;

        Ok(format!(
            "\n\n**Labels for Email:**\n• Subject: {}\n• From: {}\n• Labels: {}",
            email.subject,
            email.from,
            if names.is_empty() { "No labels".to_string() } else { names.join(", ") }
        ))
    }
}

#[async_trait]
impl Tool for ListLabelsTool {
    fn name(&self) -> &str { "listEmailLabels" }

    fn description(&self) -> &str {
        "List all available Gmail labels and get the labels for a specific email"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": { "type": "string", "description": "Optional: Gmail message ID to get labels for a specific email" }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ListLabelsArgs = parse_args(self.name(), params)?;
        let available = gmail::list_labels(&ctx.google).await?;

        let bullets = |kind: &str| -> String {
            available.iter()
                .filter(|l| l.kind == kind)
                .map(|l| format!("• {}", l.name))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut text = String::from("🏷️ **Available Gmail Labels:**\n\n");
        let custom = bullets("user");
        if !custom.is_empty() {
            text.push_str(&format!("**Custom Labels:**\n{}\n\n", custom));
        }
        text.push_str(&format!("**System Labels:**\n{}", bullets("system")));

        if let Some(id) = args.message_id.as_deref().filter(|id| !id.is_empty()) {
            match Self::labels_for_message(ctx, id, &available).await {
                Ok(section) => text.push_str(&section),
                Err(e) => {
                    tracing::warn!("Could not read labels of {}: {}", id, e);
                    text.push_str("\n\n❌ Could not retrieve labels for the specified email.");
                }
            }
        }
        Ok(ToolOutput::Text(text))
    }

    fn failure_label(&self) -> &str {
        "Error listing email labels"
    }
}
