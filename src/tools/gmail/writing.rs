//! Sending, forwarding and replying

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::google::gmail::{self, OutgoingEmail};
use crate::tools::{parse_args, Tool, ToolContext, ToolOutput};
use crate::Result;

use super::{EMAIL_FORWARDED, EMAIL_SENT, REPLY_SENT};

fn optional_line(label: &str, value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .map(|v| format!("{}{}\n", label, v))
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ComposeArgs {
    to: String,
    subject: String,
    body: String,
    cc: Option<String>,
    bcc: Option<String>,
}

/// `composeAndSendEmail`
pub struct ComposeEmailTool;

#[async_trait]
impl Tool for ComposeEmailTool {
    fn name(&self) -> &str { "composeAndSendEmail" }
    fn description(&self) -> &str { "Compose and send a new email" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Recipient email address (can be multiple separated by commas)" },
                "subject": { "type": "string", "description": "Email subject line" },
                "body": { "type": "string", "description": "Email body content (can include HTML)" },
                "cc": { "type": "string", "description": "CC recipients (optional, comma-separated)" },
                "bcc": { "type": "string", "description": "BCC recipients (optional, comma-separated)" }
            },
            "required": ["to", "subject", "body"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ComposeArgs = parse_args(self.name(), params)?;
        let email = OutgoingEmail {
            to: args.to.clone(),
            cc: args.cc.clone(),
            bcc: args.bcc.clone(),
            subject: args.subject.clone(),
            body: args.body,
            ..Default::default()
        };
        let id = gmail::send_message(&ctx.google, &email, None).await?;

        Ok(ToolOutput::Text(format!(
            "{}\n\n**Details:**\n• To: {}\n• Subject: {}\n{}{}• Message ID: {}",
            EMAIL_SENT,
            args.to,
            args.subject,
            optional_line("• CC: ", args.cc.as_deref()),
            optional_line("• BCC: ", args.bcc.as_deref()),
            id
        )))
    }

    fn failure_label(&self) -> &str {
        "Error sending email"
    }
}

/// Recipients for a forward
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ForwardTarget {
    pub to: String,
    pub additional_message: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
}

pub(super) fn forward_target_properties() -> serde_json::Map<String, Value> {
    let properties = json!({
        "to": { "type": "string", "description": "Recipient email address (can be multiple separated by commas)" },
        "additionalMessage": { "type": "string", "description": "Additional message to add before the forwarded content" },
        "cc": { "type": "string", "description": "CC recipients (optional, comma-separated)" },
        "bcc": { "type": "string", "description": "BCC recipients (optional, comma-separated)" }
    });
    match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Forward message `id` to `target`.
pub(super) async fn forward_email(ctx: &ToolContext, id: &str, target: &ForwardTarget) -> Result<ToolOutput> {
    let original = gmail::get_email_content(&ctx.google, id).await?;

    let email = OutgoingEmail {
        to: target.to.clone(),
        cc: target.cc.clone(),
        bcc: target.bcc.clone(),
        subject: gmail::prefixed_subject("Fwd:", &original.subject),
        body: gmail::forward_body(&original, target.additional_message.as_deref()),
        ..Default::default()
    };
    gmail::send_message(&ctx.google, &email, None).await?;

    Ok(ToolOutput::Text(format!(
        "{}\n\n**Original Email:**\n• Subject: {}\n• From: {}\n\n**Forwarded To:** {}\n{}{}",
        EMAIL_FORWARDED,
        original.subject,
        original.from,
        target.to,
        optional_line("**CC:** ", target.cc.as_deref()),
        optional_line("**BCC:** ", target.bcc.as_deref()),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForwardArgs {
    message_id: String,
    #[serde(flatten)]
    target: ForwardTarget,
}

/// `forwardEmail`
pub struct ForwardEmailTool;

#[async_trait]
impl Tool for ForwardEmailTool {
    fn name(&self) -> &str { "forwardEmail" }
    fn description(&self) -> &str { "Forward an existing email to new recipients" }

    fn parameters(&self) -> Value {
        let mut properties = forward_target_properties();
        properties.insert(
            "messageId".to_string(),
            json!({ "type": "string", "description": "Gmail message ID of the email to forward" }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": ["messageId", "to"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ForwardArgs = parse_args(self.name(), params)?;
        forward_email(ctx, &args.message_id, &args.target).await
    }

    fn failure_label(&self) -> &str {
        "Error forwarding email"
    }
}

/// Reply to message `id`, keeping it in the same thread.
pub(super) async fn reply_to_email(ctx: &ToolContext, id: &str, body: &str, reply_all: bool) -> Result<ToolOutput> {
    let message = gmail::get_message(&ctx.google, id).await?;
    let original = gmail::email_content(id, &message);
    let headers = gmail::reply_headers(&message, reply_all);

    let email = OutgoingEmail {
        to: headers.to.clone(),
        cc: headers.cc.clone(),
        bcc: None,
        subject: gmail::prefixed_subject("Re:", &original.subject),
        in_reply_to: headers.in_reply_to,
        references: headers.references,
        body: body.to_string(),
    };
    let sent_id = gmail::send_message(&ctx.google, &email, message.thread_id.as_deref()).await?;

    Ok(ToolOutput::Text(format!(
        "{}\n\n**Original Email:**\n• Subject: {}\n• From: {}\n\n**Reply Details:**\n• To: {}\n{}• Reply Type: {}\n• Message ID: {}",
        REPLY_SENT,
        original.subject,
        original.from,
        headers.to,
        optional_line("• CC: ", headers.cc.as_deref()),
        if reply_all { "Reply All" } else { "Reply" },
        sent_id
    )))
}

pub(super) fn reply_properties() -> serde_json::Map<String, Value> {
    let properties = json!({
        "body": { "type": "string", "description": "Reply message content" },
        "replyAll": {
            "type": "boolean",
            "default": false,
            "description": "If true, reply to all recipients; if false, reply only to sender"
        }
    });
    match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyArgs {
    message_id: String,
    body: String,
    #[serde(default)]
    reply_all: bool,
}

/// `replyToEmail`
pub struct ReplyToEmailTool;

#[async_trait]
impl Tool for ReplyToEmailTool {
    fn name(&self) -> &str { "replyToEmail" }
    fn description(&self) -> &str { "Reply to an existing email, preserving the email thread" }

    fn parameters(&self) -> Value {
        let mut properties = reply_properties();
        properties.insert(
            "messageId".to_string(),
            json!({ "type": "string", "description": "Gmail message ID of the email to reply to" }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": ["messageId", "body"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ReplyArgs = parse_args(self.name(), params)?;
        reply_to_email(ctx, &args.message_id, &args.body, args.reply_all).await
    }

    fn failure_label(&self) -> &str {
        "Error replying to email"
    }
}
