//! Listing, searching and reading messages

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::google::gmail::{self, EmailContent, MessageQuery};
use crate::tools::{failure_output, parse_args, OutputMode, Tool, ToolContext, ToolOutput, UiPayload};
use crate::Result;

use super::{
    count_schema, default_email_count, format_email_for_list, format_email_for_summary,
    DEFAULT_EMAIL_COUNT, MAX_EMAIL_COUNT, MAX_SUMMARIZE_COUNT,
};

#[derive(Debug, Deserialize)]
struct CountArgs {
    #[serde(default = "default_email_count")]
    count: u32,
}

/// The three inbox listings that differ only in query and wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailListKind {
    /// Inbox, newest first
    Latest,
    /// Everything including sent mail
    All,
    /// Inbox, compact summary
    Summary,
}

impl EmailListKind {
    fn base_name(self) -> &'static str {
        match self {
            EmailListKind::Latest => "getLatestEmails",
            EmailListKind::All => "getAllEmails",
            EmailListKind::Summary => "summarizeEmails",
        }
    }

    fn query(self) -> MessageQuery {
        match self {
            EmailListKind::Latest | EmailListKind::Summary => MessageQuery::Inbox,
            EmailListKind::All => MessageQuery::All,
        }
    }

    fn max_count(self) -> u32 {
        match self {
            EmailListKind::Summary => MAX_SUMMARIZE_COUNT,
            _ => MAX_EMAIL_COUNT,
        }
    }

    fn title(self) -> &'static str {
        match self {
            EmailListKind::Latest => "Latest Emails",
            EmailListKind::All => "All Recent Emails",
            EmailListKind::Summary => "Email Summary",
        }
    }

    fn empty_message(self) -> &'static str {
        match self {
            EmailListKind::Latest => "No emails found in inbox.",
            EmailListKind::All => "No emails found.",
            EmailListKind::Summary => "No emails found to summarize.",
        }
    }
}

/// `getLatestEmails`, `getAllEmails` and `summarizeEmails` in either tier
pub struct EmailListTool {
    kind: EmailListKind,
    mode: OutputMode,
    name: String,
    description: String,
}

impl EmailListTool {
    pub fn new(kind: EmailListKind, mode: OutputMode) -> Self {
        let base = match kind {
            EmailListKind::Latest => "Get the latest emails from Gmail inbox",
            EmailListKind::All => "Get recent emails including both received and sent emails",
            EmailListKind::Summary => "Get a summary of recent emails with key information (excludes sent emails)",
        };
        let description = match mode {
            OutputMode::Rendered => format!("{} with structured data for UI rendering", base),
            OutputMode::Text => base.to_string(),
        };
        Self { kind, mode, name: mode.tool_name(kind.base_name()), description }
    }

    fn render(&self, emails: Vec<EmailContent>) -> ToolOutput {
        match self.mode {
            OutputMode::Rendered => {
                let subtitle = match self.kind {
                    EmailListKind::Latest => format!("Found {} recent emails from your inbox", emails.len()),
                    EmailListKind::All => format!("Found {} recent emails (including sent)", emails.len()),
                    EmailListKind::Summary => format!("Summary of {} recent emails", emails.len()),
                };
                ToolOutput::Rendered(UiPayload::Emails {
                    emails,
                    title: self.kind.title().to_string(),
                    subtitle: Some(subtitle),
                    message: None,
                    query: None,
                    compact: self.kind == EmailListKind::Summary,
                })
            }
            OutputMode::Text if emails.is_empty() => ToolOutput::Text(match self.kind {
                EmailListKind::Summary => "No emails could be retrieved for summarization.".to_string(),
                _ => "No emails could be retrieved.".to_string(),
            }),
            OutputMode::Text => {
                let text = match self.kind {
                    EmailListKind::Latest => format!(
                        "Found {} recent emails:\n\n{}",
                        emails.len(),
                        list(&emails)
                    ),
                    EmailListKind::All => format!(
                        "Found {} recent emails (including sent):\n\n{}",
                        emails.len(),
                        list(&emails)
                    ),
                    EmailListKind::Summary => format!(
                        "**Summary of {} Recent Emails:**\n\n{}",
                        emails.len(),
                        emails.iter().enumerate()
                            .map(|(i, e)| format_email_for_summary(e, i))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ),
                };
                ToolOutput::Text(text)
            }
        }
    }
}

fn list(emails: &[EmailContent]) -> String {
    emails.iter().enumerate()
        .map(|(i, e)| format_email_for_list(e, i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for EmailListTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { &self.description }

    fn parameters(&self) -> Value {
        let what = match self.kind {
            EmailListKind::Summary => "Number of recent emails to summarize",
            _ => "Number of emails to retrieve",
        };
        json!({
            "type": "object",
            "properties": {
                "count": count_schema(self.kind.max_count(), DEFAULT_EMAIL_COUNT, what)
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: CountArgs = parse_args(&self.name, params)?;

        let ids = gmail::list_message_ids(&ctx.google, &self.kind.query(), args.count).await?;
        if ids.is_empty() {
            return Ok(match self.mode {
                OutputMode::Rendered => ToolOutput::Rendered(UiPayload::Emails {
                    emails: Vec::new(),
                    title: self.kind.title().to_string(),
                    subtitle: None,
                    message: Some(self.kind.empty_message().to_string()),
                    query: None,
                    compact: false,
                }),
                OutputMode::Text => ToolOutput::Text(self.kind.empty_message().to_string()),
            });
        }

        let ids: Vec<String> = ids.into_iter().take(args.count as usize).collect();
        let emails = gmail::fetch_emails(&ctx.google, &ids).await;
        Ok(self.render(emails))
    }

    fn failure_label(&self) -> &str {
        match self.kind {
            EmailListKind::Summary => "Error summarizing emails",
            _ => "Error fetching emails",
        }
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_search_count")]
    count: u32,
}

fn default_search_count() -> u32 {
    10
}

/// `searchEmails`
pub struct SearchEmailsTool {
    mode: OutputMode,
    name: String,
}

impl SearchEmailsTool {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode, name: mode.tool_name("searchEmails") }
    }
}

#[async_trait]
impl Tool for SearchEmailsTool {
    fn name(&self) -> &str { &self.name }

    fn description(&self) -> &str {
        match self.mode {
            OutputMode::Rendered => "Search emails in Gmail with structured data for UI rendering",
            OutputMode::Text => "Search emails in Gmail by query (sender, subject, content, etc.)",
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Gmail search query (e.g., 'from:john@example.com', 'subject:meeting', 'after:2024/01/01')"
                },
                "count": count_schema(MAX_EMAIL_COUNT, default_search_count(), "Number of emails to retrieve")
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: SearchArgs = parse_args(&self.name, params)?;
        let query = MessageQuery::Search(args.query.clone());

        let ids: Vec<String> = gmail::list_message_ids(&ctx.google, &query, args.count)
            .await?
            .into_iter()
            .take(args.count as usize)
            .collect();
        let emails = gmail::fetch_emails(&ctx.google, &ids).await;

        Ok(match self.mode {
            OutputMode::Rendered => {
                let subtitle = if ids.is_empty() {
                    format!("No emails found matching \"{}\"", args.query)
                } else {
                    format!("Found {} emails matching \"{}\"", emails.len(), args.query)
                };
                ToolOutput::Rendered(UiPayload::Emails {
                    emails,
                    title: "Search Results".to_string(),
                    subtitle: Some(subtitle),
                    message: None,
                    query: Some(args.query),
                    compact: false,
                })
            }
            OutputMode::Text if ids.is_empty() => {
                ToolOutput::Text(format!("No emails found matching query: \"{}\"", args.query))
            }
            OutputMode::Text if emails.is_empty() => {
                ToolOutput::Text(format!("No emails could be retrieved for query: \"{}\"", args.query))
            }
            OutputMode::Text => ToolOutput::Text(format!(
                "Found {} emails matching \"{}\":\n\n{}",
                emails.len(),
                args.query,
                list(&emails)
            )),
        })
    }

    fn failure_label(&self) -> &str {
        "Error searching emails"
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MessageIdArgs {
    pub message_id: String,
}

/// `getEmailDetails`
pub struct EmailDetailsTool {
    mode: OutputMode,
    name: String,
}

impl EmailDetailsTool {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode, name: mode.tool_name("getEmailDetails") }
    }
}

/// Full message as text.
pub(super) async fn email_details_text(ctx: &ToolContext, id: &str) -> Result<ToolOutput> {
    let email = gmail::get_email_content(&ctx.google, id).await?;
    Ok(ToolOutput::Text(format!(
        "**Email Details:**\n\n**Subject:** {}\n**From:** {}\n**Date:** {}\n\n**Content:**\n{}",
        email.subject, email.from, email.date, email.body
    )))
}

#[async_trait]
impl Tool for EmailDetailsTool {
    fn name(&self) -> &str { &self.name }

    fn description(&self) -> &str {
        match self.mode {
            OutputMode::Rendered => "Get full details of a specific email with structured data for UI rendering",
            OutputMode::Text => "Get full details of a specific email including complete content",
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "messageId": { "type": "string", "description": "Gmail message ID" }
            },
            "required": ["messageId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: MessageIdArgs = parse_args(&self.name, params)?;
        match self.mode {
            OutputMode::Text => email_details_text(ctx, &args.message_id).await,
            OutputMode::Rendered => {
                let email = gmail::get_email_content(&ctx.google, &args.message_id).await?;
                Ok(ToolOutput::Rendered(UiPayload::EmailDetail {
                    email,
                    title: "Email Details".to_string(),
                }))
            }
        }
    }

    fn failure_label(&self) -> &str {
        "Error fetching email details"
    }

    fn render_error(&self, err: &Error) -> ToolOutput {
        failure_output(self.mode, self.failure_label(), err)
    }
}

/// `getUnreadEmailCount`
pub struct UnreadCountTool;

#[async_trait]
impl Tool for UnreadCountTool {
    fn name(&self) -> &str { "getUnreadEmailCount" }
    fn description(&self) -> &str { "Get the count of unread emails in Gmail inbox" }
    fn parameters(&self) -> Value { json!({"type": "object", "properties": {}}) }

    async fn execute(&self, ctx: &ToolContext, _params: Value) -> Result<ToolOutput> {
        let unread = gmail::unread_count(&ctx.google).await?;
        Ok(ToolOutput::Text(match unread {
            0 => "You have no unread emails.".to_string(),
            1 => "You have 1 unread email.".to_string(),
            n => format!("You have {} unread emails.", n),
        }))
    }

    fn failure_label(&self) -> &str {
        "Error fetching unread email count"
    }
}
