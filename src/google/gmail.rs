//! Gmail message model and helpers

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Error;
use crate::Result;

use super::GoogleApi;

/// Gmail hands out base64url with or without padding depending on the part.
const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Flattened view of a message used by tools and renderers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub body: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

impl GmailMessage {
    /// First header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref()?.headers.iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailLabel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

/// Which messages a listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageQuery {
    Inbox,
    All,
    Search(String),
}

impl MessageQuery {
    fn endpoint(&self, max_results: u32) -> String {
        match self {
            MessageQuery::Inbox => format!("users/me/messages?labelIds=INBOX&maxResults={}", max_results),
            MessageQuery::All => format!("users/me/messages?maxResults={}", max_results),
            MessageQuery::Search(q) => format!(
                "users/me/messages?q={}&maxResults={}",
                urlencoding::encode(q),
                max_results
            ),
        }
    }
}

fn message_path(id: &str) -> String {
    format!("users/me/messages/{}", urlencoding::encode(id))
}

pub async fn get_message(api: &GoogleApi, id: &str) -> Result<GmailMessage> {
    let value = api.gmail_get(&format!("{}?format=full", message_path(id))).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetch one message and flatten its headers and body.
pub async fn get_email_content(api: &GoogleApi, id: &str) -> Result<EmailContent> {
    let message = get_message(api, id).await?;
    Ok(email_content(id, &message))
}

pub fn email_content(id: &str, message: &GmailMessage) -> EmailContent {
    let header = |name| message.header(name).unwrap_or_default().to_string();
    EmailContent {
        id: id.to_string(),
        subject: header("Subject"),
        from: header("From"),
        date: header("Date"),
        body: message.payload.as_ref().map(extract_text).unwrap_or_default().trim().to_string(),
        snippet: message.snippet.clone(),
    }
}

/// Message ids for a listing, newest first.
pub async fn list_message_ids(api: &GoogleApi, query: &MessageQuery, max_results: u32) -> Result<Vec<String>> {
    let value = api.gmail_get(&query.endpoint(max_results)).await?;
    let list: MessageList = serde_json::from_value(value)?;
    Ok(list.messages.into_iter().map(|m| m.id).collect())
}

/// Fetch messages one by one; individual failures are logged and skipped.
pub async fn fetch_emails(api: &GoogleApi, ids: &[String]) -> Vec<EmailContent> {
    let mut emails = Vec::with_capacity(ids.len());
    for id in ids {
        match get_email_content(api, id).await {
            Ok(email) => emails.push(email),
            Err(e) => tracing::warn!("Error fetching email {}: {}", id, e),
        }
    }
    emails
}

/// Id of the single most recent inbox message.
pub async fn latest_inbox_message_id(api: &GoogleApi) -> Result<String> {
    list_message_ids(api, &MessageQuery::Inbox, 1)
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NoEmailsFound)
}

pub async fn list_labels(api: &GoogleApi) -> Result<Vec<GmailLabel>> {
    let value = api.gmail_get("users/me/labels").await?;
    let list: LabelList = serde_json::from_value(value)?;
    Ok(list.labels)
}

pub async fn unread_count(api: &GoogleApi) -> Result<u64> {
    let value = api.gmail_get("users/me/labels/UNREAD").await?;
    Ok(value.get("messagesUnread").and_then(|v| v.as_u64()).unwrap_or(0))
}

/// Send an encoded message, optionally inside an existing thread.
pub async fn send_message(api: &GoogleApi, email: &OutgoingEmail, thread_id: Option<&str>) -> Result<String> {
    let mut body = json!({ "raw": email.encode() });
    if let Some(thread_id) = thread_id {
        body["threadId"] = json!(thread_id);
    }
    let response = api.gmail_post("users/me/messages/send", &body).await?;
    Ok(response.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string())
}

pub async fn trash_message(api: &GoogleApi, id: &str) -> Result<()> {
    api.gmail_post(&format!("{}/trash", message_path(id)), &json!({})).await?;
    Ok(())
}

pub async fn delete_message(api: &GoogleApi, id: &str) -> Result<()> {
    api.request(super::Service::Gmail, &message_path(id), reqwest::Method::DELETE, None).await?;
    Ok(())
}

pub async fn modify_labels(api: &GoogleApi, id: &str, add: &[String], remove: &[String]) -> Result<()> {
    let mut body = json!({});
    if !add.is_empty() {
        body["addLabelIds"] = json!(add);
    }
    if !remove.is_empty() {
        body["removeLabelIds"] = json!(remove);
    }
    api.gmail_post(&format!("{}/modify", message_path(id)), &body).await?;
    Ok(())
}

/// Label ids attached to a message.
pub async fn message_label_ids(api: &GoogleApi, id: &str) -> Result<Vec<String>> {
    let value = api.gmail_get(&format!("{}?format=minimal", message_path(id))).await?;
    let message: GmailMessage = serde_json::from_value(value)?;
    Ok(message.label_ids)
}

/// Walk MIME parts depth-first and collect readable text.
pub fn extract_text(part: &MessagePart) -> String {
    let data = part.body.as_ref().and_then(|b| b.data.as_deref());

    match (part.mime_type.as_str(), data) {
        ("text/plain", Some(data)) => decode_body(data),
        ("text/html", Some(data)) => html_to_text(&decode_body(data)),
        _ if !part.parts.is_empty() => {
            // multipart/alternative carries the same text twice
            if part.mime_type == "multipart/alternative" {
                if let Some(plain) = part.parts.iter().find(|p| p.mime_type == "text/plain") {
                    return extract_text(plain);
                }
            }
            part.parts.iter()
                .map(extract_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => String::new(),
    }
}

fn decode_body(data: &str) -> String {
    match GMAIL_BASE64.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Undecodable message body: {}", e);
            String::new()
        }
    }
}

/// Basic HTML to text conversion that keeps block boundaries as line breaks.
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();

    for tag in ["script", "style", "head"] {
        let open = format!("<{}", tag);
        let close = format!("</{}>", tag);
        while let Some(start) = text.to_ascii_lowercase().find(&open) {
            match text.to_ascii_lowercase()[start..].find(&close) {
                Some(end) => text.replace_range(start..start + end + close.len(), ""),
                None => break,
            }
        }
    }

    let mut result = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag.trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let block = matches!(name.as_str(), "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6");
                result.push(if block { '\n' } else { ' ' });
            }
            _ if in_tag => tag.push(c),
            _ => result.push(c),
        }
    }

    let decoded = result
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

/// An RFC 2822 message ready for `messages/send`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub body: String,
}

impl OutgoingEmail {
    pub fn to_rfc2822(&self) -> String {
        let mut message = String::new();
        message.push_str(&format!("To: {}\r\n", self.to));
        if let Some(cc) = self.cc.as_deref().filter(|s| !s.is_empty()) {
            message.push_str(&format!("Cc: {}\r\n", cc));
        }
        if let Some(bcc) = self.bcc.as_deref().filter(|s| !s.is_empty()) {
            message.push_str(&format!("Bcc: {}\r\n", bcc));
        }
        message.push_str(&format!("Subject: {}\r\n", self.subject));
        if let Some(id) = self.in_reply_to.as_deref().filter(|s| !s.is_empty()) {
            message.push_str(&format!("In-Reply-To: {}\r\n", id));
        }
        if let Some(refs) = self.references.as_deref().filter(|s| !s.is_empty()) {
            message.push_str(&format!("References: {}\r\n", refs));
        }
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/html; charset=UTF-8\r\n");
        message.push_str("\r\n");
        message.push_str(&self.body);
        message
    }

    /// base64url without padding, as `raw` expects.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_rfc2822())
    }
}

/// Prefix `subject` unless it already carries the prefix.
pub fn prefixed_subject(prefix: &str, subject: &str) -> String {
    if subject.starts_with(prefix) {
        subject.to_string()
    } else {
        format!("{} {}", prefix, subject)
    }
}

/// Quoted body for a forwarded message.
pub fn forward_body(original: &EmailContent, note: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(note) = note.filter(|n| !n.is_empty()) {
        body.push_str(note);
        body.push_str("\n\n");
    }
    body.push_str("---------- Forwarded message ---------\n");
    body.push_str(&format!("From: {}\n", original.from));
    body.push_str(&format!("Date: {}\n", original.date));
    body.push_str(&format!("Subject: {}\n\n", original.subject));
    body.push_str(&original.body);
    body
}

/// Recipients and threading headers for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHeaders {
    pub to: String,
    pub cc: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

pub fn reply_headers(original: &GmailMessage, reply_all: bool) -> ReplyHeaders {
    let to = original.header("Reply-To")
        .or_else(|| original.header("From"))
        .unwrap_or_default()
        .to_string();

    let message_id = original.header("Message-ID").map(str::to_string);
    let references = match (original.header("References"), message_id.as_deref()) {
        (Some(refs), Some(id)) => Some(format!("{} {}", refs, id)),
        (Some(refs), None) => Some(refs.to_string()),
        (None, id) => id.map(str::to_string),
    };

    let cc = if reply_all {
        let sender = extract_address(&to);
        let mut recipients: Vec<String> = original.header("To")
            .into_iter()
            .flat_map(split_addresses)
            .filter(|addr| sender.is_empty() || !addr.contains(sender))
            .collect();
        recipients.extend(original.header("Cc").into_iter().flat_map(split_addresses));
        (!recipients.is_empty()).then(|| recipients.join(", "))
    } else {
        None
    };

    ReplyHeaders { to, cc, in_reply_to: message_id, references }
}

fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `Ada <ada@example.com>` -> `ada@example.com`
pub fn extract_address(mailbox: &str) -> &str {
    match (mailbox.find('<'), mailbox.rfind('>')) {
        (Some(start), Some(end)) if start < end => mailbox[start + 1..end].trim(),
        _ => mailbox.trim(),
    }
}
