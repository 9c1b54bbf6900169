//! Shortcuts that act on the newest inbox message

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::google::gmail;
use crate::tools::{failure_text, parse_args, Tool, ToolContext, ToolOutput};
use crate::Result;

use super::management::{delete_email, delete_failure, permanent_property};
use super::reading::email_details_text;
use super::writing::{forward_email, forward_target_properties, reply_properties, reply_to_email, ForwardTarget};

/// Id of the newest inbox message, or the tool's own "nothing there" text.
async fn latest_or(ctx: &ToolContext, empty: &str) -> Result<std::result::Result<String, ToolOutput>> {
    match gmail::latest_inbox_message_id(&ctx.google).await {
        Ok(id) => Ok(Ok(id)),
        Err(Error::NoEmailsFound) => Ok(Err(ToolOutput::Text(empty.to_string()))),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Deserialize)]
struct DeleteLatestArgs {
    #[serde(default)]
    permanent: bool,
}

/// `deleteLatestEmail`
pub struct DeleteLatestEmailTool;

#[async_trait]
impl Tool for DeleteLatestEmailTool {
    fn name(&self) -> &str { "deleteLatestEmail" }

    fn description(&self) -> &str {
        "Delete the most recent email from the inbox. Use this when user says 'delete my latest email' or 'delete the most recent email'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "permanent": permanent_property() }
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: DeleteLatestArgs = parse_args(self.name(), params)?;
        let id = match latest_or(ctx, "❌ No emails found in inbox to delete.").await? {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        Ok(delete_email(ctx, &id, args.permanent)
            .await
            .unwrap_or_else(|e| delete_failure("Error deleting email", &e)))
    }

    fn failure_label(&self) -> &str {
        "Error deleting latest email"
    }
}

/// `getLatestEmailDetails`
pub struct LatestEmailDetailsTool;

#[async_trait]
impl Tool for LatestEmailDetailsTool {
    fn name(&self) -> &str { "getLatestEmailDetails" }

    fn description(&self) -> &str {
        "Get full details of the most recent email from the inbox. Use this when user says 'get details of my latest email' or 'show me details of that email' after listing emails."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _params: Value) -> Result<ToolOutput> {
        let id = match latest_or(ctx, "❌ No emails found in inbox.").await? {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        Ok(email_details_text(ctx, &id)
            .await
            .unwrap_or_else(|e| ToolOutput::Text(failure_text("Error fetching email details", &e))))
    }

    fn failure_label(&self) -> &str {
        "Error getting latest email details"
    }
}

/// `forwardLatestEmail`
pub struct ForwardLatestEmailTool;

#[async_trait]
impl Tool for ForwardLatestEmailTool {
    fn name(&self) -> &str { "forwardLatestEmail" }

    fn description(&self) -> &str {
        "Forward the most recent email from the inbox. Use this when user says 'forward my latest email' or 'forward the most recent email'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": forward_target_properties(),
            "required": ["to"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let target: ForwardTarget = parse_args(self.name(), params)?;
        let id = match latest_or(ctx, "❌ No emails found in inbox to forward.").await? {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        Ok(forward_email(ctx, &id, &target)
            .await
            .unwrap_or_else(|e| ToolOutput::Text(failure_text("Error forwarding email", &e))))
    }

    fn failure_label(&self) -> &str {
        "Error forwarding latest email"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyLatestArgs {
    body: String,
    #[serde(default)]
    reply_all: bool,
}

/// `replyToLatestEmail`
pub struct ReplyLatestEmailTool;

#[async_trait]
impl Tool for ReplyLatestEmailTool {
    fn name(&self) -> &str { "replyToLatestEmail" }

    fn description(&self) -> &str {
        "Reply to the most recent email from the inbox. Use this when user says 'reply to my latest email' or 'reply to the most recent email'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": reply_properties(),
            "required": ["body"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ReplyLatestArgs = parse_args(self.name(), params)?;
        let id = match latest_or(ctx, "❌ No emails found in inbox to reply to.").await? {
            Ok(id) => id,
            Err(output) => return Ok(output),
        };
        Ok(reply_to_email(ctx, &id, &args.body, args.reply_all)
            .await
            .unwrap_or_else(|e| ToolOutput::Text(failure_text("Error replying to email", &e))))
    }

    fn failure_label(&self) -> &str {
        "Error replying to latest email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RECONNECT_PROMPT;
    use crate::tools::test_support::context;
    use crate::tools::ToolRegistry;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_empty_inbox(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("maxResults", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_delete_latest_on_empty_inbox_touches_nothing() {
        let server = MockServer::start().await;
        mount_empty_inbox(&server).await;
        Mock::given(method("POST"))
            .and(path_regex(r"/trash$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let registry = ToolRegistry::new_with_defaults();
        let output = registry
            .execute(&context(&server), "deleteLatestEmail", json!({"permanent": true}))
            .await
            .unwrap();
        assert_eq!(output.as_text(), Some("❌ No emails found in inbox to delete."));
    }

    #[tokio::test]
    async fn test_empty_inbox_messages_differ_per_tool() {
        let server = MockServer::start().await;
        mount_empty_inbox(&server).await;
        let ctx = context(&server);

        let details = LatestEmailDetailsTool.execute(&ctx, json!({})).await.unwrap();
        assert_eq!(details.as_text(), Some("❌ No emails found in inbox."));

        let forward = ForwardLatestEmailTool.execute(&ctx, json!({"to": "x@example.com"})).await.unwrap();
        assert_eq!(forward.as_text(), Some("❌ No emails found in inbox to forward."));

        let reply = ReplyLatestEmailTool.execute(&ctx, json!({"body": "ok"})).await.unwrap();
        assert_eq!(reply.as_text(), Some("❌ No emails found in inbox to reply to."));
    }

    #[tokio::test]
    async fn test_latest_details_reads_newest_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": [{"id": "new-1"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/new-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new-1",
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [{"name": "Subject", "value": "Fresh"}, {"name": "From", "value": "a@example.com"}]
                }
            })))
            .mount(&server)
            .await;

        let output = LatestEmailDetailsTool.execute(&context(&server), json!({})).await.unwrap();
        assert!(output.as_text().unwrap().starts_with("**Email Details:**\n\n**Subject:** Fresh"));
    }

    #[tokio::test]
    async fn test_latest_listing_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let registry = ToolRegistry::new_with_defaults();
        let output = registry.execute(&context(&server), "deleteLatestEmail", json!({})).await.unwrap();
        assert_eq!(output.as_text(), Some(RECONNECT_PROMPT));
    }
}
