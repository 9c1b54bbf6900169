//! Tools module - agent capabilities
//!
//! Tools are the only way the model can act on the user's Gmail, Calendar and
//! scheduled tasks. Each tool gets an explicit [`ToolContext`].

mod registry;
mod calendar;
mod gmail;
mod schedule;

pub use registry::{ToolDefinition, ToolRegistry};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::google::calendar::CalendarEvent;
use crate::google::gmail::EmailContent;
use crate::google::GoogleApi;
use crate::scheduler::Scheduler;
use crate::Result;

/// Everything a tool may reach
#[derive(Clone)]
pub struct ToolContext {
    pub google: GoogleApi,
    pub scheduler: Scheduler,
}

/// Output flavour of the read tools that have both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Structured payload for rich rendering, registered under the primary name
    Rendered,
    /// Markdown-ish text, registered under `<name>Original`
    Text,
}

impl OutputMode {
    pub fn tool_name(self, base: &str) -> String {
        match self {
            OutputMode::Rendered => base.to_string(),
            OutputMode::Text => format!("{}Original", base),
        }
    }
}

/// Structured tool result, dispatched on its `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiPayload {
    Emails {
        emails: Vec<EmailContent>,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        compact: bool,
    },
    Events {
        events: Vec<CalendarEvent>,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(rename = "groupByDate", default, skip_serializing_if = "std::ops::Not::not")]
        group_by_date: bool,
    },
    EmailDetail {
        email: EmailContent,
        title: String,
    },
    EventDetail {
        event: CalendarEvent,
        title: String,
    },
    Error {
        message: String,
    },
}

impl UiPayload {
    /// `None` when the value carries no recognised `type` tag.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.get("type")?.as_str()?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// What a tool hands back to the conversation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Rendered(UiPayload),
}

impl ToolOutput {
    /// Value stored as the invocation result and sent to the model.
    pub fn into_value(self) -> Value {
        match self {
            ToolOutput::Text(text) => Value::String(text),
            ToolOutput::Rendered(payload) => serde_json::to_value(payload)
                .unwrap_or_else(|e| Value::String(format!("Error: could not encode result: {}", e))),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolOutput::Text(text) => Some(text),
            ToolOutput::Rendered(_) => None,
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute with arguments that already passed schema validation.
    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput>;

    /// Prefix for failure messages, e.g. "Error fetching emails".
    fn failure_label(&self) -> &str {
        "Error"
    }

    /// Turn an execution failure into the result the model sees.
    fn render_error(&self, err: &Error) -> ToolOutput {
        ToolOutput::Text(failure_text(self.failure_label(), err))
    }

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// User-facing failure text: reconnect guidance for auth failures,
/// re-grant guidance for scope failures, otherwise the labelled error.
pub fn failure_text(label: &str, err: &Error) -> String {
    err.user_guidance()
        .unwrap_or_else(|| format!("❌ {}: {}", label, err))
}

/// Same as [`failure_text`] for the structured tier, which carries no emoji.
pub fn failure_payload(label: &str, err: &Error) -> UiPayload {
    let message = if err.is_auth() {
        crate::error::RECONNECT_PROMPT.to_string()
    } else if err.is_permission() {
        crate::error::INSUFFICIENT_PERMISSIONS.to_string()
    } else {
        format!("{}: {}", label, err)
    };
    UiPayload::Error { message }
}

/// Failure output in the tier a tool was registered with.
pub fn failure_output(mode: OutputMode, label: &str, err: &Error) -> ToolOutput {
    match mode {
        OutputMode::Rendered => ToolOutput::Rendered(failure_payload(label, err)),
        OutputMode::Text => ToolOutput::Text(failure_text(label, err)),
    }
}

/// Deserialize validated arguments into the tool's typed form.
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::ToolValidation {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::google::test_support::{connected_api, disconnected_api};
    use wiremock::MockServer;

    pub fn context(server: &MockServer) -> ToolContext {
        let (scheduler, _rx) = Scheduler::new(None);
        ToolContext { google: connected_api(server), scheduler }
    }

    pub fn disconnected_context(server: &MockServer) -> ToolContext {
        let (scheduler, _rx) = Scheduler::new(None);
        ToolContext { google: disconnected_api(server), scheduler }
    }

    /// Dummy tool for testing
    pub struct DummyTool {
        pub name: String,
        pub result: String,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str { &self.name }
        fn description(&self) -> &str { "Dummy tool for testing" }
        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "value": { "type": "string" } },
                "required": ["value"]
            })
        }

        async fn execute(&self, _ctx: &ToolContext, _params: Value) -> Result<ToolOutput> {
            Ok(ToolOutput::Text(self.result.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_type_is_not_rendered() {
        assert!(UiPayload::from_value(&json!({"type": "weather", "temp": 21})).is_none());
        assert!(UiPayload::from_value(&json!({"emails": []})).is_none());
        assert!(UiPayload::from_value(&json!("plain text")).is_none());
    }

    #[test]
    fn test_known_type_is_rendered() {
        let value = json!({"type": "emails", "emails": [], "title": "Latest Emails", "message": "No emails found in inbox."});
        match UiPayload::from_value(&value) {
            Some(UiPayload::Emails { title, message, .. }) => {
                assert_eq!(title, "Latest Emails");
                assert_eq!(message.as_deref(), Some("No emails found in inbox."));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        let error = UiPayload::from_value(&json!({"type": "error", "message": "boom"}));
        assert_eq!(error, Some(UiPayload::Error { message: "boom".to_string() }));
    }

    #[test]
    fn test_output_mode_names() {
        assert_eq!(OutputMode::Rendered.tool_name("getLatestEmails"), "getLatestEmails");
        assert_eq!(OutputMode::Text.tool_name("getLatestEmails"), "getLatestEmailsOriginal");
    }

    #[test]
    fn test_failure_text_variants() {
        let unauthorized = Error::Api { status: 401, body: "bad".to_string() };
        assert_eq!(failure_text("Error sending email", &unauthorized), crate::error::RECONNECT_PROMPT);

        let other = Error::Api { status: 500, body: "oops".to_string() };
        assert_eq!(
            failure_text("Error sending email", &other),
            "❌ Error sending email: Google API error: 500 oops"
        );

        assert_eq!(
            failure_payload("Error fetching emails", &other),
            UiPayload::Error { message: "Error fetching emails: Google API error: 500 oops".to_string() }
        );
    }
}
