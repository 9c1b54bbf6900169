//! Tool registry - validates arguments and dispatches tool calls

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

use super::calendar::{
    CreateEventTool, DeleteEventTool, EventDetailsTool, EventListKind, EventListTool,
    QuickMeetingTool, SearchEventsTool, UpdateEventTool,
};
use super::gmail::{
    ComposeEmailTool, DeleteEmailTool, DeleteLatestEmailTool, EmailDetailsTool, EmailListKind,
    EmailListTool, ForwardEmailTool, ForwardLatestEmailTool, LatestEmailDetailsTool,
    ListLabelsTool, ManageLabelsTool, MarkEmailTool, ReplyLatestEmailTool, ReplyToEmailTool,
    SearchEmailsTool, UnreadCountTool,
};
use super::schedule::{CancelScheduledTaskTool, GetScheduledTasksTool, ScheduleTaskTool};
use super::{OutputMode, Tool, ToolContext, ToolOutput};

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct Entry {
    tool: Box<dyn Tool>,
    validator: Option<jsonschema::Validator>,
}

/// Registered tools plus the set that needs user approval before running
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
    requiring_confirmation: HashSet<String>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            requiring_confirmation: HashSet::new(),
        }
    }

    /// Create a registry with every Gmail, Calendar and scheduling tool
    pub fn new_with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(ScheduleTaskTool);
        registry.register(GetScheduledTasksTool);
        registry.register(CancelScheduledTaskTool);

        // Read tools exist in both tiers
        for mode in [OutputMode::Rendered, OutputMode::Text] {
            registry.register(EmailListTool::new(EmailListKind::Latest, mode));
            registry.register(EmailListTool::new(EmailListKind::All, mode));
            registry.register(EmailListTool::new(EmailListKind::Summary, mode));
            registry.register(SearchEmailsTool::new(mode));
            registry.register(EmailDetailsTool::new(mode));

            registry.register(EventListTool::new(EventListKind::Upcoming, mode));
            registry.register(EventListTool::new(EventListKind::Today, mode));
            registry.register(SearchEventsTool::new(mode));
            registry.register(EventDetailsTool::new(mode));
        }

        registry.register(LatestEmailDetailsTool);
        registry.register(UnreadCountTool);

        registry.register(ComposeEmailTool);
        registry.register(ForwardEmailTool);
        registry.register(ForwardLatestEmailTool);
        registry.register(ReplyToEmailTool);
        registry.register(ReplyLatestEmailTool);

        registry.register(DeleteEmailTool);
        registry.register(DeleteLatestEmailTool);
        registry.register(MarkEmailTool);
        registry.register(ManageLabelsTool);
        registry.register(ListLabelsTool);

        registry.register(CreateEventTool);
        registry.register(QuickMeetingTool);
        registry.register(UpdateEventTool);
        registry.register(DeleteEventTool);

        registry
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.parameters();
        let validator = match jsonschema::draft202012::new(&schema) {
            Ok(validator) => Some(validator),
            Err(e) => {
                tracing::warn!("Schema for {} does not compile, skipping validation: {}", tool.name(), e);
                None
            }
        };
        self.tools.insert(tool.name().to_string(), Entry { tool: Box::new(tool), validator });
    }

    /// Mark tools as requiring user approval. Unknown names are kept so the
    /// policy still applies if the tool is registered later.
    pub fn require_confirmation<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.tools.contains_key(&name) {
                tracing::warn!("Confirmation policy names unknown tool {}", name);
            }
            self.requiring_confirmation.insert(name);
        }
    }

    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.requiring_confirmation.contains(name)
    }

    /// Get tool definitions for LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values()
            .map(|e| e.tool.to_definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Check arguments against the tool's schema without running it.
    pub fn validate(&self, name: &str, params: &Value) -> Result<()> {
        let entry = self.tools.get(name)
            .ok_or_else(|| Error::NotFound(format!("tool {}", name)))?;

        if let Some(validator) = &entry.validator {
            let problems: Vec<String> = validator.iter_errors(params)
                .map(|e| e.to_string())
                .collect();
            if !problems.is_empty() {
                return Err(Error::ToolValidation {
                    tool: name.to_string(),
                    reason: problems.join("; "),
                });
            }
        }
        Ok(())
    }

    /// Validate then execute a tool by name.
    ///
    /// Validation failures and unknown tools are returned as errors before
    /// anything external is touched. Failures inside the tool are rendered
    /// into its output.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, params: Value) -> Result<ToolOutput> {
        self.validate(name, &params)?;
        let entry = &self.tools[name];

        tracing::info!("Executing tool {}", name);
        match entry.tool.execute(ctx, params).await {
            Ok(output) => Ok(output),
            Err(e @ Error::ToolValidation { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                Ok(entry.tool.render_error(&e))
            }
        }
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
