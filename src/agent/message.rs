//! Message types for the conversation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::invocation::{ToolCallId, ToolInvocation};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One ordered piece of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    ToolInvocation { invocation: ToolInvocation },
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub parts: Vec<Part>,
}

impl Message {
    fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            created_at: Utc::now(),
            parts,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { text: text.into() }])
    }

    /// Create an empty assistant message that a step fills in
    pub fn assistant() -> Self {
        Self::new(Role::Assistant, Vec::new())
    }

    /// Append streamed text, merging with a trailing text part.
    pub fn push_text(&mut self, delta: &str) {
        if let Some(Part::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(Part::Text { text: delta.to_string() });
        }
    }

    pub fn push_invocation(&mut self, invocation: ToolInvocation) {
        self.parts.push(Part::ToolInvocation { invocation });
    }

    /// All text parts joined.
    pub fn text(&self) -> String {
        self.parts.iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::ToolInvocation { .. } => None,
            })
            .collect()
    }

    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolInvocation { invocation } => Some(invocation),
            Part::Text { .. } => None,
        })
    }

    pub fn invocations_mut(&mut self) -> impl Iterator<Item = &mut ToolInvocation> {
        self.parts.iter_mut().filter_map(|p| match p {
            Part::ToolInvocation { invocation } => Some(invocation),
            Part::Text { .. } => None,
        })
    }

    pub fn invocation_mut(&mut self, id: &ToolCallId) -> Option<&mut ToolInvocation> {
        self.invocations_mut().find(|inv| &inv.tool_call_id == id)
    }

    /// Drop invocations whose arguments never finished streaming.
    pub fn discard_partial_invocations(&mut self) -> usize {
        let before = self.parts.len();
        self.parts.retain(|p| !matches!(p, Part::ToolInvocation { invocation } if invocation.is_partial()));
        before - self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Text { text } if text.is_empty()))
    }
}
