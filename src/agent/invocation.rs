//! Tool invocation lifecycle
//!
//! A model-issued tool call moves `partial-call -> call -> result` and never
//! backwards. Every move goes through a method here so a skipped or repeated
//! transition is an error instead of silent corruption.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// Result recorded when the user declines a confirmation.
pub const DECLINED_RESULT: &str = "Error: User denied access to tool execution";

/// Correlates a model-issued call with its result and any human decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCallId(String);

impl ToolCallId {
    /// Fresh id from a collision-resistant source.
    pub fn generate() -> Self {
        Self(format!("call_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ToolCallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InvocationState {
    /// Arguments are still streaming in.
    PartialCall {
        #[serde(rename = "argsText")]
        args_text: String,
    },
    /// Arguments are complete; waiting to run or for a decision.
    Call { args: Value },
    /// Terminal.
    Result { args: Value, result: Value },
}

impl InvocationState {
    pub fn name(&self) -> &'static str {
        match self {
            InvocationState::PartialCall { .. } => "partial-call",
            InvocationState::Call { .. } => "call",
            InvocationState::Result { .. } => "result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    #[serde(flatten)]
    state: InvocationState,
}

impl ToolInvocation {
    /// A call the model has just started emitting.
    pub fn start(tool_call_id: ToolCallId, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            state: InvocationState::PartialCall { args_text: String::new() },
        }
    }

    pub fn state(&self) -> &InvocationState {
        &self.state
    }

    fn invalid(&self, to: &'static str) -> Error {
        Error::InvalidTransition {
            id: self.tool_call_id.to_string(),
            from: self.state.name(),
            to,
        }
    }

    /// Append a streamed argument fragment.
    pub fn push_args(&mut self, fragment: &str) -> Result<()> {
        match &mut self.state {
            InvocationState::PartialCall { args_text } => {
                args_text.push_str(fragment);
                Ok(())
            }
            _ => Err(self.invalid("partial-call")),
        }
    }

    /// `partial-call -> call`.
    ///
    /// Empty argument text means `{}`. Text that is not JSON is kept as a
    /// string so schema validation reports it to the model.
    pub fn complete(&mut self) -> Result<()> {
        let InvocationState::PartialCall { args_text } = &self.state else {
            return Err(self.invalid("call"));
        };
        let args = if args_text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(args_text).unwrap_or_else(|_| Value::String(args_text.clone()))
        };
        self.state = InvocationState::Call { args };
        Ok(())
    }

    /// `call -> result`.
    pub fn resolve(&mut self, result: Value) -> Result<()> {
        let InvocationState::Call { args } = &self.state else {
            return Err(self.invalid("result"));
        };
        self.state = InvocationState::Result { args: args.clone(), result };
        Ok(())
    }

    /// Arguments once complete.
    pub fn args(&self) -> Option<&Value> {
        match &self.state {
            InvocationState::PartialCall { .. } => None,
            InvocationState::Call { args } | InvocationState::Result { args, .. } => Some(args),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            InvocationState::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.state, InvocationState::Call { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.state, InvocationState::PartialCall { .. })
    }
}

/// A human decision on a confirmation-gated call
#[derive(Debug, Clone, PartialEq)]
pub enum Approval {
    Yes,
    No,
    /// Any other value, recorded verbatim as the result.
    Custom(Value),
}

impl Approval {
    pub const YES: &'static str = "Yes, confirmed.";
    pub const NO: &'static str = "No, denied.";

    /// Interpret a value delivered over the out-of-band result channel.
    pub fn from_value(value: Value) -> Self {
        match value.as_str() {
            Some(Self::YES) => Approval::Yes,
            Some(Self::NO) => Approval::No,
            _ => Approval::Custom(value),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Approval::Yes => Value::String(Self::YES.to_string()),
            Approval::No => Value::String(Self::NO.to_string()),
            Approval::Custom(value) => value.clone(),
        }
    }
}
