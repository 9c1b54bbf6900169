//! Confirmation gate for side-effecting tool calls
//!
//! Runs before every model step. Each invocation still in `call` whose tool
//! needs approval is resolved from the decision supplied for its id: an
//! approval runs the tool, a denial records [`DECLINED_RESULT`], anything else
//! is recorded verbatim. Invocations without a decision are left untouched and
//! reported back so the caller can wait.

use std::collections::HashMap;

use serde_json::Value;

use crate::tools::{ToolContext, ToolRegistry};

use super::invocation::{Approval, ToolCallId, DECLINED_RESULT};
use super::message::Message;

/// A gated call waiting on the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub args: Value,
}

/// What one interceptor pass did.
#[derive(Debug, Default)]
pub struct Resolution {
    pub executed: Vec<ToolCallId>,
    pub declined: Vec<ToolCallId>,
    pub custom: Vec<ToolCallId>,
    pub waiting: Vec<ToolCallId>,
}

impl Resolution {
    pub fn resolved_any(&self) -> bool {
        !(self.executed.is_empty() && self.declined.is_empty() && self.custom.is_empty())
    }
}

/// Gated calls anywhere in the history that have no result yet.
pub fn pending_confirmations(registry: &ToolRegistry, messages: &[Message]) -> Vec<PendingCall> {
    messages.iter()
        .flat_map(|m| m.invocations())
        .filter(|inv| inv.is_call() && registry.requires_confirmation(&inv.tool_name))
        .map(|inv| PendingCall {
            tool_call_id: inv.tool_call_id.clone(),
            tool_name: inv.tool_name.clone(),
            args: inv.args().cloned().unwrap_or(Value::Null),
        })
        .collect()
}

/// Resolve every gated call that has a decision.
///
/// A decision is consumed when used, so a tool runs at most once per id.
pub async fn resolve_pending(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    messages: &mut [Message],
    decisions: &mut HashMap<ToolCallId, Approval>,
) -> Resolution {
    let mut resolution = Resolution::default();

    for message in messages.iter_mut() {
        for invocation in message.invocations_mut() {
            if !invocation.is_call() || !registry.requires_confirmation(&invocation.tool_name) {
                continue;
            }
            let id = invocation.tool_call_id.clone();
            let Some(decision) = decisions.remove(&id) else {
                tracing::debug!("Tool call {} ({}) is still waiting for a decision", id, invocation.tool_name);
                resolution.waiting.push(id);
                continue;
            };

            let result = match decision {
                Approval::Yes => {
                    tracing::info!("Approved {} ({}), executing", invocation.tool_name, id);
                    let args = invocation.args().cloned().unwrap_or_default();
                    let result = execute_call(registry, ctx, &invocation.tool_name, args).await;
                    resolution.executed.push(id.clone());
                    result
                }
                Approval::No => {
                    tracing::info!("Declined {} ({})", invocation.tool_name, id);
                    resolution.declined.push(id.clone());
                    Value::String(DECLINED_RESULT.to_string())
                }
                Approval::Custom(value) => {
                    resolution.custom.push(id.clone());
                    value
                }
            };

            if let Err(e) = invocation.resolve(result) {
                tracing::error!("Could not record result for {}: {}", id, e);
            }
        }
    }

    resolution
}

/// Run one call and turn any failure into a result the model can read.
pub async fn execute_call(registry: &ToolRegistry, ctx: &ToolContext, name: &str, args: Value) -> Value {
    match registry.execute(ctx, name, args).await {
        Ok(output) => output.into_value(),
        Err(e) => {
            tracing::warn!("Tool {} rejected: {}", name, e);
            Value::String(format!("Error executing tool: {}", e))
        }
    }
}
