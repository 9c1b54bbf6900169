//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message and tool invocation types
//! - LLM client trait and implementations
//! - The confirmation interceptor for gated tool calls
//! - The conversation agent that drives model steps
//! - The system prompt
//!
//! # Adding a New LLM Provider
//!
//! See [`llm`] for instructions.

mod context;
mod conversation;
mod interceptor;
mod invocation;
mod message;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::{system_prompt, SYSTEM_PROMPT};
pub use conversation::{load_history, AgentEvent, Conversation, TurnOutcome, CANCELLED_RESULT};
pub use interceptor::{PendingCall, Resolution};
pub use invocation::{Approval, InvocationState, ToolCallId, ToolInvocation, DECLINED_RESULT};
pub use llm::{LlmClient, OpenAiClient, StreamChunk};
pub use message::{Message, Part, Role};
