//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable streaming providers
//! - [`StreamChunk`], the provider-neutral unit a step is built from
//! - [`OpenAiClient`], an OpenAI-compatible chat completions client
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient`, translating the provider's stream into `StreamChunk`s
//! 3. Construct it in `from_config()`

pub mod openai;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::Config;
use crate::tools::ToolDefinition;
use crate::Result;

pub use openai::OpenAiClient;

use super::message::Message;

/// Why the model stopped a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn parse(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// One incremental piece of a streamed model step.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    TextDelta(String),
    /// A new tool call at `index` within the step.
    ToolCallStart {
        index: usize,
        provider_id: Option<String>,
        name: String,
    },
    /// More argument JSON for the call at `index`.
    ToolCallDelta { index: usize, arguments: String },
    Finish { reason: FinishReason },
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Everything a provider needs for one step.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

/// LLM client trait - swappable provider abstraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streamed step over the full history.
    async fn stream(&self, request: ChatRequest<'_>) -> Result<ChunkStream>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Create the configured client. Fails when model credentials are missing.
pub fn from_config(config: &Config) -> Result<Box<dyn LlmClient>> {
    config.require_model_credentials()?;
    Ok(Box::new(OpenAiClient::from_config(config)?))
}
