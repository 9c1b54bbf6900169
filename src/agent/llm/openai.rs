//! OpenAI-compatible chat completions client (streaming).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};

use crate::agent::invocation::InvocationState;
use crate::agent::message::{Message, Part, Role};
use crate::config::Config;
use crate::error::Error;
use crate::google::GoogleApi;
use crate::tools::ToolDefinition;
use crate::Result;

use super::{ChatRequest, ChunkStream, FinishReason, LlmClient, StreamChunk};

/// OpenAI chat completions client using API key authentication.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: 1.0,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = GoogleApi::build_http_client(config)?;
        let mut llm = Self::new(&config.openai_api_key, &config.model, &config.openai_base_url, client);
        llm.temperature = config.temperature;
        Ok(llm)
    }

    fn build_request_body(&self, request: &ChatRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(request.system, request.messages),
            "temperature": self.temperature,
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(convert_tools(request.tools));
        }
        body
    }
}

/// Flatten the history into chat completions messages.
///
/// An assistant message becomes one `assistant` entry carrying its text and
/// finished tool calls, followed by one `tool` entry per result. Calls still
/// waiting for a result are left out.
fn convert_messages(system: &str, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(json!({"role": "system", "content": system}));
    }

    for msg in messages {
        match msg.role {
            Role::System => out.push(json!({"role": "system", "content": msg.text()})),
            Role::User => out.push(json!({"role": "user", "content": msg.text()})),
            Role::Assistant => {
                let mut calls = Vec::new();
                let mut results = Vec::new();
                for part in &msg.parts {
                    let Part::ToolInvocation { invocation } = part else { continue };
                    let InvocationState::Result { args, result } = invocation.state() else { continue };
                    calls.push(json!({
                        "id": invocation.tool_call_id.as_str(),
                        "type": "function",
                        "function": {
                            "name": invocation.tool_name,
                            "arguments": args.to_string(),
                        }
                    }));
                    results.push(json!({
                        "role": "tool",
                        "tool_call_id": invocation.tool_call_id.as_str(),
                        "content": result_content(result),
                    }));
                }

                let text = msg.text();
                if text.is_empty() && calls.is_empty() {
                    continue;
                }
                let mut entry = json!({"role": "assistant", "content": text});
                if !calls.is_empty() {
                    entry["tool_calls"] = Value::Array(calls);
                }
                out.push(entry);
                out.extend(results);
            }
        }
    }
    out
}

fn result_content(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools.iter()
        .map(|t| json!({
            "type": "function",
            "function": {
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            }
        }))
        .collect()
}

/// Translate one SSE `data:` payload into chunks.
fn parse_event(data: &str) -> Result<Vec<StreamChunk>> {
    let event: Value = serde_json::from_str(data)?;
    if let Some(err) = event.get("error") {
        return Err(Error::Llm(format!("Stream error: {}", err)));
    }

    let mut chunks = Vec::new();
    let Some(choice) = event.get("choices").and_then(|c| c.get(0)) else {
        return Ok(chunks);
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                chunks.push(StreamChunk::TextDelta(text.to_string()));
            }
        }

        for call in delta.get("tool_calls").and_then(|t| t.as_array()).into_iter().flatten() {
            let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;
            let function = call.get("function");

            if let Some(name) = function.and_then(|f| f.get("name")).and_then(|n| n.as_str()) {
                chunks.push(StreamChunk::ToolCallStart {
                    index,
                    provider_id: call.get("id").and_then(|i| i.as_str()).map(String::from),
                    name: name.to_string(),
                });
            }
            if let Some(args) = function.and_then(|f| f.get("arguments")).and_then(|a| a.as_str()) {
                if !args.is_empty() {
                    chunks.push(StreamChunk::ToolCallDelta { index, arguments: args.to_string() });
                }
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
        chunks.push(StreamChunk::Finish { reason: FinishReason::parse(reason) });
    }
    Ok(chunks)
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    line_buffer: Vec<u8>,
    pending: VecDeque<Result<StreamChunk>>,
    done: bool,
}

impl SseState {
    /// Consume every complete line currently buffered.
    fn drain_lines(&mut self) {
        while let Some(newline_pos) = self.line_buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.line_buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw[..newline_pos]);
            self.handle_line(line.trim_end_matches('\r'));
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            return;
        };
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match parse_event(data) {
            Ok(chunks) => self.pending.extend(chunks.into_iter().map(Ok)),
            Err(e) => {
                tracing::warn!("Failed to parse SSE data: {} (line: {})", e, data);
                self.pending.push_back(Err(e));
                self.done = true;
            }
        }
    }
}

fn sse_chunks(response: reqwest::Response) -> ChunkStream {
    let state = SseState {
        body: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
        line_buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.line_buffer.extend_from_slice(&bytes);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(Error::Http(e)), state));
                }
                None => {
                    // Flush a final line without a trailing newline
                    let rest = std::mem::take(&mut state.line_buffer);
                    state.handle_line(String::from_utf8_lossy(&rest).trim_end_matches('\r'));
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn stream(&self, request: ChatRequest<'_>) -> Result<ChunkStream> {
        let body = self.build_request_body(&request);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(model = %self.model, url = %url, "Calling chat completions");

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("OpenAI API error (HTTP {}): {}", status, text)));
        }

        Ok(sse_chunks(response))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
