//! Conversation agent - owns the history and drives model steps
//!
//! One turn: resolve gated calls, then alternate model step and tool
//! execution until the model answers without tools, a gated call needs the
//! user, the step cap is hit, or the caller cancels.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Local;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::scheduler::ScheduledTask;
use crate::tools::{ToolContext, ToolRegistry};
use crate::Result;

use super::context::system_prompt;
use super::interceptor::{self, PendingCall};
use super::invocation::{Approval, ToolCallId, ToolInvocation};
use super::llm::{ChatRequest, FinishReason, LlmClient, StreamChunk};
use super::message::Message;

/// Result recorded for calls a cancelled turn never got to run.
pub const CANCELLED_RESULT: &str = "Error: Tool execution was cancelled before it started";

/// Progress reported while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextDelta(String),
    ToolCallStarted { id: ToolCallId, name: String },
    ToolResult { id: ToolCallId, name: String, result: Value },
    AwaitingApproval(PendingCall),
    StepFinished { step: usize, reason: Option<FinishReason> },
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed,
    AwaitingConfirmation(Vec<PendingCall>),
    StepLimit,
    Cancelled,
}

enum StepEnd {
    Answered,
    ToolsRan,
    NeedsApproval,
    Cancelled,
}

/// A single conversation thread.
pub struct Conversation {
    llm: Box<dyn LlmClient>,
    registry: ToolRegistry,
    ctx: ToolContext,
    messages: Vec<Message>,
    decisions: HashMap<ToolCallId, Approval>,
    max_steps: usize,
    history_path: Option<PathBuf>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Conversation {
    pub fn new(llm: Box<dyn LlmClient>, registry: ToolRegistry, ctx: ToolContext, max_steps: usize) -> Self {
        Self {
            llm,
            registry,
            ctx,
            messages: Vec::new(),
            decisions: HashMap::new(),
            max_steps: max_steps.max(1),
            history_path: None,
            events: None,
        }
    }

    /// Persist history to `path`, loading whatever is already there.
    pub fn with_history(mut self, path: PathBuf) -> Result<Self> {
        self.messages = load_history(&path)?;
        self.history_path = Some(path);
        Ok(self)
    }

    /// Stream progress to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn model(&self) -> &str {
        self.llm.default_model()
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Gated calls with no result yet, whether or not a decision is queued.
    pub fn pending_confirmations(&self) -> Vec<PendingCall> {
        interceptor::pending_confirmations(&self.registry, &self.messages)
    }

    fn undecided(&self) -> Vec<String> {
        self.pending_confirmations()
            .into_iter()
            .filter(|p| !self.decisions.contains_key(&p.tool_call_id))
            .map(|p| p.tool_call_id.to_string())
            .collect()
    }

    /// Supply the user's decision for a gated call.
    pub fn add_tool_result(&mut self, id: &ToolCallId, approval: Approval) -> Result<()> {
        let invocation = self.messages.iter()
            .flat_map(|m| m.invocations())
            .find(|inv| &inv.tool_call_id == id)
            .ok_or_else(|| Error::NotFound(format!("tool call {}", id)))?;

        if !invocation.is_call() {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: invocation.state().name(),
                to: "result",
            });
        }
        if !self.registry.requires_confirmation(&invocation.tool_name) {
            return Err(Error::ToolExecution(format!(
                "Tool call {} ({}) does not need confirmation",
                id, invocation.tool_name
            )));
        }

        debug!("Decision for {}: {:?}", id, approval);
        self.decisions.insert(id.clone(), approval);
        Ok(())
    }

    /// Run a user turn. Refused while a gated call still lacks a decision.
    pub async fn submit(&mut self, text: &str, cancel: &CancellationToken) -> Result<TurnOutcome> {
        let undecided = self.undecided();
        if !undecided.is_empty() {
            return Err(Error::AwaitingConfirmation(undecided));
        }

        info!("User turn: {} chars", text.len());
        self.messages.push(Message::user(text));
        self.run_turn(cancel).await
    }

    /// Continue after decisions were supplied, without a new user message.
    pub async fn resume(&mut self, cancel: &CancellationToken) -> Result<TurnOutcome> {
        self.run_turn(cancel).await
    }

    /// Run a fired task as if the user had asked for it.
    ///
    /// The task is only dropped from the store once its turn has started; a
    /// refusal because of undecided calls leaves it stored.
    pub async fn run_scheduled(&mut self, task: &ScheduledTask, cancel: &CancellationToken) -> Result<TurnOutcome> {
        info!("Running scheduled task {}", task.id);
        let outcome = self.submit(&task.prompt(), cancel).await;
        if !matches!(outcome, Err(Error::AwaitingConfirmation(_))) {
            if let Err(e) = self.ctx.scheduler.finish(&task.id) {
                warn!("Could not drop finished task {} from the store: {}", task.id, e);
            }
        }
        outcome
    }

    /// Forget the whole thread.
    pub fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        self.decisions.clear();
        self.persist()
    }

    async fn run_turn(&mut self, cancel: &CancellationToken) -> Result<TurnOutcome> {
        let resolution = interceptor::resolve_pending(
            &self.registry,
            &self.ctx,
            &mut self.messages,
            &mut self.decisions,
        )
        .await;

        if !resolution.waiting.is_empty() {
            self.persist()?;
            return Ok(TurnOutcome::AwaitingConfirmation(self.pending_confirmations()));
        }

        for step in 0..self.max_steps {
            if cancel.is_cancelled() {
                self.persist()?;
                return Ok(TurnOutcome::Cancelled);
            }
            debug!("Step {}/{}", step + 1, self.max_steps);

            let end = match self.step(step, cancel).await {
                Ok(end) => end,
                Err(e) => {
                    self.persist()?;
                    return Err(e);
                }
            };
            self.persist()?;

            match end {
                StepEnd::Answered => return Ok(TurnOutcome::Completed),
                StepEnd::ToolsRan => continue,
                StepEnd::NeedsApproval => {
                    return Ok(TurnOutcome::AwaitingConfirmation(self.pending_confirmations()))
                }
                StepEnd::Cancelled => return Ok(TurnOutcome::Cancelled),
            }
        }

        warn!("Turn stopped after {} steps", self.max_steps);
        Ok(TurnOutcome::StepLimit)
    }

    /// One model call plus execution of the calls it made.
    async fn step(&mut self, step: usize, cancel: &CancellationToken) -> Result<StepEnd> {
        let tools = self.registry.definitions();
        let system = system_prompt(Local::now());
        let mut stream = self.llm
            .stream(ChatRequest { system: &system, messages: &self.messages, tools: &tools })
            .await?;

        let mut message = Message::assistant();
        let mut slots: HashMap<usize, ToolCallId> = HashMap::new();
        let mut finish = None;
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.keep_partial(message);
                    return Err(e);
                }
            };

            match chunk {
                StreamChunk::TextDelta(text) => {
                    message.push_text(&text);
                    self.emit(AgentEvent::TextDelta(text));
                }
                StreamChunk::ToolCallStart { index, name, .. } => {
                    let id = ToolCallId::generate();
                    self.start_call(&mut message, id.clone(), &name)?;
                    slots.insert(index, id.clone());
                    self.emit(AgentEvent::ToolCallStarted { id, name });
                }
                StreamChunk::ToolCallDelta { index, arguments } => {
                    let Some(invocation) = slots.get(&index).and_then(|id| message.invocation_mut(id)) else {
                        warn!("Argument fragment for unknown tool call index {}", index);
                        continue;
                    };
                    invocation.push_args(&arguments)?;
                }
                StreamChunk::Finish { reason } => finish = Some(reason),
            }
        }
        drop(stream);

        self.emit(AgentEvent::StepFinished { step, reason: finish.clone() });

        if cancelled {
            info!("Generation cancelled");
            self.keep_partial(message);
            return Ok(StepEnd::Cancelled);
        }

        for invocation in message.invocations_mut() {
            invocation.complete()?;
        }
        let calls: Vec<(ToolCallId, String, Value)> = message.invocations()
            .map(|inv| (inv.tool_call_id.clone(), inv.tool_name.clone(), inv.args().cloned().unwrap_or_default()))
            .collect();
        self.messages.push(message);

        if calls.is_empty() {
            if let Some(FinishReason::Length) = finish {
                warn!("Model stopped at its output limit");
            }
            return Ok(StepEnd::Answered);
        }

        let mut needs_approval = false;
        for (id, name, args) in calls {
            if self.registry.requires_confirmation(&name) {
                needs_approval = true;
                self.emit(AgentEvent::AwaitingApproval(PendingCall {
                    tool_call_id: id,
                    tool_name: name,
                    args,
                }));
                continue;
            }

            // A running tool always finishes; cancellation only stops the ones after it
            let result = if cancel.is_cancelled() {
                Value::String(CANCELLED_RESULT.to_string())
            } else {
                interceptor::execute_call(&self.registry, &self.ctx, &name, args).await
            };
            self.record_result(&id, result.clone())?;
            self.emit(AgentEvent::ToolResult { id, name, result });
        }

        // A gated call left in `call` state must reach the user even if the turn was stopped
        if needs_approval {
            return Ok(StepEnd::NeedsApproval);
        }
        if cancel.is_cancelled() {
            return Ok(StepEnd::Cancelled);
        }
        Ok(StepEnd::ToolsRan)
    }

    /// Register a new call, refusing an id already used anywhere in the thread.
    fn start_call(&self, message: &mut Message, id: ToolCallId, name: &str) -> Result<()> {
        let taken = self.messages.iter()
            .chain(std::iter::once(&*message))
            .flat_map(|m| m.invocations())
            .any(|inv| inv.tool_call_id == id);
        if taken {
            return Err(Error::DuplicateToolCallId(id.to_string()));
        }
        message.push_invocation(ToolInvocation::start(id, name));
        Ok(())
    }

    /// Keep streamed text from an interrupted step, never its unfinished calls.
    fn keep_partial(&mut self, mut message: Message) {
        let dropped = message.discard_partial_invocations();
        if dropped > 0 {
            debug!("Discarded {} unfinished tool call(s)", dropped);
        }
        if !message.is_empty() {
            self.messages.push(message);
        }
    }

    fn record_result(&mut self, id: &ToolCallId, result: Value) -> Result<()> {
        let invocation = self.messages.last_mut()
            .and_then(|m| m.invocation_mut(id))
            .ok_or_else(|| Error::NotFound(format!("tool call {}", id)))?;
        invocation.resolve(result)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.history_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.messages)?)?;
        Ok(())
    }
}

/// Read a persisted thread; a missing or empty file is an empty thread.
pub fn load_history(path: &std::path::Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::agent::invocation::DECLINED_RESULT;
    use crate::agent::llm::fake::{text, tool_call, tool_calls, FakeLlmClient};
    use crate::agent::llm::ChunkStream;
    use crate::agent::message::Part;
    use crate::tools::test_support::context;
    use crate::tools::{Tool, ToolOutput};

    struct CountingTool {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "Counts executions" }
        fn parameters(&self) -> Value { json!({"type": "object", "properties": {"to": {"type": "string"}}}) }

        async fn execute(&self, _ctx: &ToolContext, _params: Value) -> crate::Result<ToolOutput> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolOutput::Text(format!("{} run {}", self.name, n)))
        }
    }

    /// Cancels the running turn from inside its own execution.
    struct InterruptingTool {
        cancel: CancellationToken,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for InterruptingTool {
        fn name(&self) -> &str { "lookUp" }
        fn description(&self) -> &str { "Stops the turn while running" }
        fn parameters(&self) -> Value { json!({"type": "object"}) }

        async fn execute(&self, _ctx: &ToolContext, _params: Value) -> crate::Result<ToolOutput> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Ok(ToolOutput::Text("looked".to_string()))
        }
    }

    fn interrupted_conversation(
        server: &MockServer,
        fake: FakeLlmClient,
        cancel: &CancellationToken,
        runs: Arc<AtomicUsize>,
    ) -> Conversation {
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool { name: "sendIt", runs: runs.clone() });
        registry.register(InterruptingTool { cancel: cancel.clone(), runs });
        registry.require_confirmation(["sendIt"]);
        Conversation::new(Box::new(fake), registry, context(server), 10)
    }

    /// Client shared between the conversation and the test's assertions.
    struct Shared(Arc<FakeLlmClient>);

    #[async_trait]
    impl LlmClient for Shared {
        async fn stream(&self, request: ChatRequest<'_>) -> crate::Result<ChunkStream> {
            self.0.stream(request).await
        }
        fn default_model(&self) -> &str {
            self.0.default_model()
        }
    }

    fn conversation(
        server: &MockServer,
        fake: FakeLlmClient,
        gated: &[&str],
        runs: Arc<AtomicUsize>,
    ) -> (Conversation, Arc<FakeLlmClient>) {
        let fake = Arc::new(fake);
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool { name: "sendIt", runs: runs.clone() });
        registry.register(CountingTool { name: "lookUp", runs });
        registry.require_confirmation(gated.iter().copied());
        let convo = Conversation::new(Box::new(Shared(fake.clone())), registry, context(server), 10);
        (convo, fake)
    }

    #[tokio::test]
    async fn test_text_only_turn() {
        let server = MockServer::start().await;
        let (mut convo, fake) = conversation(&server, FakeLlmClient::new(vec![text("Hi there")]), &[], Arc::default());

        let outcome = convo.submit("hello", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(convo.messages().len(), 2);
        assert_eq!(convo.messages()[1].text(), "Hi there");
        assert_eq!(fake.calls()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back_to_model() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let fake = FakeLlmClient::new(vec![tool_call("lookUp", json!({"to": "ada"})), text("Done")]);
        let (mut convo, fake) = conversation(&server, fake, &[], runs.clone());

        let outcome = convo.submit("look it up", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let second_request = &fake.calls()[1];
        let inv = second_request[1].invocations().next().unwrap();
        assert_eq!(inv.args(), Some(&json!({"to": "ada"})));
        assert_eq!(inv.result(), Some(&json!("lookUp run 1")));
        assert!(inv.tool_call_id.as_str().starts_with("call_"));
    }

    #[tokio::test]
    async fn test_gated_call_waits_then_runs_once_on_approval() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let fake = FakeLlmClient::new(vec![tool_call("sendIt", json!({"to": "ada"})), text("Sent!")]);
        let (mut convo, fake) = conversation(&server, fake, &["sendIt"], runs.clone());
        let cancel = CancellationToken::new();

        let outcome = convo.submit("send it", &cancel).await.unwrap();
        let TurnOutcome::AwaitingConfirmation(pending) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(pending.len(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        // New input is refused until the user decides
        let err = convo.submit("hello?", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::AwaitingConfirmation(ref ids) if ids.len() == 1));
        assert_eq!(fake.calls().len(), 1);

        convo.add_tool_result(&pending[0].tool_call_id, Approval::Yes).unwrap();
        assert_eq!(convo.resume(&cancel).await.unwrap(), TurnOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(convo.pending_confirmations().is_empty());

        // The call is resolved now, so a second decision is rejected
        let again = convo.add_tool_result(&pending[0].tool_call_id, Approval::Yes).unwrap_err();
        assert!(matches!(again, Error::InvalidTransition { from: "result", .. }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_declined_call_never_runs() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let fake = FakeLlmClient::new(vec![tool_call("sendIt", json!({})), text("Okay, not sending.")]);
        let (mut convo, fake) = conversation(&server, fake, &["sendIt"], runs.clone());
        let cancel = CancellationToken::new();

        let TurnOutcome::AwaitingConfirmation(pending) = convo.submit("send it", &cancel).await.unwrap() else {
            panic!("expected confirmation");
        };
        convo.add_tool_result(&pending[0].tool_call_id, Approval::No).unwrap();
        convo.submit("never mind", &cancel).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let declined = fake.calls()[1][1].invocations().next().unwrap().result().cloned();
        assert_eq!(declined, Some(json!(DECLINED_RESULT)));
    }

    #[tokio::test]
    async fn test_unknown_or_ungated_decisions_are_rejected() {
        let server = MockServer::start().await;
        let fake = FakeLlmClient::new(vec![tool_call("lookUp", json!({})), text("ok")]);
        let (mut convo, _) = conversation(&server, fake, &[], Arc::default());

        let err = convo.add_tool_result(&ToolCallId::from("missing"), Approval::Yes).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        convo.submit("go", &CancellationToken::new()).await.unwrap();
        let id = convo.messages()[1].invocations().next().unwrap().tool_call_id.clone();
        assert!(convo.add_tool_result(&id, Approval::Yes).is_err());
    }

    #[tokio::test]
    async fn test_step_cap_stops_a_looping_model() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let steps = (0..5).map(|_| tool_call("lookUp", json!({}))).collect();
        let (convo, fake) = conversation(&server, FakeLlmClient::new(steps), &[], runs.clone());
        let mut convo = Conversation { max_steps: 3, ..convo };

        let outcome = convo.submit("loop", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::StepLimit);
        assert_eq!(fake.calls().len(), 3);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_keeps_text_and_drops_unfinished_calls() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let mut chunks = vec![StreamChunk::TextDelta("Working on it".to_string())];
        chunks.extend(tool_call("lookUp", json!({"to": "ada"})));
        // Cancel fires as the tool call starts streaming
        let fake = FakeLlmClient::new(vec![chunks]).cancel_during(0, 1, cancel.clone());
        let (mut convo, _) = conversation(&server, fake, &[], runs.clone());

        let outcome = convo.submit("do it", &cancel).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let last = convo.messages().last().unwrap();
        assert_eq!(last.text(), "Working on it");
        assert_eq!(last.invocations().count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_at_finish_runs_no_calls() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let step = tool_calls(&[("lookUp", json!({})), ("lookUp", json!({}))]);
        let last_chunk = step.len() - 1;
        let fake = FakeLlmClient::new(vec![step]).cancel_during(0, last_chunk, cancel.clone());
        let (mut convo, _) = conversation(&server, fake, &[], runs.clone());

        let outcome = convo.submit("do both", &cancel).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_running_tool_finishes_and_later_calls_are_cancelled() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let fake = FakeLlmClient::new(vec![tool_calls(&[("lookUp", json!({})), ("lookUp", json!({}))])]);
        let mut convo = interrupted_conversation(&server, fake, &cancel, runs.clone());

        let outcome = convo.submit("look twice", &cancel).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let results: Vec<_> = convo.messages()[1].invocations().map(|inv| inv.result().cloned()).collect();
        assert_eq!(results, vec![Some(json!("looked")), Some(json!(CANCELLED_RESULT))]);
    }

    #[tokio::test]
    async fn test_cancelled_step_still_surfaces_gated_call() {
        let server = MockServer::start().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let step = tool_calls(&[("sendIt", json!({"to": "ada"})), ("lookUp", json!({})), ("lookUp", json!({}))]);
        let fake = FakeLlmClient::new(vec![step, text("Sent!")]);
        let mut convo = interrupted_conversation(&server, fake, &cancel, runs.clone());

        let outcome = convo.submit("send and look", &cancel).await.unwrap();
        let TurnOutcome::AwaitingConfirmation(pending) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tool_name, "sendIt");

        let states: Vec<_> = convo.messages()[1].invocations().map(|inv| inv.state().name()).collect();
        assert_eq!(states, vec!["call", "result", "result"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The user can still decide and the thread moves on
        convo.add_tool_result(&pending[0].tool_call_id, Approval::Yes).unwrap();
        let outcome = convo.resume(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(convo.pending_confirmations().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tool_call_id_is_refused() {
        let server = MockServer::start().await;
        let fake = FakeLlmClient::new(vec![tool_call("lookUp", json!({})), text("ok")]);
        let (mut convo, _) = conversation(&server, fake, &[], Arc::default());
        convo.submit("go", &CancellationToken::new()).await.unwrap();

        let existing = convo.messages()[1].invocations().next().unwrap().tool_call_id.clone();
        let mut message = Message::assistant();
        let err = convo.start_call(&mut message, existing, "lookUp").unwrap_err();
        assert!(matches!(err, Error::DuplicateToolCallId(_)));
        assert!(message.parts.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_persisted_and_reloaded() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("history.json");

        let fake = FakeLlmClient::new(vec![tool_call("lookUp", json!({})), text("Found it")]);
        let (convo, _) = conversation(&server, fake, &[], Arc::default());
        let mut convo = convo.with_history(history.clone()).unwrap();
        convo.submit("find it", &CancellationToken::new()).await.unwrap();

        let reloaded = load_history(&history).unwrap();
        assert_eq!(reloaded, convo.messages());
        assert!(matches!(reloaded[1].parts[0], Part::ToolInvocation { .. }));

        convo.clear().unwrap();
        assert!(load_history(&history).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_task_runs_as_user_turn() {
        let server = MockServer::start().await;
        let (mut convo, fake) = conversation(&server, FakeLlmClient::new(vec![text("Reminder sent")]), &[], Arc::default());
        let task = ScheduledTask {
            id: "abcd1234".to_string(),
            description: "remind me to call Ada".to_string(),
            trigger: crate::scheduler::Trigger::delayed(0),
            created_at: chrono::Utc::now(),
        };

        convo.run_scheduled(&task, &CancellationToken::new()).await.unwrap();
        assert_eq!(fake.calls()[0][0].text(), "Running scheduled task: remind me to call Ada");
    }

    #[tokio::test]
    async fn test_unauthorized_tool_call_does_not_break_turn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let fake = Arc::new(FakeLlmClient::new(vec![
            tool_call("getLatestEmailsOriginal", json!({})),
            text("Please reconnect."),
        ]));
        let mut convo = Conversation::new(
            Box::new(Shared(fake.clone())),
            ToolRegistry::new_with_defaults(),
            context(&server),
            10,
        );

        let outcome = convo.submit("latest mail?", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        let result = fake.calls()[1][1].invocations().next().unwrap().result().cloned();
        assert_eq!(result, Some(json!(crate::error::RECONNECT_PROMPT)));
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let server = MockServer::start().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fake = FakeLlmClient::new(vec![tool_call("lookUp", json!({})), text("ok")]);
        let (convo, _) = conversation(&server, fake, &[], Arc::default());
        let mut convo = convo.with_events(tx);
        convo.submit("go", &CancellationToken::new()).await.unwrap();
        drop(convo);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[0], AgentEvent::ToolCallStarted { ref name, .. } if name == "lookUp"));
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolResult { .. })));
        assert!(events.contains(&AgentEvent::TextDelta("ok".to_string())));
    }
}
