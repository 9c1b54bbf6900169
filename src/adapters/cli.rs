//! CLI adapter - interactive and single-message command line interface.
//!
//! Streams model output as it arrives, renders structured tool results, asks
//! for approval of gated tool calls and runs scheduled tasks between user
//! turns.

use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use colored::*;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentEvent, Approval, Conversation, PendingCall, TurnOutcome};
use crate::error::Error;
use crate::scheduler::ScheduledTask;
use crate::ui;
use crate::Result;

/// Ctrl+C stops the running turn; with no turn running, a second press exits.
#[derive(Clone, Default)]
pub struct Interrupt {
    current: Arc<Mutex<Option<CancellationToken>>>,
    armed_exit: Arc<AtomicBool>,
}

impl Interrupt {
    /// Install the process-wide handler. Call once.
    pub fn install() -> Self {
        let interrupt = Self::default();
        let handler = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || handler.fire()) {
            tracing::warn!("Could not install Ctrl+C handler: {}", e);
        }
        interrupt
    }

    fn fire(&self) {
        let running = self.current.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(token) = running {
            println!("\n⏹  Stopping...");
            token.cancel();
            return;
        }

        if self.armed_exit.swap(true, Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        }
        println!("\n⚠️  Press Ctrl+C again to exit");
        let armed = self.armed_exit.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            armed.store(false, Ordering::SeqCst);
        });
    }

    /// Token for a new turn, cancelled by the next Ctrl+C.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        token
    }

    fn end(&self) {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Prints agent events in arrival order.
#[derive(Default)]
struct Printer {
    mid_line: bool,
}

impl Printer {
    fn show(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::TextDelta(text) => {
                if !self.mid_line {
                    print!("\n{} ", "Orbit:".green().bold());
                    self.mid_line = true;
                }
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            AgentEvent::ToolCallStarted { name, .. } => {
                self.break_line();
                ui::print_thinking(&format!("calling {}", name));
            }
            AgentEvent::ToolResult { name, result, .. } => {
                self.break_line();
                match ui::render_tool_result(&result) {
                    Some(rendered) => println!("{}", rendered),
                    None => ui::print_step(&format!("{} → {}", name, preview(&result))),
                }
            }
            AgentEvent::AwaitingApproval(call) => {
                self.break_line();
                ui::print_warning(&format!("{} needs your approval", call.tool_name));
            }
            AgentEvent::StepFinished { .. } => self.break_line(),
        }
    }

    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

/// First line of a text result, shortened.
fn preview(result: &Value) -> String {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() > 100 {
        format!("{}…", first.chars().take(100).collect::<String>())
    } else {
        first.to_string()
    }
}

/// Run `turn` while printing the events it emits.
async fn drive<F>(events: &mut mpsc::UnboundedReceiver<AgentEvent>, printer: &mut Printer, turn: F) -> Result<TurnOutcome>
where
    F: Future<Output = Result<TurnOutcome>>,
{
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => printer.show(event),
            outcome = &mut turn => break outcome,
        }
    };
    while let Ok(event) = events.try_recv() {
        printer.show(event);
    }
    printer.break_line();
    outcome
}

/// Ask the user about one gated call. A dismissed prompt counts as a denial.
async fn ask_approval(call: PendingCall) -> Approval {
    let prompt = format!("Allow {} with {}?", call.tool_name, call.args);
    let answer = tokio::task::spawn_blocking(move || {
        inquire::Confirm::new(&prompt).with_default(false).prompt()
    })
    .await;

    match answer {
        Ok(Ok(true)) => Approval::Yes,
        Ok(Ok(false)) => Approval::No,
        Ok(Err(e)) => {
            tracing::debug!("Approval prompt dismissed: {}", e);
            Approval::No
        }
        Err(e) => {
            tracing::warn!("Approval prompt failed: {}", e);
            Approval::No
        }
    }
}

/// CLI channel for interactive agent sessions.
pub struct CliChannel {
    conversation: Conversation,
    events: mpsc::UnboundedReceiver<AgentEvent>,
    tasks: mpsc::UnboundedReceiver<ScheduledTask>,
    interrupt: Interrupt,
    printer: Printer,
}

impl CliChannel {
    /// `conversation` must have been built without an event sender.
    pub fn new(conversation: Conversation, tasks: mpsc::UnboundedReceiver<ScheduledTask>, interrupt: Interrupt) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            conversation: conversation.with_events(tx),
            events,
            tasks,
            interrupt,
            printer: Printer::default(),
        }
    }

    /// Send one message and settle any approvals it raises.
    pub async fn run_once(&mut self, message: &str) -> Result<()> {
        let cancel = self.interrupt.begin();
        let outcome = drive(&mut self.events, &mut self.printer, self.conversation.submit(message, &cancel)).await;
        self.interrupt.end();
        self.settle(outcome?).await
    }

    async fn run_task(&mut self, task: ScheduledTask) -> Result<()> {
        println!("\n{} {}", "⏰ Scheduled task:".magenta().bold(), task.description);
        let pending = self.conversation.pending_confirmations();
        if !pending.is_empty() {
            self.settle(TurnOutcome::AwaitingConfirmation(pending)).await?;
        }
        let cancel = self.interrupt.begin();
        let outcome = drive(&mut self.events, &mut self.printer, self.conversation.run_scheduled(&task, &cancel)).await;
        self.interrupt.end();
        self.settle(outcome?).await
    }

    /// Keep asking for approvals and resuming until the turn is done.
    async fn settle(&mut self, mut outcome: TurnOutcome) -> Result<()> {
        loop {
            match outcome {
                TurnOutcome::Completed => return Ok(()),
                TurnOutcome::Cancelled => {
                    ui::print_warning("Stopped. Tool calls from the interrupted step were not run.");
                    return Ok(());
                }
                TurnOutcome::StepLimit => {
                    ui::print_warning("Stopped after reaching the step limit for one message.");
                    return Ok(());
                }
                TurnOutcome::AwaitingConfirmation(pending) => {
                    for call in pending {
                        let id = call.tool_call_id.clone();
                        let approval = ask_approval(call).await;
                        self.conversation.add_tool_result(&id, approval)?;
                    }
                    let cancel = self.interrupt.begin();
                    let next = drive(&mut self.events, &mut self.printer, self.conversation.resume(&cancel)).await;
                    self.interrupt.end();
                    outcome = next?;
                }
            }
        }
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&mut self) -> Result<()> {
        // Left over from a previous session
        let leftover = self.conversation.pending_confirmations();
        if !leftover.is_empty() {
            ui::print_warning(&format!("{} tool call(s) from last time still need a decision", leftover.len()));
            self.settle(TurnOutcome::AwaitingConfirmation(leftover)).await?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("\n{} ", "You:".blue().bold());
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                Some(task) = self.tasks.recv() => {
                    if let Err(e) = self.run_task(task).await {
                        ui::print_error(&e.to_string());
                    }
                    continue;
                }
            };
            let Some(line) = line else {
                // EOF
                break;
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            match input.to_lowercase().as_str() {
                "exit" | "quit" | "q" => {
                    println!("Goodbye! 👋");
                    break;
                }
                "/clear" => {
                    self.conversation.clear()?;
                    ui::print_success("Conversation cleared");
                    continue;
                }
                _ => {}
            }

            match self.run_once(input).await {
                Ok(()) => {}
                Err(Error::AwaitingConfirmation(ids)) => {
                    ui::print_warning(&format!("Waiting for a decision on {} tool call(s)", ids.len()));
                    let pending = self.conversation.pending_confirmations();
                    if let Err(e) = self.settle(TurnOutcome::AwaitingConfirmation(pending)).await {
                        ui::print_error(&e.to_string());
                    }
                }
                Err(e) => ui::print_error(&e.to_string()),
            }
        }

        Ok(())
    }

    /// Get current history length.
    pub fn history_len(&self) -> usize {
        self.conversation.messages().len()
    }
}
