//! Tools that let the model schedule work for later

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::google::calendar::parse_date_time;
use crate::scheduler::Trigger;
use crate::tools::{parse_args, Tool, ToolContext, ToolOutput};
use crate::Result;

const INVALID_SCHEDULE: &str = "Not a valid schedule input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum WhenKind {
    Scheduled,
    Delayed,
    Cron,
    NoSchedule,
}

impl WhenKind {
    fn as_str(self) -> &'static str {
        match self {
            WhenKind::Scheduled => "scheduled",
            WhenKind::Delayed => "delayed",
            WhenKind::Cron => "cron",
            WhenKind::NoSchedule => "no-schedule",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct When {
    #[serde(rename = "type")]
    kind: WhenKind,
    date: Option<String>,
    delay_in_seconds: Option<u64>,
    cron: Option<String>,
}

impl When {
    /// Trigger plus the input echoed back to the model, `None` if incomplete.
    fn trigger(&self) -> Result<Option<(Trigger, String)>> {
        Ok(match self.kind {
            WhenKind::Scheduled => match self.date.as_deref() {
                Some(date) => Some((Trigger::at(parse_date_time(date)?), date.to_string())),
                None => None,
            },
            WhenKind::Delayed => self.delay_in_seconds
                .map(|secs| (Trigger::delayed(secs), secs.to_string())),
            WhenKind::Cron => match self.cron.as_deref() {
                Some(expr) => Some((Trigger::cron(expr)?, expr.to_string())),
                None => None,
            },
            WhenKind::NoSchedule => None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleArgs {
    description: String,
    when: When,
}

/// `scheduleTask`
pub struct ScheduleTaskTool;

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str { "scheduleTask" }
    fn description(&self) -> &str { "A tool to schedule a task to be executed at a later time" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "What to do when the task runs" },
                "when": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["scheduled", "delayed", "cron", "no-schedule"],
                            "description": "The type of scheduling"
                        },
                        "date": { "type": "string", "description": "Date and time for a scheduled task" },
                        "delayInSeconds": { "type": "integer", "minimum": 0, "description": "Delay in seconds for a delayed task" },
                        "cron": { "type": "string", "description": "Cron expression for a recurring task" }
                    },
                    "required": ["type"]
                }
            },
            "required": ["description", "when"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: ScheduleArgs = parse_args(self.name(), params)?;

        let Some((trigger, input)) = args.when.trigger()? else {
            return Ok(ToolOutput::Text(INVALID_SCHEDULE.to_string()));
        };
        let task = ctx.scheduler.schedule(&args.description, trigger)?;

        Ok(ToolOutput::Text(format!(
            "Task scheduled for type \"{}\" : {} (id: {})",
            args.when.kind.as_str(),
            input,
            task.id
        )))
    }

    fn failure_label(&self) -> &str {
        "Error scheduling task"
    }
}

/// `getScheduledTasks`
pub struct GetScheduledTasksTool;

#[async_trait]
impl Tool for GetScheduledTasksTool {
    fn name(&self) -> &str { "getScheduledTasks" }
    fn description(&self) -> &str { "List all tasks that have been scheduled" }
    fn parameters(&self) -> Value { json!({"type": "object", "properties": {}}) }

    async fn execute(&self, ctx: &ToolContext, _params: Value) -> Result<ToolOutput> {
        let tasks = ctx.scheduler.list();
        if tasks.is_empty() {
            return Ok(ToolOutput::Text("No scheduled tasks found.".to_string()));
        }
        let lines: Vec<String> = tasks.iter()
            .map(|t| format!("• `{}` {} ({})", t.id, t.description, t.trigger.describe()))
            .collect();
        Ok(ToolOutput::Text(format!("Scheduled tasks:\n{}", lines.join("\n"))))
    }

    fn failure_label(&self) -> &str {
        "Error listing scheduled tasks"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelArgs {
    task_id: String,
}

/// `cancelScheduledTask`
pub struct CancelScheduledTaskTool;

#[async_trait]
impl Tool for CancelScheduledTaskTool {
    fn name(&self) -> &str { "cancelScheduledTask" }
    fn description(&self) -> &str { "Cancel a scheduled task using its ID" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "taskId": { "type": "string", "description": "The ID of the task to cancel" }
            },
            "required": ["taskId"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolOutput> {
        let args: CancelArgs = parse_args(self.name(), params)?;
        Ok(ToolOutput::Text(match ctx.scheduler.cancel(&args.task_id) {
            Ok(_) => format!("Task {} has been successfully canceled.", args.task_id),
            Err(e) => format!("Error canceling task {}: {}", args.task_id, e),
        }))
    }
}
