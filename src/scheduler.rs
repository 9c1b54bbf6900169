//! Deferred and recurring tasks
//!
//! A fired task is sent over a channel to the conversation driver, which runs
//! it as a turn of its own. A one-shot task leaves the table when it fires but
//! stays on disk until [`Scheduler::finish`] reports its turn ran; cron tasks
//! stay until cancelled. Tasks are persisted so they survive restarts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Local, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::Result;

/// When a task fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires once at the given instant, immediately if it already passed.
    Once { at: DateTime<Utc> },
    /// Fires on every match of a cron expression, evaluated in local time.
    Cron { expression: String },
}

impl Trigger {
    pub fn at(at: DateTime<Utc>) -> Self {
        Trigger::Once { at }
    }

    /// One-shot trigger `secs` seconds from now.
    pub fn delayed(secs: u64) -> Self {
        const MAX_DELAY_SECS: u64 = 100 * 365 * 24 * 60 * 60;
        let secs = secs.min(MAX_DELAY_SECS) as i64;
        Trigger::Once { at: Utc::now() + Duration::seconds(secs) }
    }

    /// Accepts standard 5-field expressions or 6-field ones with seconds.
    pub fn cron(expression: &str) -> Result<Self> {
        let expression = expression.trim().to_string();
        parse_cron(&expression)?;
        Ok(Trigger::Cron { expression })
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Trigger::Cron { .. })
    }

    /// Next fire time strictly after `after`; one-shot triggers always
    /// report their instant.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Once { at } => Some(*at),
            Trigger::Cron { expression } => {
                let schedule = parse_cron(expression).ok()?;
                schedule
                    .after(&after.with_timezone(&Local))
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Trigger::Once { at } => format!(
                "once at {}",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            Trigger::Cron { expression } => format!("cron \"{}\"", expression),
        }
    }
}

fn parse_cron(expression: &str) -> Result<Schedule> {
    let fields = expression.split_whitespace().count();
    let six_field = if fields == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };
    Schedule::from_str(&six_field)
        .map_err(|e| Error::ToolExecution(format!("Invalid cron expression '{}': {}", expression, e)))
}

/// A stored task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub description: String,
    pub trigger: Trigger,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// The synthetic user message a firing task is run as.
    pub fn prompt(&self) -> String {
        format!("Running scheduled task: {}", self.description)
    }
}

struct Armed {
    task: ScheduledTask,
    cancel: CancellationToken,
}

struct Inner {
    tasks: Mutex<HashMap<String, Armed>>,
    /// Fired one-shot tasks whose turn has not run yet.
    handed_off: Mutex<HashMap<String, ScheduledTask>>,
    store_path: Option<PathBuf>,
    fired: mpsc::UnboundedSender<ScheduledTask>,
}

/// Cheap to clone; all clones share the same task table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its firing channel.
    ///
    /// With `store_path` set, every change is written to disk.
    pub fn new(store_path: Option<PathBuf>) -> (Self, mpsc::UnboundedReceiver<ScheduledTask>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                handed_off: Mutex::new(HashMap::new()),
                store_path,
                fired,
            }),
        };
        (scheduler, rx)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, Armed>> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handed_off(&self) -> MutexGuard<'_, HashMap<String, ScheduledTask>> {
        self.inner.handed_off.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load persisted tasks and arm them. Must run inside a Tokio runtime.
    pub fn restore(&self) -> Result<usize> {
        let tasks = self.read_stored()?;
        let count = tasks.len();
        for task in tasks {
            tracing::info!("Re-arming scheduled task {} ({})", task.id, task.trigger.describe());
            self.arm(task);
        }
        Ok(count)
    }

    /// Load persisted tasks without starting their timers, so they can be
    /// listed, cancelled and written back but never fire in this process.
    pub fn adopt(&self) -> Result<usize> {
        let tasks = self.read_stored()?;
        let count = tasks.len();
        let mut table = self.tasks();
        for task in tasks {
            table.insert(task.id.clone(), Armed { task, cancel: CancellationToken::new() });
        }
        Ok(count)
    }

    fn read_stored(&self) -> Result<Vec<ScheduledTask>> {
        let Some(path) = &self.inner.store_path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Store a task and start its timer. Must run inside a Tokio runtime.
    pub fn schedule(&self, description: &str, trigger: Trigger) -> Result<ScheduledTask> {
        if let Trigger::Cron { expression } = &trigger {
            parse_cron(expression)?;
        }

        let task = ScheduledTask {
            id: self.fresh_id(),
            description: description.to_string(),
            trigger,
            created_at: Utc::now(),
        };

        tracing::info!("Scheduled task {} ({})", task.id, task.trigger.describe());
        self.arm(task.clone());
        self.persist()?;
        Ok(task)
    }

    /// Pending tasks, oldest first.
    pub fn list(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.tasks().values().map(|a| a.task.clone()).collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Everything that must survive a restart: pending tasks plus fired
    /// one-shot tasks whose turn has not run.
    fn stored(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.list();
        tasks.extend(self.handed_off().values().cloned());
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Remove a task; unknown ids are an error.
    pub fn cancel(&self, id: &str) -> Result<ScheduledTask> {
        let armed = self.tasks()
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("scheduled task {}", id)))?;
        armed.cancel.cancel();
        tracing::info!("Cancelled scheduled task {}", id);
        self.persist()?;
        Ok(armed.task)
    }

    /// Drop a fired one-shot task from disk once its turn has run.
    pub fn finish(&self, id: &str) -> Result<()> {
        if self.handed_off().remove(id).is_some() {
            tracing::debug!("Scheduled task {} done", id);
            self.persist()?;
        }
        Ok(())
    }

    fn fresh_id(&self) -> String {
        let tasks = self.tasks();
        let handed_off = self.handed_off();
        loop {
            let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
            if !tasks.contains_key(&id) && !handed_off.contains_key(&id) {
                return id;
            }
        }
    }

    fn arm(&self, task: ScheduledTask) {
        let cancel = CancellationToken::new();
        self.tasks().insert(task.id.clone(), Armed { task: task.clone(), cancel: cancel.clone() });

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_timer(task, cancel).await;
        });
    }

    async fn run_timer(self, task: ScheduledTask, cancel: CancellationToken) {
        loop {
            let Some(next) = task.trigger.next_after(Utc::now()) else {
                tracing::warn!("Scheduled task {} has no future fire time", task.id);
                return;
            };
            let delay = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            // `cancel` removes the entry before it trips the token, so the table decides
            {
                let mut tasks = self.tasks();
                if cancel.is_cancelled() || !tasks.contains_key(&task.id) {
                    return;
                }
                if !task.trigger.is_recurring() {
                    tasks.remove(&task.id);
                    self.handed_off().insert(task.id.clone(), task.clone());
                }
            }

            tracing::info!("Scheduled task {} fired", task.id);

            if self.inner.fired.send(task.clone()).is_err() {
                tracing::warn!("No conversation is listening for scheduled task {}", task.id);
                return;
            }

            if !task.trigger.is_recurring() {
                return;
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.inner.store_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.stored())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_five_field_cron_is_accepted() {
        let trigger = Trigger::cron("30 9 * * *").unwrap();
        assert!(trigger.is_recurring());

        let now = Utc::now();
        let next = trigger.next_after(now).unwrap();
        assert!(next > now);
        assert_eq!(next.with_timezone(&Local).format("%H:%M:%S").to_string(), "09:30:00");
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        assert!(Trigger::cron("every tuesday").is_err());
    }

    #[tokio::test]
    async fn test_one_shot_fires_once_and_is_removed() {
        let (scheduler, mut rx) = Scheduler::new(None);
        let task = scheduler.schedule("check inbox", Trigger::delayed(0)).unwrap();

        let fired = tokio::time::timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.id, task.id);
        assert_eq!(fired.prompt(), "Running scheduled task: check inbox");
        assert!(scheduler.list().is_empty());

        let again = tokio::time::timeout(StdDuration::from_millis(200), rx.recv()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_fired_task_stays_on_disk_until_finished() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let (scheduler, mut rx) = Scheduler::new(Some(path.clone()));
        let task = scheduler.schedule("check inbox", Trigger::delayed(0)).unwrap();

        let fired = tokio::time::timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.id, task.id);
        assert!(scheduler.list().is_empty());

        // Nobody ran the turn yet, so a restart fires it again
        let (restarted, mut rx2) = Scheduler::new(Some(path.clone()));
        assert_eq!(restarted.restore().unwrap(), 1);
        let refired = tokio::time::timeout(StdDuration::from_secs(5), rx2.recv()).await.unwrap().unwrap();
        assert_eq!(refired.id, task.id);

        scheduler.finish(&task.id).unwrap();
        restarted.finish(&task.id).unwrap();
        let (empty, _rx3) = Scheduler::new(Some(path));
        assert_eq!(empty.restore().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timer_for_removed_task_does_not_fire() {
        let (scheduler, mut rx) = Scheduler::new(None);
        let task = ScheduledTask {
            id: "gone0001".to_string(),
            description: "cancelled after waking".to_string(),
            trigger: Trigger::delayed(0),
            created_at: Utc::now(),
        };

        scheduler.clone().run_timer(task, CancellationToken::new()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_not_found() {
        let (scheduler, _rx) = Scheduler::new(None);
        let err = scheduler.cancel("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_task_never_fires() {
        let (scheduler, mut rx) = Scheduler::new(None);
        let task = scheduler.schedule("later", Trigger::delayed(1)).unwrap();
        scheduler.cancel(&task.id).unwrap();

        let fired = tokio::time::timeout(StdDuration::from_millis(1500), rx.recv()).await;
        assert!(fired.is_err());
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn test_tasks_persist_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let (scheduler, _rx) = Scheduler::new(Some(path.clone()));
        let far = Utc::now() + Duration::days(30);
        let once = scheduler.schedule("renew passport", Trigger::at(far)).unwrap();
        let weekly = scheduler.schedule("weekly review", Trigger::cron("0 9 * * 1").unwrap()).unwrap();

        let (restored, _rx2) = Scheduler::new(Some(path));
        assert_eq!(restored.restore().unwrap(), 2);
        let ids: Vec<String> = restored.list().into_iter().map(|t| t.id).collect();
        assert!(ids.contains(&once.id));
        assert!(ids.contains(&weekly.id));

        scheduler.cancel(&once.id).unwrap();
        restored.cancel(&once.id).unwrap();
        restored.cancel(&weekly.id).unwrap();
    }

    #[tokio::test]
    async fn test_adopted_tasks_are_kept_but_never_fire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let overdue = ScheduledTask {
            id: "late0002".to_string(),
            description: "fire later, not now".to_string(),
            trigger: Trigger::at(Utc::now() - Duration::hours(1)),
            created_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(&path, serde_json::to_string(&vec![overdue]).unwrap()).unwrap();

        let (scheduler, mut rx) = Scheduler::new(Some(path.clone()));
        assert_eq!(scheduler.adopt().unwrap(), 1);
        let far = scheduler.schedule("renew passport", Trigger::at(Utc::now() + Duration::days(30))).unwrap();

        let fired = tokio::time::timeout(StdDuration::from_millis(300), rx.recv()).await;
        assert!(fired.is_err());

        // Both survive the rewrite caused by the new task
        let stored: Vec<ScheduledTask> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let ids: Vec<&str> = stored.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["late0002", far.id.as_str()]);
        scheduler.cancel(&far.id).unwrap();
    }

    #[tokio::test]
    async fn test_overdue_task_fires_on_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let overdue = ScheduledTask {
            id: "late0001".to_string(),
            description: "missed while offline".to_string(),
            trigger: Trigger::at(Utc::now() - Duration::hours(1)),
            created_at: Utc::now() - Duration::hours(2),
        };
        std::fs::write(&path, serde_json::to_string(&vec![overdue]).unwrap()).unwrap();

        let (scheduler, mut rx) = Scheduler::new(Some(path));
        scheduler.restore().unwrap();
        let fired = tokio::time::timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.id, "late0001");
    }
}
