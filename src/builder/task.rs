//! One build or install pipeline run and its observable state

use crate::project::Configuration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Number of output lines a task keeps for inspection
const OUTPUT_LOG_LINES: usize = 500;

/// Label shown while a pipeline runs
pub const MODE_BUILDING: &str = "Building…";

/// How a finished task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Succeeded,
    Cancelled,
    Failed,
}

/// Snapshot of a task's mutable state
#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    /// Human-readable status line
    pub mode: String,
    pub running: bool,
    /// Set once the task reached a terminal state
    pub outcome: Option<TaskOutcome>,
    /// Stage currently executing
    pub stage: Option<String>,
    /// Most recent output line
    pub last_line: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single build or install run.
///
/// The install flag and target list are fixed at creation. State is written
/// only by the pipeline driving the task; observers read snapshots or
/// subscribe to changes.
#[derive(Debug)]
pub struct BuildTask {
    id: Uuid,
    configuration: Arc<Configuration>,
    directory: PathBuf,
    install: bool,
    targets: Vec<String>,
    cancel: CancellationToken,
    state: watch::Sender<TaskState>,
    output: Mutex<VecDeque<String>>,
}

impl BuildTask {
    /// Create a running task
    pub fn new(
        configuration: Arc<Configuration>,
        directory: PathBuf,
        install: bool,
        targets: Vec<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(TaskState {
            mode: MODE_BUILDING.to_string(),
            running: true,
            outcome: None,
            stage: None,
            last_line: None,
            started_at: Utc::now(),
            finished_at: None,
        });

        Self {
            id: Uuid::new_v4(),
            configuration,
            directory,
            install,
            targets,
            cancel,
            state,
            output: Mutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Directory the toolchain runs in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether this run installs rather than builds
    pub fn is_install(&self) -> bool {
        self.install
    }

    /// Explicit make targets
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Token aborting the run
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn mode(&self) -> String {
        self.state.borrow().mode.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.state.borrow().outcome
    }

    /// Current state snapshot
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// Retained output lines, oldest first
    pub fn output(&self) -> Vec<String> {
        self.lock_output().iter().cloned().collect()
    }

    pub(crate) fn set_stage(&self, stage: &str) {
        let stage = stage.to_string();
        self.state.send_modify(|state| state.stage = Some(stage));
    }

    pub(crate) fn push_output(&self, line: String) {
        {
            let mut output = self.lock_output();
            if output.len() == OUTPUT_LOG_LINES {
                output.pop_front();
            }
            output.push_back(line.clone());
        }
        self.state.send_modify(|state| state.last_line = Some(line));
    }

    /// Move to a terminal state with the matching status label
    pub(crate) fn finish(&self, outcome: TaskOutcome) {
        let verb = if self.install { "Install" } else { "Build" };
        let mode = match outcome {
            TaskOutcome::Succeeded => format!("{} successful", verb),
            TaskOutcome::Cancelled => format!("{} cancelled", verb),
            TaskOutcome::Failed => format!("{} failed", verb),
        };

        self.state.send_modify(|state| {
            state.mode = mode;
            state.running = false;
            state.outcome = Some(outcome);
            state.stage = None;
            state.finished_at = Some(Utc::now());
        });
    }

    fn lock_output(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
