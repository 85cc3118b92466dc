//! Run report: every task's terminal state and the run summary

use crate::artifact::Artifact;
use crate::changeset::ChangeKind;
use crate::target::TargetKind;
use crate::task::{Outputs, TaskName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-task execution state
///
/// ```text
/// Pending → Diffing → NoOpDone
///                   → ChangesPending → Applying → Done
/// Failed, Blocked and TimedOut are terminal from any earlier state.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Diffing,
    NoOpDone,
    ChangesPending,
    Applying,
    Done,
    Failed,
    Blocked,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::NoOpDone
                | TaskState::Done
                | TaskState::Failed
                | TaskState::Blocked
                | TaskState::TimedOut
        )
    }

    /// Terminal and successful; dependents may run
    pub fn is_success(self) -> bool {
        matches!(self, TaskState::NoOpDone | TaskState::Done)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, Diffing | Blocked | TimedOut) => true,
            (Diffing, NoOpDone | ChangesPending | Pending | Failed | TimedOut) => true,
            (ChangesPending, Applying | Failed | TimedOut) => true,
            (Applying, Done | Pending | Failed | TimedOut) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Diffing => "diffing",
            TaskState::NoOpDone => "no-op",
            TaskState::ChangesPending => "changes-pending",
            TaskState::Applying => "applying",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
            TaskState::Blocked => "blocked",
            TaskState::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Outcome of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Wave the task was scheduled in
    pub wave: usize,

    /// Terminal state
    pub state: TaskState,

    /// Every state the task went through, starting with Pending
    pub history: Vec<TaskState>,

    /// Diff attempts made (1 unless NotReady was retried)
    pub attempts: u32,

    /// Classification of the last computed changeset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Output attributes published to dependents
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,

    /// Time spent between the first attempt and the terminal state
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn new(wave: usize) -> Self {
        Self {
            wave,
            state: TaskState::Pending,
            history: vec![TaskState::Pending],
            attempts: 0,
            change: None,
            changed_fields: Vec::new(),
            error: None,
            outputs: Outputs::new(),
            duration_ms: 0,
        }
    }

    /// Move to `next`, recording it in the history
    pub fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
    }

    pub fn entered(&self, state: TaskState) -> bool {
        self.history.contains(&state)
    }
}

/// Aggregated result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub target: TargetKind,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Task names per wave, in execution order
    pub waves: Vec<Vec<TaskName>>,

    pub tasks: BTreeMap<TaskName, TaskReport>,

    /// Rendered files; only present for a successful run
    #[serde(skip)]
    pub artifact: Option<Artifact>,
}

impl RunReport {
    /// The run fails if any task ended Failed, Blocked or TimedOut
    pub fn is_success(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_success())
    }

    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.get(&TaskName::from(name))
    }

    pub fn tasks_in(&self, state: TaskState) -> Vec<&TaskName> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.state == state)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for task in self.tasks.values() {
            match (task.state, task.change) {
                (TaskState::Done, Some(ChangeKind::Create)) => summary.created += 1,
                (TaskState::Done, Some(ChangeKind::Update)) => summary.updated += 1,
                (TaskState::Done | TaskState::NoOpDone, _) => summary.unchanged += 1,
                (TaskState::Failed, _) => summary.failed += 1,
                (TaskState::Blocked, _) => summary.blocked += 1,
                (TaskState::TimedOut, _) => summary.timed_out += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Counts of task outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub blocked: usize,
    pub timed_out: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} failed, {} blocked, {} timed out",
            self.created, self.updated, self.unchanged, self.failed, self.blocked, self.timed_out
        )
    }
}
