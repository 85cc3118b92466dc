//! Error types for graph construction, task execution and whole runs

use crate::task::TaskName;
use thiserror::Error;

/// Configuration errors detected while building the task graph.
///
/// All of these are fatal and raised before any task executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task name: {0}")]
    DuplicateIdentity(TaskName),

    #[error("Task {task} references unknown task {reference}")]
    UnknownReference { task: TaskName, reference: TaskName },

    #[error("Task {task} reads an output of {reference} without declaring it as a reference")]
    UndeclaredReference { task: TaskName, reference: TaskName },

    #[error("Dependency cycle: {}", join_cycle(.tasks))]
    Cycle { tasks: Vec<TaskName> },
}

fn join_cycle(tasks: &[TaskName]) -> String {
    let mut names: Vec<&str> = tasks.iter().map(TaskName::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}

/// Errors raised while a single task is diffed or applied.
///
/// Only `NotReady` is transient; the executor retries it with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Lifecycle violation for {task}: {reason}")]
    LifecycleViolation { task: TaskName, reason: String },

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Task {producer} has no output attribute {attribute}")]
    MissingOutput {
        producer: TaskName,
        attribute: String,
    },

    #[error("Timed out: {0}")]
    TimedOut(String),
}

impl TaskError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::NotReady(_))
    }
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A string that does not name a known lifecycle, phase or target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {what}: {value}")]
pub struct ParseError {
    pub what: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
