//! Run configuration

use crate::error::{EngineError, Result};
use crate::provider::RetryConfig;
use crate::task::{Lifecycle, Phase, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Options for one execution of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Tasks of one wave running at the same time
    pub concurrency: usize,

    /// Wall-clock budget for the whole run (milliseconds)
    pub deadline_ms: u64,

    /// Backoff for tasks reporting NotReady
    pub retry: RetryConfig,

    /// Run only up to this phase
    pub phase: Option<Phase>,

    /// Lifecycle forced onto every task of a resource kind
    pub lifecycle_overrides: BTreeMap<String, Lifecycle>,

    /// Directory the rendered artifact is written to
    pub out_dir: Option<PathBuf>,
}

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_DEADLINE_MS: u64 = 10 * 60 * 1000;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline_ms: DEFAULT_DEADLINE_MS,
            retry: RetryConfig::default(),
            phase: None,
            lifecycle_overrides: BTreeMap::new(),
            out_dir: None,
        }
    }
}

impl RunConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_lifecycle_override(mut self, kind: impl Into<String>, lifecycle: Lifecycle) -> Self {
        self.lifecycle_overrides.insert(kind.into(), lifecycle);
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    /// Whether the task takes part in this run at all
    pub fn includes(&self, task: &dyn Task) -> bool {
        self.phase.is_none_or(|phase| task.phase() <= phase)
    }

    /// Lifecycle the task runs with: an override for its kind wins, then
    /// tasks of a phase before the selected one are verify-only.
    pub fn effective_lifecycle(&self, task: &dyn Task) -> Lifecycle {
        if let Some(lifecycle) = self.lifecycle_overrides.get(task.kind().name()) {
            return *lifecycle;
        }
        match self.phase {
            Some(phase) if task.phase() < phase => Lifecycle::MustExistAndVerify,
            _ => task.lifecycle(),
        }
    }
}
