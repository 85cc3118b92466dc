//! Executor: drives every task of a run against one target
//!
//! Waves run one after another. Inside a wave up to `concurrency` tasks
//! hold a slot at the same time; a task waiting out a NotReady backoff
//! gives its slot back. A task whose dependency did not succeed is
//! blocked without ever taking a slot.

use crate::cache::FoundStateCache;
use crate::changeset::{ChangeKind, Changeset};
use crate::config::RunConfig;
use crate::error::{Result, TaskError};
use crate::graph::TaskGraph;
use crate::provider::{CloudProvider, RetryConfig};
use crate::report::{RunReport, TaskReport, TaskState};
use crate::resolve::{Produced, ProducedMap, Resolver};
use crate::target::{ApplyRequest, LiveTarget, Target};
use crate::task::{Lifecycle, ResourceId, SharedTask, TaskName};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

pub struct Executor {
    target: Arc<dyn Target>,
    provider: Option<Arc<dyn CloudProvider>>,
    config: RunConfig,
}

/// Shared by every task of one run
struct RunContext {
    target: Arc<dyn Target>,
    cache: FoundStateCache,
    graph: TaskGraph,
    lifecycles: HashMap<TaskName, Lifecycle>,
    slots: Semaphore,
    deadline: Instant,
    retry: RetryConfig,
}

struct TaskOutcome {
    name: TaskName,
    report: TaskReport,
    produced: Option<Produced>,
}

impl Executor {
    /// Executor without a provider: every resource is treated as absent
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self {
            target,
            provider: None,
            config: RunConfig::default(),
        }
    }

    /// Executor applying changes through `provider`
    pub fn live(provider: Arc<dyn CloudProvider>) -> Self {
        Self::new(Arc::new(LiveTarget::new(provider.clone()))).with_provider(provider)
    }

    /// Provider consulted for actual state
    pub fn with_provider(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub async fn run(&self, tasks: Vec<SharedTask>) -> Result<RunReport> {
        self.config.validate()?;
        self.target.begin();
        let started_at = Utc::now();

        let selected = tasks
            .into_iter()
            .filter(|task| self.config.includes(task.as_ref()));
        let graph = TaskGraph::build(selected)?;
        let waves = graph.waves();
        let lifecycles = graph
            .tasks()
            .map(|task| {
                (
                    task.name().clone(),
                    self.config.effective_lifecycle(task.as_ref()),
                )
            })
            .collect();

        tracing::info!(
            target_kind = %self.target.kind(),
            tasks = graph.len(),
            waves = waves.len(),
            concurrency = self.config.concurrency,
            "starting run"
        );

        let ctx = Arc::new(RunContext {
            target: self.target.clone(),
            cache: FoundStateCache::new(self.provider.clone()),
            graph,
            lifecycles,
            slots: Semaphore::new(self.config.concurrency),
            deadline: Instant::now() + self.config.deadline(),
            retry: self.config.retry.clone(),
        });

        let mut reports: BTreeMap<TaskName, TaskReport> = waves
            .iter()
            .enumerate()
            .flat_map(|(index, wave)| {
                wave.iter()
                    .map(move |name| (name.clone(), TaskReport::new(index)))
            })
            .collect();
        let mut produced = ProducedMap::new();

        for (index, wave) in waves.iter().enumerate() {
            if Instant::now() >= ctx.deadline {
                tracing::warn!(
                    wave = index,
                    "run deadline exceeded; remaining waves not started"
                );
                for name in waves[index..].iter().flatten() {
                    if let Some(report) = reports.get_mut(name) {
                        report.transition(TaskState::TimedOut);
                        report.error = Some("run deadline exceeded before the task started".into());
                    }
                }
                break;
            }

            tracing::info!(wave = index, tasks = wave.len(), "starting wave");
            let snapshot = Arc::new(produced.clone());
            let mut set = JoinSet::new();
            let mut spawned = HashMap::new();

            for name in wave {
                let failed_dependency = ctx
                    .graph
                    .dependencies(name)
                    .find(|dep| reports.get(*dep).is_none_or(|r| !r.state.is_success()))
                    .cloned();
                if let Some(dep) = failed_dependency {
                    tracing::debug!(task = %name, dependency = %dep, "blocked");
                    if let Some(report) = reports.get_mut(name) {
                        report.transition(TaskState::Blocked);
                        report.error = Some(format!("dependency {dep} did not complete"));
                    }
                    continue;
                }

                let handle = set.spawn(run_task(
                    ctx.clone(),
                    name.clone(),
                    index,
                    snapshot.clone(),
                ));
                spawned.insert(handle.id(), name.clone());
            }

            while let Some(joined) = set.join_next_with_id().await {
                match joined {
                    Ok((_, outcome)) => {
                        if let Some(out) = outcome.produced {
                            produced.insert(outcome.name.clone(), out);
                        }
                        reports.insert(outcome.name, outcome.report);
                    }
                    Err(err) => {
                        let Some(name) = spawned.get(&err.id()) else {
                            continue;
                        };
                        tracing::error!(task = %name, error = %err, "task aborted");
                        if let Some(report) = reports.get_mut(name) {
                            report.state = TaskState::Failed;
                            report.history.push(TaskState::Failed);
                            report.error = Some(format!("task aborted: {err}"));
                        }
                    }
                }
            }
            tracing::info!(wave = index, "wave finished");
        }

        let mut report = RunReport {
            target: self.target.kind(),
            started_at,
            finished_at: Utc::now(),
            waves,
            tasks: reports,
            artifact: None,
        };

        if report.is_success() {
            let artifact = self.target.finish().await?;
            if let Some(dir) = &self.config.out_dir {
                if !artifact.is_empty() {
                    artifact.write_to(dir).await?;
                    tracing::info!(dir = %dir.display(), files = artifact.len(), "wrote artifact");
                }
            }
            report.artifact = Some(artifact);
            report.finished_at = Utc::now();
        }

        tracing::info!(
            success = report.is_success(),
            summary = %report.summary(),
            duration_ms = report.duration_ms(),
            "run finished"
        );
        Ok(report)
    }
}

async fn run_task(
    ctx: Arc<RunContext>,
    name: TaskName,
    wave: usize,
    produced: Arc<ProducedMap>,
) -> TaskOutcome {
    let started = Instant::now();
    let mut report = TaskReport::new(wave);
    let produced = drive(&ctx, &name, &produced, &mut report).await;
    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    TaskOutcome {
        name,
        report,
        produced,
    }
}

/// Attempt loop of one task: diff and apply, retrying NotReady
async fn drive(
    ctx: &RunContext,
    name: &TaskName,
    produced: &ProducedMap,
    report: &mut TaskReport,
) -> Option<Produced> {
    let Some(task) = ctx.graph.task(name) else {
        report.transition(TaskState::Diffing);
        fail(report, TaskError::Render(format!("task {name} is not in the graph")));
        return None;
    };
    let lifecycle = ctx.lifecycles.get(name).copied().unwrap_or(task.lifecycle());
    let id = task.resource_id();

    loop {
        let Ok(permit) = ctx.slots.acquire().await else {
            report.transition(TaskState::TimedOut);
            report.error = Some("run closed".into());
            return None;
        };
        if Instant::now() >= ctx.deadline {
            report.transition(TaskState::TimedOut);
            report.error = Some("run deadline exceeded".into());
            return None;
        }

        report.attempts += 1;
        report.transition(TaskState::Diffing);
        tracing::debug!(task = %name, attempt = report.attempts, "diffing");

        let err = match attempt(ctx, task, &id, lifecycle, produced, report).await {
            Ok(out) => return Some(out),
            Err(err) => err,
        };
        drop(permit);

        if !err.is_transient() {
            tracing::warn!(task = %name, error = %err, "task failed");
            fail(report, err);
            return None;
        }

        report.transition(TaskState::Pending);
        let delay = ctx.retry.delay_for_attempt(report.attempts - 1);
        if report.attempts >= ctx.retry.max_attempts {
            tracing::warn!(task = %name, attempts = report.attempts, "giving up on task");
            report.transition(TaskState::TimedOut);
            report.error = Some(
                TaskError::TimedOut(format!("gave up after {} attempts: {err}", report.attempts))
                    .to_string(),
            );
            return None;
        }
        if Instant::now() + delay >= ctx.deadline {
            tracing::warn!(task = %name, "run deadline reached while waiting");
            report.transition(TaskState::TimedOut);
            report.error = Some(
                TaskError::TimedOut(format!("run deadline reached while waiting: {err}")).to_string(),
            );
            return None;
        }

        tracing::warn!(
            task = %name,
            attempt = report.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "task not ready; retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn attempt(
    ctx: &RunContext,
    task: &SharedTask,
    id: &ResourceId,
    lifecycle: Lifecycle,
    produced: &ProducedMap,
    report: &mut TaskReport,
) -> std::result::Result<Produced, TaskError> {
    let actual = ctx.cache.find(id).await?;
    let desired = Resolver::new(ctx.target.as_ref(), &ctx.graph, produced).payload(task.as_ref())?;
    let changeset = Changeset::compute(&desired, actual.as_ref(), lifecycle);
    report.change = Some(changeset.kind);
    report.changed_fields = changeset.changed_fields();

    let external = lifecycle != Lifecycle::Sync && actual.is_some();
    if changeset.kind == ChangeKind::Forbidden {
        return Err(TaskError::LifecycleViolation {
            task: task.name().clone(),
            reason: changeset.reason.unwrap_or_default(),
        });
    }
    if !changeset.has_changes() && !ctx.target.renders_unchanged() {
        report.transition(TaskState::NoOpDone);
        let outputs = actual.map(|a| a.outputs).unwrap_or_default();
        report.outputs = outputs.clone();
        return Ok(Produced { outputs, external });
    }

    report.transition(TaskState::ChangesPending);
    report.transition(TaskState::Applying);
    tracing::debug!(task = %task.name(), change = %changeset.kind, "applying");

    let outputs = ctx
        .target
        .apply(&ApplyRequest {
            task: task.as_ref(),
            id,
            lifecycle,
            desired: &desired,
            actual: actual.as_ref(),
            changeset: &changeset,
        })
        .await?;

    report.transition(TaskState::Done);
    report.outputs = outputs.clone();
    Ok(Produced { outputs, external })
}

fn fail(report: &mut TaskReport, err: TaskError) {
    report.transition(TaskState::Failed);
    report.error = Some(err.to_string());
}
