//! Targets: where the executor sends every task
//!
//! A run has exactly one target, chosen when the executor is constructed.
//! The executor drives every target through the same calls in the same
//! order; only what a target does with them differs.

mod dry_run;
mod live;

pub use dry_run::{DryRunTarget, PlannedChange};
pub use live::LiveTarget;

use crate::artifact::Artifact;
use crate::changeset::Changeset;
use crate::error::{ParseError, Result, TaskError};
use crate::provider::ActualState;
use crate::task::{Asset, Lifecycle, Outputs, Payload, ResourceId, Task, ValueRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Mutate the cloud through the provider API
    Live,
    /// Compute and record changes without mutating anything
    DryRun,
    /// Render a Terraform JSON configuration
    Terraform,
    /// Render a CloudFormation template
    CloudFormation,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Live => "live",
            TargetKind::DryRun => "dry_run",
            TargetKind::Terraform => "terraform",
            TargetKind::CloudFormation => "cloudformation",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "live" | "direct" => Ok(TargetKind::Live),
            "dry_run" | "dryrun" | "plan" => Ok(TargetKind::DryRun),
            "terraform" => Ok(TargetKind::Terraform),
            "cloudformation" => Ok(TargetKind::CloudFormation),
            _ => Err(ParseError::new("target", s)),
        }
    }
}

/// A completed task whose outputs another task references
pub struct Producer<'a> {
    pub task: &'a dyn Task,

    /// Output attributes the producer published
    pub outputs: &'a Outputs,

    /// The producer is a pre-existing resource this run does not manage
    pub external: bool,
}

/// Everything a target needs to apply one task
pub struct ApplyRequest<'a> {
    pub task: &'a dyn Task,
    pub id: &'a ResourceId,

    /// Lifecycle after overrides and phase selection
    pub lifecycle: Lifecycle,

    /// Payload with references and assets resolved for this target
    pub desired: &'a Payload,

    pub actual: Option<&'a ActualState>,

    pub changeset: &'a Changeset,
}

impl ApplyRequest<'_> {
    /// A pre-existing resource this run only verifies or adjusts
    pub fn is_external(&self) -> bool {
        self.lifecycle != Lifecycle::Sync && self.actual.is_some()
    }
}

#[async_trait]
pub trait Target: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Called at the start of every run, before any task is resolved.
    /// Targets that collect documents or plans discard the previous run's here.
    fn begin(&self) {}

    /// Whether tasks without changes still reach `apply`. Renderers need
    /// every task, changed or not, to build a complete document.
    fn renders_unchanged(&self) -> bool {
        false
    }

    /// Value substituted for a reference to another task's output
    fn resolve_reference(
        &self,
        reference: &ValueRef,
        producer: &Producer<'_>,
    ) -> std::result::Result<serde_json::Value, TaskError>;

    /// Value substituted for an asset held in `field` of `owner`
    fn resolve_asset(
        &self,
        _owner: &ResourceId,
        _field: &str,
        asset: &Asset,
    ) -> std::result::Result<serde_json::Value, TaskError> {
        Ok(serde_json::Value::String(asset.encoded()))
    }

    /// Apply one task and return the outputs its dependents may read
    async fn apply(&self, request: &ApplyRequest<'_>) -> std::result::Result<Outputs, TaskError>;

    /// Called once after every task succeeded; returns the rendered files
    async fn finish(&self) -> Result<Artifact> {
        Ok(Artifact::new())
    }
}

/// Look up a concrete output value of `producer`
pub fn literal_output(
    reference: &ValueRef,
    producer: &Producer<'_>,
) -> std::result::Result<serde_json::Value, TaskError> {
    producer
        .outputs
        .get(&reference.attribute)
        .cloned()
        .ok_or_else(|| TaskError::MissingOutput {
            producer: reference.task.clone(),
            attribute: reference.attribute.clone(),
        })
}
