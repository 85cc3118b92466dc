use super::{ApplyRequest, Producer, Target, TargetKind};
use crate::artifact::Artifact;
use crate::changeset::Changeset;
use crate::error::{Result, TaskError};
use crate::task::{Lifecycle, Outputs, ResourceId, TaskName, ValueRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

pub const PLAN_FILE: &str = "plan.json";

/// One change the dry run would have made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub resource: ResourceId,
    pub lifecycle: Lifecycle,
    pub changeset: Changeset,
}

/// Records changesets without mutating anything
///
/// Outputs of resources that already exist are passed on as found;
/// anything only known after a real apply becomes a placeholder string.
#[derive(Default)]
pub struct DryRunTarget {
    changes: Mutex<BTreeMap<TaskName, PlannedChange>>,
}

impl DryRunTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded changes, sorted by task name
    pub fn changes(&self) -> BTreeMap<TaskName, PlannedChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn placeholder(reference: &ValueRef) -> String {
        format!("(known after apply: {reference})")
    }
}

#[async_trait]
impl Target for DryRunTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::DryRun
    }

    fn begin(&self) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn resolve_reference(
        &self,
        reference: &ValueRef,
        producer: &Producer<'_>,
    ) -> std::result::Result<serde_json::Value, TaskError> {
        Ok(producer
            .outputs
            .get(&reference.attribute)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::String(Self::placeholder(reference))))
    }

    async fn apply(&self, request: &ApplyRequest<'_>) -> std::result::Result<Outputs, TaskError> {
        tracing::info!(
            resource = %request.id,
            change = %request.changeset.kind,
            fields = ?request.changeset.changed_fields(),
            "would apply"
        );
        let planned = PlannedChange {
            resource: request.id.clone(),
            lifecycle: request.lifecycle,
            changeset: request.changeset.clone(),
        };
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.task.name().clone(), planned);

        Ok(request
            .actual
            .map(|actual| actual.outputs.clone())
            .unwrap_or_default())
    }

    async fn finish(&self) -> Result<Artifact> {
        let mut json = serde_json::to_string_pretty(&self.changes())?;
        json.push('\n');
        let mut artifact = Artifact::new();
        artifact.insert(PLAN_FILE, json);
        Ok(artifact)
    }
}
