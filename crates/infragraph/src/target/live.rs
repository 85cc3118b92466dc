use super::{ApplyRequest, Producer, Target, TargetKind, literal_output};
use crate::changeset::ChangeKind;
use crate::error::TaskError;
use crate::provider::CloudProvider;
use crate::task::{Lifecycle, Outputs, ValueRef};
use async_trait::async_trait;
use std::sync::Arc;

/// Applies changes through the provider API
pub struct LiveTarget {
    provider: Arc<dyn CloudProvider>,
}

impl LiveTarget {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }
}

#[async_trait]
impl Target for LiveTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Live
    }

    fn resolve_reference(
        &self,
        reference: &ValueRef,
        producer: &Producer<'_>,
    ) -> Result<serde_json::Value, TaskError> {
        literal_output(reference, producer)
    }

    async fn apply(&self, request: &ApplyRequest<'_>) -> Result<Outputs, TaskError> {
        let changes = request.changeset;
        match changes.kind {
            ChangeKind::Create => {
                tracing::info!(resource = %request.id, provider = self.provider.name(), "creating");
                Ok(self.provider.create(request.id, request.desired).await?)
            }
            ChangeKind::Update => {
                if request.lifecycle == Lifecycle::MustExistAndWarnOnDrift {
                    tracing::warn!(
                        resource = %request.id,
                        fields = ?changes.changed_fields(),
                        "existing resource has drifted; applying changes"
                    );
                } else {
                    tracing::info!(resource = %request.id, fields = ?changes.changed_fields(), "updating");
                }
                let mut outputs = request
                    .actual
                    .map(|actual| actual.outputs.clone())
                    .unwrap_or_default();
                outputs.extend(
                    self.provider
                        .update(request.id, request.desired, changes)
                        .await?,
                );
                Ok(outputs)
            }
            ChangeKind::NoChange => Ok(request
                .actual
                .map(|actual| actual.outputs.clone())
                .unwrap_or_default()),
            ChangeKind::Forbidden => Err(TaskError::LifecycleViolation {
                task: request.task.name().clone(),
                reason: changes.reason.clone().unwrap_or_default(),
            }),
        }
    }
}
