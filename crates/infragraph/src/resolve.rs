//! Reference and asset resolution
//!
//! Turns a task's properties into a payload for the active target. Each
//! reference is handed to the target together with the producing task, so
//! live runs see real output values and renderers see symbolic expressions.

use crate::error::TaskError;
use crate::graph::TaskGraph;
use crate::target::{Producer, Target};
use crate::task::{Outputs, Payload, Property, ResourceId, Task, TaskName};
use serde_json::Value;
use std::collections::HashMap;

/// Outputs a finished task published for its dependents
#[derive(Debug, Clone, Default)]
pub struct Produced {
    pub outputs: Outputs,
    pub external: bool,
}

pub type ProducedMap = HashMap<TaskName, Produced>;

pub struct Resolver<'a> {
    target: &'a dyn Target,
    graph: &'a TaskGraph,
    produced: &'a ProducedMap,
}

impl<'a> Resolver<'a> {
    pub fn new(target: &'a dyn Target, graph: &'a TaskGraph, produced: &'a ProducedMap) -> Self {
        Self {
            target,
            graph,
            produced,
        }
    }

    pub fn payload(&self, task: &dyn Task) -> Result<Payload, TaskError> {
        let owner = task.resource_id();
        task.properties()
            .iter()
            .map(|(key, property)| -> Result<(String, Value), TaskError> {
                Ok((key.clone(), self.value(&owner, key, property)?))
            })
            .collect()
    }

    /// `path` names the field inside the payload: `key`, `key.sub`, `key.0`
    fn value(&self, owner: &ResourceId, path: &str, property: &Property) -> Result<Value, TaskError> {
        Ok(match property {
            Property::Null => Value::Null,
            Property::Bool(b) => Value::Bool(*b),
            Property::Int(n) => Value::from(*n),
            Property::String(s) => Value::String(s.clone()),
            Property::List(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.value(owner, &format!("{path}.{i}"), item))
                    .collect::<Result<_, _>>()?,
            ),
            Property::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| -> Result<(String, Value), TaskError> {
                        Ok((k.clone(), self.value(owner, &format!("{path}.{k}"), v)?))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Property::Ref(reference) => {
                let missing = || TaskError::MissingOutput {
                    producer: reference.task.clone(),
                    attribute: reference.attribute.clone(),
                };
                let task = self.graph.task(&reference.task).ok_or_else(missing)?;
                let produced = self.produced.get(&reference.task).ok_or_else(missing)?;
                let producer = Producer {
                    task: task.as_ref(),
                    outputs: &produced.outputs,
                    external: produced.external,
                };
                self.target.resolve_reference(reference, &producer)?
            }
            Property::Asset(asset) => self.target.resolve_asset(owner, path, asset)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{DryRunTarget, LiveTarget};
    use crate::task::{Asset, ResourceKind, ResourceTask, SharedTask, ValueRef};
    use serde_json::json;

    fn tasks() -> (SharedTask, SharedTask) {
        let vpc = ResourceTask::new("vpc", ResourceKind::new("aws_vpc")).shared();
        let subnet = ResourceTask::new("subnet", ResourceKind::new("aws_subnet"))
            .property("vpc_id", ValueRef::id("vpc"))
            .property("tags", Property::map([("Name", "subnet")]))
            .property(
                "user_data",
                Property::list([Property::Asset(Asset::base64("#!/bin/sh"))]),
            )
            .shared();
        (vpc, subnet)
    }

    #[test]
    fn dry_run_uses_placeholder_for_unknown_outputs() {
        let (vpc, subnet) = tasks();
        let graph = TaskGraph::build(vec![vpc, subnet.clone()]).unwrap();
        let mut produced = ProducedMap::new();
        produced.insert("vpc".into(), Produced::default());

        let target = DryRunTarget::new();
        let payload = Resolver::new(&target, &graph, &produced)
            .payload(subnet.as_ref())
            .unwrap();

        assert_eq!(payload["vpc_id"], json!("(known after apply: vpc.id)"));
        assert_eq!(payload["tags"], json!({"Name": "subnet"}));
        assert_eq!(payload["user_data"], json!(["IyEvYmluL3No"]));
    }

    #[test]
    fn missing_output_is_reported() {
        struct NoProvider;

        #[async_trait::async_trait]
        impl crate::provider::CloudProvider for NoProvider {
            fn name(&self) -> &str {
                "none"
            }
            async fn find(
                &self,
                _: &ResourceId,
            ) -> Result<Option<crate::provider::ActualState>, crate::provider::ProviderError>
            {
                Ok(None)
            }
            async fn create(
                &self,
                _: &ResourceId,
                _: &Payload,
            ) -> Result<Outputs, crate::provider::ProviderError> {
                Ok(Outputs::new())
            }
            async fn update(
                &self,
                _: &ResourceId,
                _: &Payload,
                _: &crate::changeset::Changeset,
            ) -> Result<Outputs, crate::provider::ProviderError> {
                Ok(Outputs::new())
            }
        }

        let (vpc, subnet) = tasks();
        let graph = TaskGraph::build(vec![vpc, subnet.clone()]).unwrap();
        let mut produced = ProducedMap::new();
        produced.insert("vpc".into(), Produced::default());

        let target = LiveTarget::new(std::sync::Arc::new(NoProvider));
        let err = Resolver::new(&target, &graph, &produced)
            .payload(subnet.as_ref())
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::MissingOutput {
                producer: "vpc".into(),
                attribute: "id".into(),
            }
        );
    }
}
