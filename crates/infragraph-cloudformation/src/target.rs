//! CloudFormation template renderer
//!
//! Every managed task becomes one entry of `Resources`, keyed by a logical
//! id derived from its CloudFormation type and name. Payload keys written
//! in snake_case are converted to the PascalCase CloudFormation expects.

use crate::error::CloudFormationError;
use async_trait::async_trait;
use infragraph::{
    ApplyRequest, Artifact, Outputs, Payload, Producer, ReferenceKind, Target, TargetKind,
    TaskError, TaskName, ValueRef, literal_output,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const TEMPLATE_FILE: &str = "kubernetes.json";

/// Template sections that do not come from tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudFormationOptions {
    /// `AWSTemplateFormatVersion`, e.g. "2010-09-09"
    pub format_version: Option<String>,

    pub description: Option<String>,

    /// Named `Outputs` entries
    pub outputs: BTreeMap<String, ValueRef>,
}

impl CloudFormationOptions {
    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: ValueRef) -> Self {
        self.outputs.insert(name.into(), value);
        self
    }
}

/// Logical id: the type without `::` followed by the alphanumerics of the name
///
/// `AWS::EC2::VPC` + `minimal.example.com` → `AWSEC2VPCminimalexamplecom`
pub fn logical_id(cloudformation_type: &str, name: &str) -> String {
    let mut id = cloudformation_type.replace("::", "");
    id.extend(name.chars().filter(char::is_ascii_alphanumeric));
    id
}

/// `cidr_block` → `CidrBlock`; keys not in snake_case are kept as they are
pub fn pascal_case(key: &str) -> String {
    let snake = key.starts_with(|c: char| c.is_ascii_lowercase())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !snake {
        return key.to_string();
    }
    key.split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn convert_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (pascal_case(k), convert_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(convert_keys).collect()),
        other => other.clone(),
    }
}

/// Resolved payload as CloudFormation `Properties`
pub fn properties(desired: &Payload) -> Map<String, Value> {
    desired
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(key, value)| {
            let converted = match (key.as_str(), value) {
                ("tags", Value::Object(tags)) => Value::Array(
                    tags.iter()
                        .map(|(k, v)| json!({ "Key": k, "Value": v }))
                        .collect(),
                ),
                _ => convert_keys(value),
            };
            (pascal_case(key), converted)
        })
        .collect()
}

struct RenderedResource {
    logical_id: String,
    resource_type: String,
    properties: Map<String, Value>,
    depends_on: Vec<TaskName>,
}

#[derive(Default)]
struct Template {
    resources: BTreeMap<TaskName, RenderedResource>,
    logical_ids: BTreeMap<String, TaskName>,
    external: BTreeMap<TaskName, Outputs>,
}

pub struct CloudFormationTarget {
    options: CloudFormationOptions,
    template: Mutex<Template>,
}

impl CloudFormationTarget {
    pub fn new(options: CloudFormationOptions) -> Self {
        Self {
            options,
            template: Mutex::new(Template::default()),
        }
    }

    fn template(&self) -> MutexGuard<'_, Template> {
        self.template.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn output_value(
        &self,
        template: &Template,
        output: &str,
        reference: &ValueRef,
    ) -> crate::Result<Value> {
        if let Some(resource) = template.resources.get(&reference.task) {
            return Ok(reference_expression(&resource.logical_id, &reference.attribute));
        }
        template
            .external
            .get(&reference.task)
            .and_then(|outputs| outputs.get(&reference.attribute))
            .cloned()
            .ok_or_else(|| CloudFormationError::UnknownOutput {
                output: output.to_string(),
                task: reference.task.to_string(),
            })
    }
}

impl Default for CloudFormationTarget {
    fn default() -> Self {
        Self::new(CloudFormationOptions::default())
    }
}

fn reference_expression(logical_id: &str, attribute: &str) -> Value {
    if attribute == "id" {
        json!({ "Ref": logical_id })
    } else {
        json!({ "Fn::GetAtt": [logical_id, pascal_case(attribute)] })
    }
}

fn resource_type<'a>(task: &'a dyn infragraph::Task) -> crate::Result<&'a str> {
    task.kind()
        .cloudformation_type()
        .ok_or_else(|| CloudFormationError::MissingType {
            task: task.name().to_string(),
            kind: task.kind().name().to_string(),
        })
}

#[async_trait]
impl Target for CloudFormationTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::CloudFormation
    }

    fn begin(&self) {
        *self.template() = Template::default();
    }

    fn renders_unchanged(&self) -> bool {
        true
    }

    fn resolve_reference(
        &self,
        reference: &ValueRef,
        producer: &Producer<'_>,
    ) -> Result<Value, TaskError> {
        if producer.external {
            return literal_output(reference, producer);
        }
        let resource_type = resource_type(producer.task)?;
        let id = logical_id(resource_type, producer.task.name().as_str());
        Ok(reference_expression(&id, &reference.attribute))
    }

    async fn apply(&self, request: &ApplyRequest<'_>) -> Result<Outputs, TaskError> {
        let name = request.task.name();
        let mut template = self.template();

        if request.is_external() {
            tracing::debug!(resource = %request.id, "shared resource; not rendered");
            let outputs = request
                .actual
                .map(|actual| actual.outputs.clone())
                .unwrap_or_default();
            template.external.insert(name.clone(), outputs.clone());
            return Ok(outputs);
        }

        let resource_type = resource_type(request.task)?.to_string();
        let id = logical_id(&resource_type, name.as_str());
        if let Some(owner) = template.logical_ids.get(&id) {
            if owner != name {
                return Err(CloudFormationError::NameCollision {
                    logical_id: id,
                    first: owner.to_string(),
                    second: name.to_string(),
                }
                .into());
            }
        }

        let depends_on = request
            .task
            .references()
            .into_iter()
            .filter(|r| r.kind == ReferenceKind::Ordering)
            .map(|r| r.task)
            .collect();

        tracing::debug!(resource = %request.id, logical_id = %id, "rendered");
        template.logical_ids.insert(id.clone(), name.clone());
        template.resources.insert(
            name.clone(),
            RenderedResource {
                logical_id: id,
                resource_type,
                properties: properties(request.desired),
                depends_on,
            },
        );
        Ok(Outputs::new())
    }

    async fn finish(&self) -> infragraph::Result<Artifact> {
        let template = std::mem::take(&mut *self.template());

        let mut resources = Map::new();
        for resource in template.resources.values() {
            let mut entry = Map::new();
            entry.insert("Type".into(), json!(resource.resource_type));
            entry.insert("Properties".into(), Value::Object(resource.properties.clone()));

            let mut depends_on: Vec<&str> = resource
                .depends_on
                .iter()
                .filter_map(|dep| template.resources.get(dep))
                .map(|dep| dep.logical_id.as_str())
                .collect();
            depends_on.sort_unstable();
            if !depends_on.is_empty() {
                entry.insert("DependsOn".into(), json!(depends_on));
            }
            resources.insert(resource.logical_id.clone(), Value::Object(entry));
        }

        let mut outputs = Map::new();
        for (name, reference) in &self.options.outputs {
            let value = self.output_value(&template, name, reference)?;
            outputs.insert(name.clone(), json!({ "Value": value }));
        }

        let mut document = Map::new();
        if let Some(version) = &self.options.format_version {
            document.insert("AWSTemplateFormatVersion".into(), json!(version));
        }
        if let Some(description) = &self.options.description {
            document.insert("Description".into(), json!(description));
        }
        if !outputs.is_empty() {
            document.insert("Outputs".into(), Value::Object(outputs));
        }
        document.insert("Resources".into(), Value::Object(resources));

        let mut rendered = serde_json::to_string_pretty(&Value::Object(document))?;
        rendered.push('\n');

        tracing::info!(
            resources = template.resources.len(),
            "rendered cloudformation template"
        );
        let mut artifact = Artifact::new();
        artifact.insert(TEMPLATE_FILE, rendered);
        Ok(artifact)
    }
}
