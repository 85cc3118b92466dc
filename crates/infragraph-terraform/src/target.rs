//! Terraform JSON renderer
//!
//! Every managed task becomes one `resource` block. References between
//! managed tasks render as `${type.name.attr}` interpolations, and assets are
//! written to `data/` and read back with `file()` or `filebase64()`.

use crate::error::TerraformError;
use async_trait::async_trait;
use infragraph::{
    ApplyRequest, Artifact, AssetEncoding, Outputs, Producer, ReferenceKind, ResourceId, Target,
    TargetKind, TaskError, TaskName, ValueRef, literal_output,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

pub const DOCUMENT_FILE: &str = "kubernetes.tf.json";
pub const DATA_DIR: &str = "data";

/// Blocks of the document that do not come from tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformOptions {
    /// `provider` blocks keyed by provider name
    pub providers: BTreeMap<String, Value>,

    /// `terraform.required_version`
    pub required_version: Option<String>,

    /// `terraform.required_providers`
    pub required_providers: BTreeMap<String, Value>,

    pub locals: BTreeMap<String, Value>,

    /// Named `output` blocks
    pub outputs: BTreeMap<String, ValueRef>,
}

impl TerraformOptions {
    pub fn with_provider(mut self, name: impl Into<String>, config: Value) -> Self {
        self.providers.insert(name.into(), config);
        self
    }

    pub fn with_required_version(mut self, version: impl Into<String>) -> Self {
        self.required_version = Some(version.into());
        self
    }

    pub fn with_required_provider(mut self, name: impl Into<String>, requirement: Value) -> Self {
        self.required_providers.insert(name.into(), requirement);
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: ValueRef) -> Self {
        self.outputs.insert(name.into(), value);
        self
    }
}

/// Terraform resource name for a task name
pub fn tf_name(name: &str) -> String {
    let mut sanitized = name.replace('.', "-").replace('/', "--");
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// File name below `data/` holding the asset in `field` of `owner`
///
/// Path separators in the task name and field are escaped so the file stays
/// directly inside `data/`; dots in the name are kept.
pub fn data_file_name(owner: &ResourceId, field: &str) -> String {
    let name = owner.name.as_str().replace(['/', '\\'], "--");
    let field = field.replace('.', "_").replace(['/', '\\'], "--");
    format!("{}_{}_{}", owner.kind, name, field)
}

struct RenderedResource {
    kind: String,
    tf_name: String,
    body: Map<String, Value>,
    depends_on: Vec<TaskName>,
}

impl RenderedResource {
    fn address(&self) -> String {
        format!("{}.{}", self.kind, self.tf_name)
    }
}

#[derive(Default)]
struct Document {
    resources: BTreeMap<TaskName, RenderedResource>,
    addresses: BTreeMap<(String, String), TaskName>,
    /// Assets seen while resolving, kept until their owner is rendered
    pending_assets: BTreeMap<ResourceId, BTreeMap<String, Vec<u8>>>,
    data: BTreeMap<String, Vec<u8>>,
    external: BTreeMap<TaskName, Outputs>,
}

pub struct TerraformTarget {
    options: TerraformOptions,
    document: Mutex<Document>,
}

impl TerraformTarget {
    pub fn new(options: TerraformOptions) -> Self {
        Self {
            options,
            document: Mutex::new(Document::default()),
        }
    }

    fn document(&self) -> std::sync::MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn output_value(
        &self,
        doc: &Document,
        output: &str,
        reference: &ValueRef,
    ) -> crate::Result<Value> {
        if let Some(resource) = doc.resources.get(&reference.task) {
            return Ok(Value::String(format!(
                "${{{}.{}}}",
                resource.address(),
                reference.attribute
            )));
        }
        doc.external
            .get(&reference.task)
            .and_then(|outputs| outputs.get(&reference.attribute))
            .cloned()
            .ok_or_else(|| TerraformError::UnknownOutput {
                output: output.to_string(),
                task: reference.task.to_string(),
            })
    }
}

impl Default for TerraformTarget {
    fn default() -> Self {
        Self::new(TerraformOptions::default())
    }
}

#[async_trait]
impl Target for TerraformTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Terraform
    }

    fn begin(&self) {
        *self.document() = Document::default();
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
        Ok(Value::String(format!(
            "${{{}.{}.{}}}",
            producer.task.kind().name(),
            tf_name(producer.task.name().as_str()),
            reference.attribute
        )))
    }

    fn resolve_asset(
        &self,
        owner: &ResourceId,
        field: &str,
        asset: &infragraph::Asset,
    ) -> Result<Value, TaskError> {
        let path = format!("{DATA_DIR}/{}", data_file_name(owner, field));
        let mut doc = self.document();
        let assets = doc.pending_assets.entry(owner.clone()).or_default();
        if assets
            .get(&path)
            .is_some_and(|existing| existing.as_slice() != asset.bytes())
        {
            return Err(TerraformError::AssetConflict { path }.into());
        }
        assets.insert(path.clone(), asset.bytes().to_vec());

        let function = match asset.encoding() {
            AssetEncoding::Raw => "file",
            AssetEncoding::Base64 => "filebase64",
        };
        Ok(Value::String(format!(
            "${{{function}(\"${{path.module}}/{path}\")}}"
        )))
    }

    async fn apply(&self, request: &ApplyRequest<'_>) -> Result<Outputs, TaskError> {
        let name = request.task.name();
        let mut doc = self.document();

        if request.is_external() {
            tracing::debug!(resource = %request.id, "shared resource; not rendered");
            let outputs = request
                .actual
                .map(|actual| actual.outputs.clone())
                .unwrap_or_default();
            doc.external.insert(name.clone(), outputs.clone());
            doc.pending_assets.remove(request.id);
            return Ok(outputs);
        }

        let kind = request.task.kind().name().to_string();
        let resource_name = tf_name(name.as_str());
        let address = (kind.clone(), resource_name.clone());
        match doc.addresses.get(&address) {
            Some(owner) if owner != name => {
                return Err(TerraformError::NameCollision {
                    kind,
                    name: resource_name,
                }
                .into());
            }
            _ => {}
        }

        let body = request
            .desired
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let depends_on = request
            .task
            .references()
            .into_iter()
            .filter(|r| r.kind == ReferenceKind::Ordering)
            .map(|r| r.task)
            .collect();

        if let Some(assets) = doc.pending_assets.remove(request.id) {
            for (path, contents) in assets {
                if doc.data.get(&path).is_some_and(|existing| *existing != contents) {
                    return Err(TerraformError::AssetConflict { path }.into());
                }
                doc.data.insert(path, contents);
            }
        }

        tracing::debug!(
            resource = %request.id,
            address = %format!("{kind}.{resource_name}"),
            "rendered"
        );
        doc.addresses.insert(address, name.clone());
        doc.resources.insert(
            name.clone(),
            RenderedResource {
                kind,
                tf_name: resource_name,
                body,
                depends_on,
            },
        );
        Ok(Outputs::new())
    }

    async fn finish(&self) -> infragraph::Result<Artifact> {
        let doc = std::mem::take(&mut *self.document());

        let mut resources: BTreeMap<&str, BTreeMap<&str, Value>> = BTreeMap::new();
        for resource in doc.resources.values() {
            let mut body = resource.body.clone();
            let depends_on: Vec<Value> = resource
                .depends_on
                .iter()
                .filter_map(|dep| doc.resources.get(dep))
                .map(|dep| Value::String(dep.address()))
                .collect();
            if !depends_on.is_empty() {
                body.insert("depends_on".into(), Value::Array(depends_on));
            }
            resources
                .entry(resource.kind.as_str())
                .or_default()
                .insert(resource.tf_name.as_str(), Value::Object(body));
        }

        let mut outputs = BTreeMap::new();
        for (name, reference) in &self.options.outputs {
            let value = self.output_value(&doc, name, reference)?;
            outputs.insert(name.as_str(), json!({ "value": value }));
        }

        let mut terraform = Map::new();
        if let Some(version) = &self.options.required_version {
            terraform.insert("required_version".into(), json!(version));
        }
        if !self.options.required_providers.is_empty() {
            terraform.insert(
                "required_providers".into(),
                json!(self.options.required_providers),
            );
        }

        let mut document = Map::new();
        if !self.options.locals.is_empty() {
            document.insert("locals".into(), json!(self.options.locals));
        }
        if !outputs.is_empty() {
            document.insert("output".into(), json!(outputs));
        }
        if !self.options.providers.is_empty() {
            document.insert("provider".into(), json!(self.options.providers));
        }
        if !resources.is_empty() {
            document.insert("resource".into(), json!(resources));
        }
        if !terraform.is_empty() {
            document.insert("terraform".into(), Value::Object(terraform));
        }

        let mut rendered = serde_json::to_string_pretty(&Value::Object(document))?;
        rendered.push('\n');

        let mut artifact = Artifact::new();
        artifact.insert(DOCUMENT_FILE, rendered);
        for (path, contents) in &doc.data {
            artifact.insert(path.clone(), contents.clone());
        }
        tracing::info!(
            resources = doc.resources.len(),
            data_files = doc.data.len(),
            "rendered terraform document"
        );
        Ok(artifact)
    }
}
