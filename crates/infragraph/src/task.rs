//! Task model: identity, lifecycle, references and desired-state payload

use crate::error::ParseError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Resolved desired state handed to a target (references and assets substituted)
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Output attributes a task publishes once it has been applied
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// Unstructured desired state of a task, before reference resolution
pub type Properties = BTreeMap<String, Property>;

/// Name of a task, unique within one run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskName(String);

impl TaskName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TaskName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// How the engine treats pre-existing, absent and drifted actual state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Create when absent, update on drift
    #[default]
    Sync,
    /// Must already exist; drift is corrected
    MustExist,
    /// Must already exist; drift is logged and still corrected
    MustExistAndWarnOnDrift,
    /// Must already exist and match; never mutated
    MustExistAndVerify,
}

impl Lifecycle {
    pub fn allows_create(self) -> bool {
        matches!(self, Lifecycle::Sync)
    }

    pub fn allows_update(self) -> bool {
        !matches!(self, Lifecycle::MustExistAndVerify)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Sync => "Sync",
            Lifecycle::MustExist => "MustExist",
            Lifecycle::MustExistAndWarnOnDrift => "MustExistAndWarnOnDrift",
            Lifecycle::MustExistAndVerify => "MustExistAndVerify",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Lifecycle::Sync,
            Lifecycle::MustExist,
            Lifecycle::MustExistAndWarnOnDrift,
            Lifecycle::MustExistAndVerify,
        ];
        all.into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::new("lifecycle", s))
    }
}

/// Coarse ordering of cluster infrastructure, used to run a subset of tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Network,
    Security,
    #[default]
    Cluster,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Network => write!(f, "network"),
            Phase::Security => write!(f, "security"),
            Phase::Cluster => write!(f, "cluster"),
        }
    }
}

impl FromStr for Phase {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(Phase::Network),
            "security" => Ok(Phase::Security),
            "cluster" => Ok(Phase::Cluster),
            _ => Err(ParseError::new("phase", s)),
        }
    }
}

/// Resource kind of a task (e.g. "aws_vpc"), with its CloudFormation type if it has one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    name: String,
    cloudformation_type: Option<String>,
}

impl ResourceKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloudformation_type: None,
        }
    }

    pub fn with_cloudformation(mut self, cloudformation_type: impl Into<String>) -> Self {
        self.cloudformation_type = Some(cloudformation_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cloudformation_type(&self) -> Option<&str> {
        self.cloudformation_type.as_deref()
    }
}

/// Identity of the cloud object a task manages; key of the found-state cache
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub name: TaskName,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<TaskName>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Reference to an output attribute of another task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRef {
    pub task: TaskName,
    pub attribute: String,
}

impl ValueRef {
    pub fn new(task: impl Into<TaskName>, attribute: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            attribute: attribute.into(),
        }
    }

    /// Reference to the provider-assigned identifier of `task`
    pub fn id(task: impl Into<TaskName>) -> Self {
        Self::new(task, "id")
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task, self.attribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Only ordering: the referenced task must complete first
    Ordering,
    /// The referenced task's output is part of this task's payload
    Value,
}

/// A graph edge declared by a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub task: TaskName,
    pub kind: ReferenceKind,
}

impl Reference {
    pub fn ordering(task: impl Into<TaskName>) -> Self {
        Self {
            task: task.into(),
            kind: ReferenceKind::Ordering,
        }
    }

    pub fn value(task: impl Into<TaskName>) -> Self {
        Self {
            task: task.into(),
            kind: ReferenceKind::Value,
        }
    }
}

/// How an asset is handed to its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetEncoding {
    /// Verbatim text (policies, manifests)
    Raw,
    /// Base64 of the bytes (instance user data)
    Base64,
}

/// Opaque payload blob such as bootstrap user data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    bytes: Vec<u8>,
    encoding: AssetEncoding,
}

impl Asset {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: AssetEncoding::Raw,
        }
    }

    pub fn base64(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: AssetEncoding::Base64,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> AssetEncoding {
        self.encoding
    }

    /// The asset as a string in its consumer encoding
    pub fn encoded(&self) -> String {
        match self.encoding {
            AssetEncoding::Raw => String::from_utf8_lossy(&self.bytes).into_owned(),
            AssetEncoding::Base64 => STANDARD.encode(&self.bytes),
        }
    }
}

/// One value of a task's desired state
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Property>),
    Map(BTreeMap<String, Property>),
    /// Deferred value: another task's output attribute
    Ref(ValueRef),
    Asset(Asset),
}

impl Property {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Property>,
    {
        Property::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Property>>(items: impl IntoIterator<Item = V>) -> Self {
        Property::List(items.into_iter().map(Into::into).collect())
    }

    /// Append every value reference contained in this property
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a ValueRef>) {
        match self {
            Property::Ref(r) => out.push(r),
            Property::List(items) => items.iter().for_each(|p| p.collect_refs(out)),
            Property::Map(entries) => entries.values().for_each(|p| p.collect_refs(out)),
            _ => {}
        }
    }
}

impl From<&str> for Property {
    fn from(v: &str) -> Self {
        Property::String(v.to_string())
    }
}

impl From<String> for Property {
    fn from(v: String) -> Self {
        Property::String(v)
    }
}

impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Property::Bool(v)
    }
}

impl From<i64> for Property {
    fn from(v: i64) -> Self {
        Property::Int(v)
    }
}

impl From<i32> for Property {
    fn from(v: i32) -> Self {
        Property::Int(i64::from(v))
    }
}

impl From<ValueRef> for Property {
    fn from(v: ValueRef) -> Self {
        Property::Ref(v)
    }
}

impl From<Asset> for Property {
    fn from(v: Asset) -> Self {
        Property::Asset(v)
    }
}

impl From<Vec<Property>> for Property {
    fn from(v: Vec<Property>) -> Self {
        Property::List(v)
    }
}

/// A desired-state unit for one infrastructure object
///
/// The engine schedules tasks from their name and references alone, and
/// hands the payload to the active target for diffing and applying.
pub trait Task: Send + Sync + fmt::Debug {
    fn name(&self) -> &TaskName;

    fn kind(&self) -> &ResourceKind;

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Sync
    }

    fn phase(&self) -> Phase {
        Phase::Cluster
    }

    fn properties(&self) -> &Properties;

    /// Every task this one depends on, each listed once
    fn references(&self) -> Vec<Reference>;

    fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.kind().name(), self.name().clone())
    }
}

pub type SharedTask = Arc<dyn Task>;

/// Generic data-driven task built by an external task builder
#[derive(Debug, Clone)]
pub struct ResourceTask {
    name: TaskName,
    kind: ResourceKind,
    lifecycle: Lifecycle,
    phase: Phase,
    properties: Properties,
    depends_on: Vec<TaskName>,
}

impl ResourceTask {
    pub fn new(name: impl Into<TaskName>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            lifecycle: Lifecycle::Sync,
            phase: Phase::Cluster,
            properties: Properties::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Property>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Ordering-only dependency (no value flows between the tasks)
    pub fn depends_on(mut self, task: impl Into<TaskName>) -> Self {
        self.depends_on.push(task.into());
        self
    }

    pub fn shared(self) -> SharedTask {
        Arc::new(self)
    }
}

impl Task for ResourceTask {
    fn name(&self) -> &TaskName {
        &self.name
    }

    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn references(&self) -> Vec<Reference> {
        let mut edges: BTreeMap<&TaskName, ReferenceKind> = BTreeMap::new();
        for dep in &self.depends_on {
            edges.entry(dep).or_insert(ReferenceKind::Ordering);
        }
        let mut refs = Vec::new();
        for property in self.properties.values() {
            property.collect_refs(&mut refs);
        }
        for r in refs {
            edges.insert(&r.task, ReferenceKind::Value);
        }
        edges
            .into_iter()
            .map(|(task, kind)| Reference {
                task: task.clone(),
                kind,
            })
            .collect()
    }
}
