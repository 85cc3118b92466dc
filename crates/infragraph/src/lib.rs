//! infragraph
//!
//! Turns a set of desired-state infrastructure tasks into a
//! dependency-ordered plan and runs it against one target: the live cloud
//! API, a dry run, or a static document renderer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              task builder (external)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Vec<Arc<dyn Task>>
//! ┌─────────────────▼───────────────────────────────┐
//! │                   infragraph                     │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  TaskGraph   │─▶│    waves     │             │
//! │  └──────────────┘  └──────┬───────┘             │
//! │  ┌──────────────┐  ┌──────▼───────┐             │
//! │  │ found-state  │◀─│   Executor   │             │
//! │  │    cache     │  └──────┬───────┘             │
//! │  └──────┬───────┘         │ trait Target        │
//! └─────────┼─────────────────┼─────────────────────┘
//!           │                 │
//! ┌─────────▼──────┐ ┌────────▼───────┬──────────────┬────────────────┐
//! │ CloudProvider  │ │   LiveTarget   │ DryRunTarget │   renderers    │
//! │ (find/create/  │ │                │              │ (terraform,    │
//! │  update)       │ │                │              │ cloudformation)│
//! └────────────────┘ └────────────────┴──────────────┴────────────────┘
//! ```

pub mod artifact;
pub mod cache;
pub mod changeset;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod provider;
pub mod report;
pub mod resolve;
pub mod target;
pub mod task;

// Re-exports
pub use artifact::Artifact;
pub use cache::FoundStateCache;
pub use changeset::{ChangeKind, Changeset, FieldChange};
pub use config::RunConfig;
pub use error::{EngineError, GraphError, ParseError, Result, TaskError};
pub use executor::Executor;
pub use graph::TaskGraph;
pub use provider::{ActualState, CloudProvider, ProviderError, RetryConfig};
pub use report::{RunReport, RunSummary, TaskReport, TaskState};
pub use target::{
    ApplyRequest, DryRunTarget, LiveTarget, PlannedChange, Producer, Target, TargetKind,
    literal_output,
};
pub use task::{
    Asset, AssetEncoding, Lifecycle, Outputs, Payload, Phase, Properties, Property, Reference,
    ReferenceKind, ResourceId, ResourceKind, ResourceTask, SharedTask, Task, TaskName, ValueRef,
};
