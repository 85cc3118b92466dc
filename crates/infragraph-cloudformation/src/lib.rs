//! CloudFormation renderer for infragraph
//!
//! This crate implements the `Target` trait by rendering the task graph as
//! a single CloudFormation template (`kubernetes.json`).
//!
//! # Rendering rules
//!
//! - Each task needs a CloudFormation type (`ResourceKind::with_cloudformation`)
//! - Logical ids are the type without `::` plus the alphanumerics of the name
//! - `id` references become `{"Ref": ..}`, other attributes `{"Fn::GetAtt": [..]}`
//! - Assets are embedded inline; base64 assets such as UserData stay base64
//! - Ordering-only dependencies become `DependsOn`
//!
//! # Example
//!
//! ```ignore
//! use infragraph::Executor;
//! use infragraph_cloudformation::{CloudFormationTarget, extract_user_data};
//!
//! let report = Executor::new(Arc::new(CloudFormationTarget::default()))
//!     .run(tasks)
//!     .await?;
//! let artifact = report.artifact.expect("successful run");
//! let extracted = extract_user_data(artifact.get_str("kubernetes.json").unwrap())?;
//! ```

pub mod error;
pub mod extract;
pub mod target;

pub use error::{CloudFormationError, Result};
pub use extract::{ExtractedTemplate, extract_user_data};
pub use target::{
    CloudFormationOptions, CloudFormationTarget, TEMPLATE_FILE, logical_id, pascal_case,
    properties,
};
