//! CloudFormation renderer error types

use infragraph::{EngineError, TaskError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudFormationError {
    #[error("Task {task} of kind {kind} has no CloudFormation resource type")]
    MissingType { task: String, kind: String },

    #[error("Logical id {logical_id} is used by both {first} and {second}")]
    NameCollision {
        logical_id: String,
        first: String,
        second: String,
    },

    #[error("Output {output} references {task}, which is not part of the template")]
    UnknownOutput { output: String, task: String },

    #[error("UserData at {path} is not valid base64: {reason}")]
    InvalidUserData { path: String, reason: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl From<CloudFormationError> for TaskError {
    fn from(err: CloudFormationError) -> Self {
        TaskError::Render(err.to_string())
    }
}

impl From<CloudFormationError> for EngineError {
    fn from(err: CloudFormationError) -> Self {
        EngineError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CloudFormationError>;
