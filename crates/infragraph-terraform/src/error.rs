//! Terraform renderer error types

use infragraph::{EngineError, TaskError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Terraform resource {kind}.{name} is rendered twice")]
    NameCollision { kind: String, name: String },

    #[error("Data file {path} is written twice with different contents")]
    AssetConflict { path: String },

    #[error("Output {output} references {task}, which is not part of the document")]
    UnknownOutput { output: String, task: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<TerraformError> for TaskError {
    fn from(err: TerraformError) -> Self {
        TaskError::Render(err.to_string())
    }
}

impl From<TerraformError> for EngineError {
    fn from(err: TerraformError) -> Self {
        EngineError::Render(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TerraformError>;
