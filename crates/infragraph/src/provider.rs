//! Cloud provider trait definition

use crate::changeset::Changeset;
use crate::error::TaskError;
use crate::task::{Outputs, Payload, ResourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Cloud provider API client used by the live target and the found-state cache
///
/// Implementations exist per cloud; the engine only needs find, create
/// and update for an arbitrary resource kind.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws", "gce")
    fn name(&self) -> &str;

    /// Look up what currently exists for a resource, `None` when absent
    async fn find(&self, id: &ResourceId) -> Result<Option<ActualState>, ProviderError>;

    /// Create a resource and return its output attributes
    async fn create(&self, id: &ResourceId, desired: &Payload) -> Result<Outputs, ProviderError>;

    /// Converge an existing resource and return its (possibly new) output attributes
    async fn update(
        &self,
        id: &ResourceId,
        desired: &Payload,
        changes: &Changeset,
    ) -> Result<Outputs, ProviderError>;
}

/// Provider API failure
///
/// `transient` marks conditions known to resolve on their own
/// (eventual consistency, throttling); the executor retries those.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub transient: bool,
}

impl ProviderError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

impl From<ProviderError> for TaskError {
    fn from(err: ProviderError) -> Self {
        if err.transient {
            TaskError::NotReady(err.message)
        } else {
            TaskError::Provider(err.message)
        }
    }
}

/// State of a resource as discovered in the cloud
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActualState {
    /// Comparable attributes, keyed like the task payload
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Attributes dependents may reference (id, arn, ...)
    pub outputs: Outputs,
}

impl ActualState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}

/// Retry configuration for tasks reporting NotReady
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound of any single delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    8
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}
