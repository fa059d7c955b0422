//! Saga error types.

use common::{PromiseId, StepId, TargetGroup, WorkflowId};
use durable_store::{StepKind, StoreError};
use thiserror::Error;

/// Application-level failure of a step: a local step returned an error or a
/// remote function reported one. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StepError {
    message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefixes the message, keeping the original text intact after the colon.
    pub fn context(self, prefix: &str) -> Self {
        Self::new(format!("{prefix}: {}", self.message))
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::new(format!("Serialization error: {e}"))
    }
}

/// Delivery failures. Retried by the transport's policy.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No worker is registered for the target group.
    #[error("No worker registered for target group {0}")]
    Unreachable(TargetGroup),

    /// The chosen worker node is not accepting work.
    #[error("Worker node {0} is down")]
    NodeDown(String),

    /// Every attempt allowed by the retry policy failed.
    #[error("Delivery to {target} failed after {attempts} attempts: {reason}")]
    Exhausted {
        target: TargetGroup,
        attempts: u32,
        reason: String,
    },
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Malformed workflow input, detected before any step runs.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A step failed.
    #[error("Step failed: {0}")]
    StepFailed(#[from] StepError),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The promise was settled before; the stored value is unchanged.
    #[error("Promise {0} is already completed")]
    AlreadyCompleted(PromiseId),

    /// Promise not found.
    #[error("Promise not found: {0}")]
    PromiseNotFound(PromiseId),

    /// No definition is registered under this name.
    #[error("Unknown workflow definition: {0}")]
    UnknownWorkflow(String),

    /// Workflow instance not found.
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(WorkflowId),

    /// The instance terminated as FAILED; carries the original message.
    #[error("Workflow {workflow_id} failed: {message}")]
    WorkflowFailed {
        workflow_id: WorkflowId,
        message: String,
    },

    /// Replay requested a different step than the journal recorded, by
    /// kind or by label.
    #[error(
        "Non-deterministic replay of {workflow_id} at step {step}: recorded {recorded} '{recorded_label}', requested {requested} '{requested_label}'"
    )]
    NonDeterminism {
        workflow_id: WorkflowId,
        step: StepId,
        recorded: StepKind,
        recorded_label: String,
        requested: StepKind,
        requested_label: String,
    },

    /// Durable store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The instance is RUNNING but no task is driving it in this process.
    #[error("Workflow instance {0} is not being driven; run recovery to resume it")]
    InstanceStopped(WorkflowId),
}

impl SagaError {
    /// Errors caused by the definition itself rather than by the store.
    ///
    /// Re-driving cannot clear them, so they fail the instance instead of
    /// leaving it RUNNING.
    pub fn is_definition_fault(&self) -> bool {
        matches!(
            self,
            SagaError::NonDeterminism { .. } | SagaError::PromiseNotFound(_)
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
