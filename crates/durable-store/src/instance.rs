//! Workflow instances and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::journal::StepOutcome;
use crate::WorkflowId;

/// The status of a workflow instance.
///
/// State transitions:
/// ```text
/// Running ──┬──► Completed
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// The definition is still being driven.
    #[default]
    Running,

    /// The definition returned a result (terminal state).
    Completed,

    /// A step error escaped the definition (terminal state).
    Failed,
}

impl WorkflowStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
        }
    }

    /// The terminal status reached by a given outcome.
    pub fn for_outcome(outcome: &StepOutcome) -> Self {
        if outcome.is_success() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(WorkflowStatus::Running),
            "COMPLETED" => Ok(WorkflowStatus::Completed),
            "FAILED" => Ok(WorkflowStatus::Failed),
            other => Err(StoreError::Corrupt(format!(
                "unknown workflow status '{other}'"
            ))),
        }
    }
}

/// A single execution of a registered workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowId,
    pub definition_name: String,
    pub input: Value,
    pub status: WorkflowStatus,
    /// Result or error once terminal.
    pub outcome: Option<StepOutcome>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Creates a running instance.
    pub fn start(id: WorkflowId, definition_name: impl Into<String>, input: Value) -> Self {
        Self {
            id,
            definition_name: definition_name.into(),
            input,
            status: WorkflowStatus::Running,
            outcome: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Moves a running instance to its terminal status.
    pub fn finish(&mut self, outcome: StepOutcome) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(StoreError::already_completed("Workflow", &self.id));
        }
        self.status = WorkflowStatus::for_outcome(&outcome);
        self.outcome = Some(outcome);
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Result of an idempotent instance creation.
#[derive(Debug, Clone)]
pub enum InstanceCreation {
    Created(WorkflowInstance),
    Existing(WorkflowInstance),
}

impl InstanceCreation {
    pub fn instance(&self) -> &WorkflowInstance {
        match self {
            InstanceCreation::Created(i) | InstanceCreation::Existing(i) => i,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, InstanceCreation::Created(_))
    }
}
