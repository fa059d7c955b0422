//! Step records: the memoized outcomes of completed workflow steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::{StepId, WorkflowId};

/// What a recorded step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// Local computation, never suspends.
    Local,
    /// Remote call whose result the workflow waited for.
    RemoteCall,
    /// Remote invocation or promise creation returning a handle.
    RemoteInvoke,
    /// Wait on a previously obtained promise handle.
    PromiseWait,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Local => "LOCAL",
            StepKind::RemoteCall => "REMOTE_CALL",
            StepKind::RemoteInvoke => "REMOTE_INVOKE",
            StepKind::PromiseWait => "PROMISE_WAIT",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL" => Ok(StepKind::Local),
            "REMOTE_CALL" => Ok(StepKind::RemoteCall),
            "REMOTE_INVOKE" => Ok(StepKind::RemoteInvoke),
            "PROMISE_WAIT" => Ok(StepKind::PromiseWait),
            other => Err(StoreError::Corrupt(format!("unknown step kind '{other}'"))),
        }
    }
}

/// Value or error produced by a step, a promise, or a whole workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum StepOutcome {
    Success(Value),
    Failure(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<Value, String> {
        match self {
            StepOutcome::Success(value) => Ok(value),
            StepOutcome::Failure(error) => Err(error),
        }
    }
}

/// Immutable record of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub workflow_id: WorkflowId,
    pub step_id: StepId,
    pub kind: StepKind,
    /// Stable diagnostic name of the step (remote function, local label).
    pub label: Option<String>,
    pub outcome: StepOutcome,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(
        workflow_id: WorkflowId,
        step_id: StepId,
        kind: StepKind,
        label: Option<String>,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            workflow_id,
            step_id,
            kind,
            label,
            outcome,
            completed_at: Utc::now(),
        }
    }

    /// Display key used in `AlreadyCompleted` errors.
    pub fn key(&self) -> String {
        format!("{}#{}", self.workflow_id, self.step_id)
    }
}
