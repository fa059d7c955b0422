use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::journal::StepOutcome;
use crate::{IdempotencyKey, PromiseId, TargetGroup, TaskId};

/// Lifecycle of a durable promise.
///
/// ```text
/// Pending ──┬──► Resolved
///           └──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromiseState {
    #[default]
    Pending,
    Resolved,
    Rejected,
}

impl PromiseState {
    /// Returns true once the promise has been settled.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PromiseState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Resolved => "resolved",
            PromiseState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PromiseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromiseState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PromiseState::Pending),
            "resolved" => Ok(PromiseState::Resolved),
            "rejected" => Ok(PromiseState::Rejected),
            other => Err(StoreError::Corrupt(format!("unknown promise state '{other}'"))),
        }
    }
}

/// A named-function invocation addressed to a worker group.
///
/// Stored alongside the promise it completes so that a restarted process can
/// hand pending tasks to the transport again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub task_id: TaskId,
    pub promise_id: PromiseId,
    pub target: TargetGroup,
    pub function: String,
    pub args: Value,
    pub idempotency_key: IdempotencyKey,
}

/// Input for creating a durable promise.
#[derive(Debug, Clone)]
pub struct NewPromise {
    pub id: PromiseId,
    pub idempotency_key: Option<IdempotencyKey>,
    pub task: Option<RemoteTask>,
}

impl NewPromise {
    /// A bare rendezvous promise, settled by whoever learns its id.
    pub fn rendezvous(id: PromiseId) -> Self {
        Self {
            id,
            idempotency_key: None,
            task: None,
        }
    }

    /// A promise completed by a worker executing `task`.
    pub fn for_task(task: RemoteTask) -> Self {
        Self {
            id: task.promise_id.clone(),
            idempotency_key: Some(task.idempotency_key.clone()),
            task: Some(task),
        }
    }
}

/// A persisted placeholder for a value resolved later, possibly by another
/// process than the one that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurablePromise {
    pub id: PromiseId,
    pub state: PromiseState,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub task: Option<RemoteTask>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DurablePromise {
    /// Creates a pending promise from creation input.
    pub fn pending(new: NewPromise) -> Self {
        Self {
            id: new.id,
            state: PromiseState::Pending,
            value: None,
            error: None,
            idempotency_key: new.idempotency_key,
            task: new.task,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns the settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<StepOutcome> {
        match self.state {
            PromiseState::Pending => None,
            PromiseState::Resolved => Some(StepOutcome::Success(
                self.value.clone().unwrap_or(Value::Null),
            )),
            PromiseState::Rejected => Some(StepOutcome::Failure(
                self.error.clone().unwrap_or_default(),
            )),
        }
    }

    /// Applies a settlement to a pending promise.
    ///
    /// Fails with `AlreadyCompleted` when the promise has already settled;
    /// the stored value is left untouched in that case.
    pub fn settle(&mut self, settlement: Settlement) -> Result<(), StoreError> {
        if self.state.is_settled() {
            return Err(StoreError::already_completed("Promise", &self.id));
        }
        match settlement {
            Settlement::Resolve(value) => {
                self.state = PromiseState::Resolved;
                self.value = Some(value);
            }
            Settlement::Reject(error) => {
                self.state = PromiseState::Rejected;
                self.error = Some(error);
            }
        }
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

/// The single transition a pending promise may take.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Resolve(Value),
    Reject(String),
}

impl Settlement {
    pub fn state(&self) -> PromiseState {
        match self {
            Settlement::Resolve(_) => PromiseState::Resolved,
            Settlement::Reject(_) => PromiseState::Rejected,
        }
    }
}

impl From<StepOutcome> for Settlement {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Success(value) => Settlement::Resolve(value),
            StepOutcome::Failure(error) => Settlement::Reject(error),
        }
    }
}

/// Result of an idempotent promise creation.
#[derive(Debug, Clone)]
pub enum PromiseCreation {
    /// The promise did not exist and was created by this call.
    Created(DurablePromise),
    /// A promise with the same id already existed; it is returned unchanged.
    Existing(DurablePromise),
}

impl PromiseCreation {
    pub fn promise(&self) -> &DurablePromise {
        match self {
            PromiseCreation::Created(p) | PromiseCreation::Existing(p) => p,
        }
    }

    pub fn into_promise(self) -> DurablePromise {
        match self {
            PromiseCreation::Created(p) | PromiseCreation::Existing(p) => p,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, PromiseCreation::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_promise_has_no_outcome() {
        let promise = DurablePromise::pending(NewPromise::rendezvous(PromiseId::new("p-1")));
        assert_eq!(promise.state, PromiseState::Pending);
        assert!(promise.outcome().is_none());
        assert!(promise.resolved_at.is_none());
    }

    #[test]
    fn settle_resolves_once() {
        let mut promise = DurablePromise::pending(NewPromise::rendezvous(PromiseId::new("p-1")));
        promise
            .settle(Settlement::Resolve(serde_json::json!({"paid": true})))
            .unwrap();
        assert_eq!(promise.state, PromiseState::Resolved);
        assert!(promise.resolved_at.is_some());

        let second = promise.settle(Settlement::Reject("late".into()));
        assert!(matches!(second, Err(StoreError::AlreadyCompleted { .. })));
        assert_eq!(promise.state, PromiseState::Resolved);
        assert_eq!(
            promise.outcome(),
            Some(StepOutcome::Success(serde_json::json!({"paid": true})))
        );
    }

    #[test]
    fn rejected_outcome_carries_error() {
        let mut promise = DurablePromise::pending(NewPromise::rendezvous(PromiseId::new("p-2")));
        promise
            .settle(Settlement::Reject("card declined".into()))
            .unwrap();
        assert_eq!(
            promise.outcome(),
            Some(StepOutcome::Failure("card declined".into()))
        );
    }

    #[test]
    fn state_parses_from_storage_names() {
        for state in [
            PromiseState::Pending,
            PromiseState::Resolved,
            PromiseState::Rejected,
        ] {
            assert_eq!(state.as_str().parse::<PromiseState>().unwrap(), state);
        }
        assert!("bogus".parse::<PromiseState>().is_err());
    }
}
