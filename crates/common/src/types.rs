use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Caller-chosen, globally unique identifier of a workflow instance.
    ///
    /// Submitting twice with the same id never starts a second execution.
    WorkflowId
);

string_id!(
    /// Identifier of a durable promise.
    PromiseId
);

string_id!(
    /// Logical worker group a remote call is load-balanced across
    /// (e.g. `orders-service-nodes`).
    TargetGroup
);

string_id!(
    /// Deduplication key carried by every remote task. Receivers execute a
    /// given key at most once.
    IdempotencyKey
);

/// Position of a step inside a workflow definition.
///
/// Step ids are handed out sequentially while a definition runs, so a replay
/// of the same definition visits the same ids in the same order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StepId(u32);

impl StepId {
    /// Creates a step id from a raw sequence number.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// The first step of every definition.
    pub fn first() -> Self {
        Self(0)
    }

    /// Returns the following step id.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StepId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl PromiseId {
    /// Derives the promise id owned by `step` of `workflow_id`.
    ///
    /// Replays of the same step always derive the same id.
    pub fn derived(workflow_id: &WorkflowId, step: StepId) -> Self {
        Self(format!("{workflow_id}.{step}"))
    }
}

impl IdempotencyKey {
    /// Derives the key for the remote call issued by `step` of `workflow_id`.
    pub fn for_step(workflow_id: &WorkflowId, step: StepId) -> Self {
        Self(format!("{workflow_id}:{step}"))
    }
}

/// Identifier of a single task handed to the transport.
///
/// Unlike the idempotency key, a task id is random; redeliveries of the same
/// call reuse the task stored with its promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
