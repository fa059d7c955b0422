//! Shared identifier types used across the saga workspace.

pub mod types;

pub use types::{IdempotencyKey, PromiseId, StepId, TargetGroup, TaskId, WorkflowId};
