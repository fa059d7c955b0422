//! Persistence contract for the saga engine.
//!
//! A [`DurableStore`] keeps three kinds of records, each keyed so that the
//! first writer wins and later writers observe [`StoreError::AlreadyCompleted`]:
//!
//! - durable promises, settled at most once
//! - step records, at most one per `(workflow_id, step_id)`
//! - workflow instances, created at most once per caller-chosen id

pub mod error;
pub mod instance;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod promise;
pub mod store;

pub use common::{IdempotencyKey, PromiseId, StepId, TargetGroup, TaskId, WorkflowId};
pub use error::{Result, StoreError};
pub use instance::{InstanceCreation, WorkflowInstance, WorkflowStatus};
pub use journal::{StepKind, StepOutcome, StepRecord};
pub use memory::InMemoryDurableStore;
pub use postgres::PostgresDurableStore;
pub use promise::{DurablePromise, NewPromise, PromiseCreation, PromiseState, RemoteTask, Settlement};
pub use store::DurableStore;
