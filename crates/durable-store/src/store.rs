use async_trait::async_trait;

use crate::{
    DurablePromise, InstanceCreation, NewPromise, PromiseCreation, PromiseId, RemoteTask, Result,
    Settlement, StepId, StepOutcome, StepRecord, WorkflowId, WorkflowInstance,
};

/// Core trait for durable storage providers.
///
/// Implementations must serialize concurrent writes per key: for a given
/// promise id, step key or workflow id, the first writer wins and every later
/// writer observes `StoreError::AlreadyCompleted`. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Creates a pending promise unless one with the same id exists.
    ///
    /// Never modifies an existing promise.
    async fn create_promise(&self, promise: NewPromise) -> Result<PromiseCreation>;

    /// Retrieves a promise by id.
    async fn get_promise(&self, id: &PromiseId) -> Result<Option<DurablePromise>>;

    /// Settles a pending promise.
    ///
    /// Fails with `AlreadyCompleted` if the promise left `Pending` earlier and
    /// with `NotFound` if it was never created.
    async fn settle_promise(
        &self,
        id: &PromiseId,
        settlement: Settlement,
    ) -> Result<DurablePromise>;

    /// Remote tasks whose promises are still pending, oldest first.
    async fn pending_tasks(&self) -> Result<Vec<RemoteTask>>;

    /// Appends a step record.
    ///
    /// Fails with `AlreadyCompleted` if a record for the same
    /// `(workflow_id, step_id)` exists; the stored record is not changed.
    async fn record_step(&self, record: StepRecord) -> Result<StepRecord>;

    /// Retrieves one step record.
    async fn get_step(&self, workflow_id: &WorkflowId, step_id: StepId)
    -> Result<Option<StepRecord>>;

    /// Retrieves all step records of a workflow, ordered by step id.
    async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepRecord>>;

    /// Creates a workflow instance unless one with the same id exists.
    async fn create_instance(&self, instance: WorkflowInstance) -> Result<InstanceCreation>;

    /// Retrieves a workflow instance by id.
    async fn get_instance(&self, id: &WorkflowId) -> Result<Option<WorkflowInstance>>;

    /// Moves a running instance to its terminal status.
    ///
    /// Fails with `AlreadyCompleted` if the instance is already terminal.
    async fn finish_instance(
        &self,
        id: &WorkflowId,
        outcome: StepOutcome,
    ) -> Result<WorkflowInstance>;

    /// All instances still running, oldest first.
    async fn running_instances(&self) -> Result<Vec<WorkflowInstance>>;
}
