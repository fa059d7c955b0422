use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    DurablePromise, DurableStore, InstanceCreation, NewPromise, PromiseCreation, PromiseId,
    RemoteTask, Result, Settlement, StepId, StepOutcome, StepRecord, StoreError, WorkflowId,
    WorkflowInstance, WorkflowStatus,
};

/// In-memory durable store for tests and single-process deployments.
///
/// Each map sits behind its own lock; holding the write lock for the whole
/// check-then-write gives the per-key compare-and-set semantics the
/// [`DurableStore`] contract requires.
#[derive(Clone, Default)]
pub struct InMemoryDurableStore {
    promises: Arc<RwLock<HashMap<PromiseId, DurablePromise>>>,
    steps: Arc<RwLock<HashMap<WorkflowId, BTreeMap<StepId, StepRecord>>>>,
    instances: Arc<RwLock<HashMap<WorkflowId, WorkflowInstance>>>,
}

impl InMemoryDurableStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of promises stored.
    pub async fn promise_count(&self) -> usize {
        self.promises.read().await.len()
    }

    /// Returns the total number of step records stored.
    pub async fn step_count(&self) -> usize {
        self.steps.read().await.values().map(BTreeMap::len).sum()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.promises.write().await.clear();
        self.steps.write().await.clear();
        self.instances.write().await.clear();
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn create_promise(&self, promise: NewPromise) -> Result<PromiseCreation> {
        let mut promises = self.promises.write().await;
        if let Some(existing) = promises.get(&promise.id) {
            return Ok(PromiseCreation::Existing(existing.clone()));
        }
        let created = DurablePromise::pending(promise);
        promises.insert(created.id.clone(), created.clone());
        Ok(PromiseCreation::Created(created))
    }

    async fn get_promise(&self, id: &PromiseId) -> Result<Option<DurablePromise>> {
        Ok(self.promises.read().await.get(id).cloned())
    }

    async fn settle_promise(
        &self,
        id: &PromiseId,
        settlement: Settlement,
    ) -> Result<DurablePromise> {
        let mut promises = self.promises.write().await;
        let promise = promises
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Promise", id))?;
        promise.settle(settlement)?;
        Ok(promise.clone())
    }

    async fn pending_tasks(&self) -> Result<Vec<RemoteTask>> {
        let promises = self.promises.read().await;
        let mut pending: Vec<&DurablePromise> = promises
            .values()
            .filter(|p| !p.state.is_settled() && p.task.is_some())
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending.into_iter().filter_map(|p| p.task.clone()).collect())
    }

    async fn record_step(&self, record: StepRecord) -> Result<StepRecord> {
        let mut steps = self.steps.write().await;
        let journal = steps.entry(record.workflow_id.clone()).or_default();
        if journal.contains_key(&record.step_id) {
            return Err(StoreError::already_completed("Step", record.key()));
        }
        journal.insert(record.step_id, record.clone());
        Ok(record)
    }

    async fn get_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: StepId,
    ) -> Result<Option<StepRecord>> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(workflow_id)
            .and_then(|journal| journal.get(&step_id))
            .cloned())
    }

    async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepRecord>> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(workflow_id)
            .map(|journal| journal.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_instance(&self, instance: WorkflowInstance) -> Result<InstanceCreation> {
        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(&instance.id) {
            return Ok(InstanceCreation::Existing(existing.clone()));
        }
        instances.insert(instance.id.clone(), instance.clone());
        Ok(InstanceCreation::Created(instance))
    }

    async fn get_instance(&self, id: &WorkflowId) -> Result<Option<WorkflowInstance>> {
        Ok(self.instances.read().await.get(id).cloned())
    }

    async fn finish_instance(
        &self,
        id: &WorkflowId,
        outcome: StepOutcome,
    ) -> Result<WorkflowInstance> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Workflow", id))?;
        instance.finish(outcome)?;
        Ok(instance.clone())
    }

    async fn running_instances(&self) -> Result<Vec<WorkflowInstance>> {
        let instances = self.instances.read().await;
        let mut running: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| i.status == WorkflowStatus::Running)
            .cloned()
            .collect();
        running.sort_by_key(|i| i.created_at);
        Ok(running)
    }
}
