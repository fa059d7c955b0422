//! Externally resolvable durable promises.

use std::sync::Arc;

use common::{PromiseId, WorkflowId};
use durable_store::{
    DurablePromise, DurableStore, NewPromise, Settlement, StepOutcome, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SagaError};
use crate::scheduler::Scheduler;

/// Handle to a durable promise, as returned by `promise` and `rfi` steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseHandle {
    pub id: PromiseId,
}

impl PromiseHandle {
    pub fn new(id: PromiseId) -> Self {
        Self { id }
    }
}

/// Creates and settles durable promises, waking every instance suspended
/// on a promise once it settles.
#[derive(Clone)]
pub struct PromiseGate {
    store: Arc<dyn DurableStore>,
    scheduler: Arc<Scheduler>,
}

impl PromiseGate {
    pub fn new(store: Arc<dyn DurableStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Creates a pending rendezvous promise. Creating an existing id is a
    /// no-op that returns the stored promise.
    pub async fn create(&self, id: PromiseId) -> Result<DurablePromise> {
        let creation = self.store.create_promise(NewPromise::rendezvous(id)).await?;
        Ok(creation.into_promise())
    }

    pub async fn get(&self, id: &PromiseId) -> Result<DurablePromise> {
        self.store
            .get_promise(id)
            .await?
            .ok_or_else(|| SagaError::PromiseNotFound(id.clone()))
    }

    /// Resolves a pending promise with `value`.
    pub async fn resolve(&self, id: &PromiseId, value: Value) -> Result<DurablePromise> {
        self.settle(id, Settlement::Resolve(value)).await
    }

    /// Rejects a pending promise with `error`.
    pub async fn reject(&self, id: &PromiseId, error: impl Into<String>) -> Result<DurablePromise> {
        self.settle(id, Settlement::Reject(error.into())).await
    }

    /// Settles a pending promise and wakes its waiters.
    ///
    /// A promise settles at most once: any later call fails with
    /// [`SagaError::AlreadyCompleted`] and leaves the stored value unchanged.
    #[tracing::instrument(skip(self, settlement), fields(promise_id = %id, state = %settlement.state()))]
    pub async fn settle(&self, id: &PromiseId, settlement: Settlement) -> Result<DurablePromise> {
        let settled = match self.store.settle_promise(id, settlement).await {
            Ok(promise) => promise,
            Err(StoreError::AlreadyCompleted { .. }) => {
                return Err(SagaError::AlreadyCompleted(id.clone()));
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(SagaError::PromiseNotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("promise_resolutions_total", "state" => settled.state.as_str())
            .increment(1);
        tracing::info!("promise settled");

        self.scheduler.wake_waiters(id).await;
        Ok(settled)
    }

    /// Returns the outcome of `id` if settled. While pending, `waiter` is
    /// registered to be woken by the settlement.
    pub(crate) async fn poll(
        &self,
        id: &PromiseId,
        waiter: &WorkflowId,
    ) -> Result<Option<StepOutcome>> {
        // Register first: a settlement landing between the read and the
        // registration would otherwise never wake us.
        self.scheduler.register_waiter(id, waiter).await;

        let promise = match self.store.get_promise(id).await? {
            Some(promise) => promise,
            None => {
                self.scheduler.forget_waiter(id, waiter).await;
                return Err(SagaError::PromiseNotFound(id.clone()));
            }
        };

        let outcome = promise.outcome();
        if outcome.is_some() {
            self.scheduler.forget_waiter(id, waiter).await;
        }
        Ok(outcome)
    }
}
