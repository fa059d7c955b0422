//! Hand-off of remote tasks to the transport.

use std::sync::Arc;

use common::{IdempotencyKey, PromiseId, StepId, TargetGroup, TaskId, WorkflowId};
use durable_store::{DurableStore, NewPromise, RemoteTask, Settlement};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SagaError};
use crate::promise::PromiseGate;
use crate::transport::Transport;

/// A named function invocation addressed to a worker group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub target: TargetGroup,
    pub function: String,
    pub args: Value,
}

impl RemoteCall {
    pub fn new(target: impl Into<TargetGroup>, function: impl Into<String>, args: Value) -> Self {
        Self {
            target: target.into(),
            function: function.into(),
            args,
        }
    }
}

/// Persists remote tasks as promises and delivers them in the background.
///
/// The outcome of a delivery settles the task's promise through the
/// [`PromiseGate`], which wakes the instance waiting on it.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn Transport>,
    gate: PromiseGate,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        gate: PromiseGate,
    ) -> Self {
        Self {
            store,
            transport,
            gate,
        }
    }

    /// Persists the task for step `step` of `workflow_id` and hands it to
    /// the transport. Returns the id of the promise the task settles.
    ///
    /// The promise id and idempotency key derive from the step, so invoking
    /// the same step again finds the stored promise and sends nothing.
    #[tracing::instrument(skip(self, call), fields(function = %call.function, target = %call.target))]
    pub async fn invoke(
        &self,
        workflow_id: &WorkflowId,
        step: StepId,
        call: RemoteCall,
    ) -> Result<PromiseId> {
        let task = RemoteTask {
            task_id: TaskId::new(),
            promise_id: PromiseId::derived(workflow_id, step),
            target: call.target,
            function: call.function,
            args: call.args,
            idempotency_key: IdempotencyKey::for_step(workflow_id, step),
        };
        let promise_id = task.promise_id.clone();

        let creation = self
            .store
            .create_promise(NewPromise::for_task(task.clone()))
            .await?;
        if creation.was_created() {
            metrics::counter!("remote_calls_dispatched_total", "function" => task.function.clone())
                .increment(1);
            self.hand_off(task);
        }
        Ok(promise_id)
    }

    /// Delivers `task` on a background task and settles its promise with
    /// the outcome. Exhausted deliveries reject the promise.
    pub fn hand_off(&self, task: RemoteTask) {
        let transport = self.transport.clone();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            let settlement = match transport.deliver(&task).await {
                Ok(outcome) => Settlement::from(outcome),
                Err(e) => {
                    tracing::error!(
                        promise_id = %task.promise_id,
                        function = %task.function,
                        error = %e,
                        "remote task delivery failed"
                    );
                    Settlement::Reject(e.to_string())
                }
            };

            match gate.settle(&task.promise_id, settlement).await {
                Ok(_) | Err(SagaError::AlreadyCompleted(_)) => {}
                Err(e) => tracing::error!(
                    promise_id = %task.promise_id,
                    error = %e,
                    "failed to settle remote task promise"
                ),
            }
        });
    }

    /// Hands every task whose promise is still pending to the transport
    /// again. Receivers deduplicate on the idempotency key.
    pub async fn redeliver_pending(&self) -> Result<usize> {
        let tasks = self.store.pending_tasks().await?;
        let count = tasks.len();
        for task in tasks {
            tracing::info!(promise_id = %task.promise_id, function = %task.function, "redelivering task");
            self.hand_off(task);
        }
        Ok(count)
    }
}
