//! Submission, driving and recovery of workflow instances.

use std::sync::Arc;
use std::time::Instant;

use common::{PromiseId, WorkflowId};
use durable_store::{
    DurablePromise, DurableStore, InstanceCreation, StepOutcome, StepRecord, WorkflowInstance,
    WorkflowStatus,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::{Interrupt, Mode, Plan, Suspension, WorkflowContext};
use crate::dispatch::Dispatcher;
use crate::error::{Result, SagaError};
use crate::promise::PromiseGate;
use crate::registry::{Workflow, WorkflowRegistry};
use crate::scheduler::Scheduler;
use crate::transport::Transport;

/// What a process did to pick up where a previous one stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Remote tasks handed to the transport again.
    pub redelivered: usize,
    /// RUNNING instances driven again.
    pub resumed: usize,
}

enum Drive {
    Suspended(Suspension),
    Finished(StepOutcome),
}

struct Engine {
    store: Arc<dyn DurableStore>,
    registry: WorkflowRegistry,
    dispatcher: Dispatcher,
    gate: PromiseGate,
    scheduler: Arc<Scheduler>,
}

/// Runs registered workflow definitions to completion.
///
/// Every instance is driven by its own task. The task replays the definition
/// against its journal, executes the first unrecorded step, and sleeps when
/// a step waits on a pending promise until that promise settles.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<Engine>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn Transport>,
    registry: WorkflowRegistry,
}

impl OrchestratorBuilder {
    pub fn registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Orchestrator {
        let scheduler = Arc::new(Scheduler::new());
        let gate = PromiseGate::new(self.store.clone(), scheduler.clone());
        let dispatcher = Dispatcher::new(self.store.clone(), self.transport, gate.clone());

        Orchestrator {
            engine: Arc::new(Engine {
                store: self.store,
                registry: self.registry,
                dispatcher,
                gate,
                scheduler,
            }),
        }
    }
}

impl Orchestrator {
    pub fn builder(
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            transport,
            registry: WorkflowRegistry::default(),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.engine.registry
    }

    pub fn gate(&self) -> &PromiseGate {
        &self.engine.gate
    }

    /// Starts the definition `name` under `id`.
    ///
    /// Submitting an id that already exists starts nothing: the handle of
    /// the existing instance is returned whatever the new input, and a
    /// RUNNING instance that no task drives in this process is picked up
    /// again.
    #[tracing::instrument(skip(self, input), fields(workflow_id = %id))]
    pub async fn submit(&self, id: WorkflowId, name: &str, input: Value) -> Result<WorkflowHandle> {
        if let Some(existing) = self.engine.store.get_instance(&id).await? {
            self.resume_existing(&id, &existing).await;
            return Ok(self.handle(id));
        }

        let workflow = self
            .engine
            .registry
            .get(name)
            .ok_or_else(|| SagaError::UnknownWorkflow(name.to_string()))?;
        workflow.validate(&input)?;

        let creation = self
            .engine
            .store
            .create_instance(WorkflowInstance::start(id.clone(), name, input))
            .await?;

        match creation {
            InstanceCreation::Created(_) => {
                metrics::counter!("saga_submissions_total", "workflow" => name.to_string())
                    .increment(1);
                tracing::info!(workflow = name, "workflow submitted");
                self.activate(&id).await;
            }
            InstanceCreation::Existing(instance) => self.resume_existing(&id, &instance).await,
        }

        Ok(self.handle(id))
    }

    async fn resume_existing(&self, id: &WorkflowId, instance: &WorkflowInstance) {
        tracing::info!(status = %instance.status, "workflow already submitted");
        if instance.status == WorkflowStatus::Running {
            self.activate(id).await;
        }
    }

    /// Handle for an instance id. The instance need not exist yet.
    pub fn handle(&self, id: WorkflowId) -> WorkflowHandle {
        WorkflowHandle {
            id,
            store: self.engine.store.clone(),
            scheduler: self.engine.scheduler.clone(),
        }
    }

    pub async fn resolve_promise(&self, id: &PromiseId, value: Value) -> Result<DurablePromise> {
        self.engine.gate.resolve(id, value).await
    }

    pub async fn reject_promise(
        &self,
        id: &PromiseId,
        error: impl Into<String>,
    ) -> Result<DurablePromise> {
        self.engine.gate.reject(id, error).await
    }

    pub async fn get_promise(&self, id: &PromiseId) -> Result<DurablePromise> {
        self.engine.gate.get(id).await
    }

    pub async fn get_instance(&self, id: &WorkflowId) -> Result<WorkflowInstance> {
        self.engine.instance(id).await
    }

    /// Recorded steps of an instance, in step order.
    pub async fn journal(&self, id: &WorkflowId) -> Result<Vec<StepRecord>> {
        self.engine.instance(id).await?;
        Ok(self.engine.store.get_steps(id).await?)
    }

    /// Replays an instance without executing anything and reports which
    /// steps come from the journal and which step would run next.
    pub async fn plan(&self, id: &WorkflowId) -> Result<Plan> {
        let instance = self.engine.instance(id).await?;
        let workflow = self.engine.definition(&instance.definition_name)?;
        let mut ctx = self.engine.context(id, Mode::Inspect).await?;

        match workflow.run(&mut ctx, instance.input).await {
            Ok(_) | Err(Interrupt::Suspended(_)) | Err(Interrupt::Failed(_)) => {}
            Err(Interrupt::Fault(e)) => return Err(e),
        }
        Ok(ctx.into_plan())
    }

    /// Hands pending remote tasks to the transport again and resumes every
    /// RUNNING instance. Call once at startup.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let redelivered = self.engine.dispatcher.redeliver_pending().await?;

        let mut resumed = 0;
        for instance in self.engine.store.running_instances().await? {
            if self.activate(&instance.id).await {
                resumed += 1;
            }
        }

        let report = RecoveryReport {
            redelivered,
            resumed,
        };
        tracing::info!(redelivered, resumed, "recovery complete");
        Ok(report)
    }

    /// Number of instances driven by this process.
    pub async fn active_instances(&self) -> usize {
        self.engine.scheduler.active_count().await
    }

    /// Stops driving every instance. Durable state is untouched; another
    /// orchestrator on the same store resumes them through
    /// [`recover`](Self::recover).
    pub async fn shutdown(&self) {
        tracing::info!("orchestrator shutting down");
        self.engine.scheduler.shutdown().await;
    }

    async fn activate(&self, id: &WorkflowId) -> bool {
        let engine = self.engine.clone();
        let workflow_id = id.clone();
        self.engine
            .scheduler
            .activate(id, move |wake| engine.run_instance(workflow_id, wake))
            .await
    }
}

impl Engine {
    async fn instance(&self, id: &WorkflowId) -> Result<WorkflowInstance> {
        self.store
            .get_instance(id)
            .await?
            .ok_or_else(|| SagaError::InstanceNotFound(id.clone()))
    }

    fn definition(&self, name: &str) -> Result<Arc<dyn Workflow>> {
        self.registry
            .get(name)
            .ok_or_else(|| SagaError::UnknownWorkflow(name.to_string()))
    }

    async fn context(&self, id: &WorkflowId, mode: Mode) -> Result<WorkflowContext> {
        Ok(WorkflowContext::load(
            id.clone(),
            mode,
            self.store.clone(),
            self.dispatcher.clone(),
            self.gate.clone(),
        )
        .await?)
    }

    async fn run_instance(self: Arc<Self>, id: WorkflowId, mut wake: mpsc::UnboundedReceiver<()>) {
        loop {
            match self.drive(&id).await {
                Ok(Drive::Suspended(suspension)) => {
                    tracing::debug!(
                        workflow_id = %id,
                        step = %suspension.step,
                        "workflow suspended"
                    );
                    if wake.recv().await.is_none() {
                        return;
                    }
                    while wake.try_recv().is_ok() {}
                }
                Ok(Drive::Finished(outcome)) => {
                    self.complete(&id, outcome).await;
                    return;
                }
                Err(e) => {
                    tracing::error!(workflow_id = %id, error = %e, "workflow drive failed");
                    self.scheduler.release(&id).await;
                    return;
                }
            }
        }
    }

    /// Runs the definition once from the top.
    async fn drive(&self, id: &WorkflowId) -> Result<Drive> {
        let instance = self.instance(id).await?;
        if instance.status.is_terminal() {
            let outcome = instance
                .outcome
                .unwrap_or_else(|| StepOutcome::Failure("terminal instance has no outcome".into()));
            return Ok(Drive::Finished(outcome));
        }

        let workflow = self.definition(&instance.definition_name)?;
        let mut ctx = self.context(id, Mode::Live).await?;

        let started = Instant::now();
        let result = workflow.run(&mut ctx, instance.input).await;
        metrics::histogram!("saga_drive_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => Ok(Drive::Finished(StepOutcome::Success(value))),
            Err(Interrupt::Failed(e)) => Ok(Drive::Finished(StepOutcome::Failure(
                e.message().to_string(),
            ))),
            Err(Interrupt::Suspended(suspension)) => Ok(Drive::Suspended(suspension)),
            Err(Interrupt::Fault(e)) if e.is_definition_fault() => {
                tracing::error!(workflow_id = %id, error = %e, "definition fault, failing workflow");
                Ok(Drive::Finished(StepOutcome::Failure(e.to_string())))
            }
            Err(Interrupt::Fault(e)) => Err(e),
        }
    }

    async fn complete(&self, id: &WorkflowId, outcome: StepOutcome) {
        let published = match self.store.finish_instance(id, outcome.clone()).await {
            Ok(instance) => {
                let workflow = instance.definition_name.clone();
                match instance.status {
                    WorkflowStatus::Failed => {
                        metrics::counter!("saga_failed_total", "workflow" => workflow.clone())
                            .increment(1);
                        tracing::warn!(workflow_id = %id, workflow = %workflow, "workflow failed");
                    }
                    _ => {
                        metrics::counter!("saga_completed_total", "workflow" => workflow.clone())
                            .increment(1);
                        tracing::info!(workflow_id = %id, workflow = %workflow, "workflow completed");
                    }
                }
                if let Some(completed_at) = instance.completed_at {
                    let elapsed = (completed_at - instance.created_at).num_milliseconds();
                    metrics::histogram!("saga_duration_seconds").record(elapsed as f64 / 1000.0);
                }
                outcome
            }
            Err(e) if e.is_already_completed() => match self.instance(id).await {
                Ok(instance) => instance.outcome.unwrap_or(outcome),
                Err(_) => outcome,
            },
            Err(e) => {
                tracing::error!(workflow_id = %id, error = %e, "failed to record workflow outcome");
                self.scheduler.release(id).await;
                return;
            }
        };

        self.scheduler.finish(id, published).await;
    }
}

/// Reference to a submitted workflow instance.
#[derive(Clone)]
pub struct WorkflowHandle {
    id: WorkflowId,
    store: Arc<dyn DurableStore>,
    scheduler: Arc<Scheduler>,
}

impl WorkflowHandle {
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub async fn status(&self) -> Result<WorkflowStatus> {
        Ok(self.instance().await?.status)
    }

    /// Waits for the instance to terminate.
    ///
    /// A FAILED instance yields [`SagaError::WorkflowFailed`] carrying the
    /// original error message.
    pub async fn result(&self) -> Result<Value> {
        // Subscribe before reading the store so a completion in between is
        // not missed.
        let subscription = self.scheduler.subscribe(&self.id).await;

        let instance = self.instance().await?;
        if let Some(outcome) = instance.outcome {
            return self.outcome_value(outcome);
        }

        let Some(mut done) = subscription else {
            return Err(SagaError::InstanceStopped(self.id.clone()));
        };
        let published = done
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone());

        match published {
            Some(outcome) => self.outcome_value(outcome),
            None => match self.instance().await?.outcome {
                Some(outcome) => self.outcome_value(outcome),
                None => Err(SagaError::InstanceStopped(self.id.clone())),
            },
        }
    }

    async fn instance(&self) -> Result<WorkflowInstance> {
        self.store
            .get_instance(&self.id)
            .await?
            .ok_or_else(|| SagaError::InstanceNotFound(self.id.clone()))
    }

    fn outcome_value(&self, outcome: StepOutcome) -> Result<Value> {
        outcome
            .into_result()
            .map_err(|message| SagaError::WorkflowFailed {
                workflow_id: self.id.clone(),
                message,
            })
    }
}
