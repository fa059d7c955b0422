//! The replay context handed to workflow definitions.
//!
//! A definition is re-run from its first step every time its instance is
//! driven. Each step operation takes the next step id; when the journal
//! already holds a record for that id, the recorded outcome is returned and
//! nothing runs. Otherwise the step executes once and its outcome is written
//! to the journal before the definition continues. A step that cannot
//! complete yet (a pending promise) suspends the run with
//! [`Interrupt::Suspended`]; the instance is driven again when the promise
//! settles.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{PromiseId, StepId, WorkflowId};
use durable_store::{DurableStore, StepKind, StepOutcome, StepRecord, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::dispatch::{Dispatcher, RemoteCall};
use crate::error::{SagaError, StepError};
use crate::promise::{PromiseGate, PromiseHandle};

/// Result of a step operation inside a workflow definition.
pub type Flow<T> = std::result::Result<T, Interrupt>;

/// Why a definition stopped before returning.
#[derive(Debug)]
pub enum Interrupt {
    /// A step is waiting on a pending promise.
    Suspended(Suspension),
    /// A step failed. Unhandled, this fails the instance with its message.
    Failed(StepError),
    /// The engine could not run the step (store error, non-determinism).
    Fault(SagaError),
}

impl Interrupt {
    /// Prefixes the message of a step failure; suspensions and faults pass
    /// through unchanged.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Interrupt::Failed(e) => Interrupt::Failed(e.context(prefix)),
            other => other,
        }
    }
}

impl From<StepError> for Interrupt {
    fn from(e: StepError) -> Self {
        Interrupt::Failed(e)
    }
}

impl From<SagaError> for Interrupt {
    fn from(e: SagaError) -> Self {
        Interrupt::Fault(e)
    }
}

impl From<StoreError> for Interrupt {
    fn from(e: StoreError) -> Self {
        Interrupt::Fault(SagaError::Store(e))
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(e: serde_json::Error) -> Self {
        Interrupt::Failed(e.into())
    }
}

/// Where a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    pub step: StepId,
    /// The promise being waited on; `None` when an inspection stopped at the
    /// first unrecorded step.
    pub promise: Option<PromiseId>,
}

/// A step as seen by the replay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub step: StepId,
    pub kind: StepKind,
    pub label: Option<String>,
}

/// Steps a definition would replay from the journal, and the first step it
/// would execute next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub replayed: Vec<Action>,
    pub next: Option<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Steps execute and are journaled.
    Live,
    /// Recorded steps replay; the first unrecorded step stops the run.
    Inspect,
}

enum Begin {
    Replayed(StepOutcome),
    Fresh(StepId),
}

/// Step operations available to a workflow definition.
pub struct WorkflowContext {
    workflow_id: WorkflowId,
    history: BTreeMap<StepId, StepRecord>,
    cursor: StepId,
    mode: Mode,
    store: Arc<dyn DurableStore>,
    dispatcher: Dispatcher,
    gate: PromiseGate,
    replayed: Vec<Action>,
    next: Option<Action>,
}

impl WorkflowContext {
    /// Loads the journal of `workflow_id` and positions the cursor at the
    /// first step.
    pub(crate) async fn load(
        workflow_id: WorkflowId,
        mode: Mode,
        store: Arc<dyn DurableStore>,
        dispatcher: Dispatcher,
        gate: PromiseGate,
    ) -> Result<Self, StoreError> {
        let history = store
            .get_steps(&workflow_id)
            .await?
            .into_iter()
            .map(|record| (record.step_id, record))
            .collect();

        Ok(Self {
            workflow_id,
            history,
            cursor: StepId::first(),
            mode,
            store,
            dispatcher,
            gate,
            replayed: Vec::new(),
            next: None,
        })
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Id the next step operation will take.
    pub fn current_step(&self) -> StepId {
        self.cursor
    }

    pub(crate) fn into_plan(self) -> Plan {
        Plan {
            replayed: self.replayed,
            next: self.next,
        }
    }

    /// Runs a local computation once and memoizes its result.
    ///
    /// Anything non-deterministic a definition needs (clocks, random ids)
    /// belongs in a `run` step so replays see the recorded value.
    pub async fn run<T, F>(&mut self, label: &str, f: F) -> Flow<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, StepError> + Send,
    {
        let step = match self.begin(StepKind::Local, Some(label))? {
            Begin::Replayed(outcome) => return decode(outcome),
            Begin::Fresh(step) => step,
        };

        let outcome = match f() {
            Ok(value) => StepOutcome::Success(serde_json::to_value(value)?),
            Err(e) => StepOutcome::Failure(e.message().to_string()),
        };
        let outcome = self
            .record(step, StepKind::Local, Some(label), outcome)
            .await?;
        decode(outcome)
    }

    /// Current wall-clock time, fixed at first execution.
    pub async fn now(&mut self) -> Flow<DateTime<Utc>> {
        self.run("now", || Ok(Utc::now())).await
    }

    /// Creates a durable promise that outside callers resolve by id.
    ///
    /// Without an explicit id the promise id derives from the workflow id
    /// and step, e.g. `order-123.2`.
    pub async fn promise(&mut self, id: Option<PromiseId>) -> Flow<PromiseHandle> {
        let step = match self.begin(StepKind::RemoteInvoke, Some("promise"))? {
            Begin::Replayed(outcome) => return decode(outcome),
            Begin::Fresh(step) => step,
        };

        let id = id.unwrap_or_else(|| PromiseId::derived(&self.workflow_id, step));
        self.gate.create(id.clone()).await?;
        let handle = PromiseHandle::new(id);

        let outcome = StepOutcome::Success(serde_json::to_value(&handle)?);
        let outcome = self
            .record(step, StepKind::RemoteInvoke, Some("promise"), outcome)
            .await?;
        decode(outcome)
    }

    /// Sends a remote call without waiting for its result.
    pub async fn rfi(&mut self, call: RemoteCall) -> Flow<PromiseHandle> {
        let label = call.function.clone();
        let step = match self.begin(StepKind::RemoteInvoke, Some(&label))? {
            Begin::Replayed(outcome) => return decode(outcome),
            Begin::Fresh(step) => step,
        };

        let id = self
            .dispatcher
            .invoke(&self.workflow_id, step, call)
            .await?;
        let outcome = StepOutcome::Success(serde_json::to_value(PromiseHandle::new(id))?);
        let outcome = self
            .record(step, StepKind::RemoteInvoke, Some(&label), outcome)
            .await?;
        decode(outcome)
    }

    /// Waits for a promise to settle. A rejection fails the step with the
    /// rejection message.
    pub async fn await_promise<T>(&mut self, handle: &PromiseHandle) -> Flow<T>
    where
        T: DeserializeOwned,
    {
        let label = handle.id.to_string();
        let step = match self.begin(StepKind::PromiseWait, Some(&label))? {
            Begin::Replayed(outcome) => return decode(outcome),
            Begin::Fresh(step) => step,
        };
        self.settle_wait(step, StepKind::PromiseWait, &label, &handle.id)
            .await
    }

    /// Sends a remote call and waits for its result, as a single step.
    pub async fn rfc<T>(&mut self, call: RemoteCall) -> Flow<T>
    where
        T: DeserializeOwned,
    {
        let label = call.function.clone();
        let step = match self.begin(StepKind::RemoteCall, Some(&label))? {
            Begin::Replayed(outcome) => return decode(outcome),
            Begin::Fresh(step) => step,
        };

        let id = self
            .dispatcher
            .invoke(&self.workflow_id, step, call)
            .await?;
        self.settle_wait(step, StepKind::RemoteCall, &label, &id)
            .await
    }

    /// Waits for every handle, in order. The first rejection fails the step
    /// sequence with its message.
    pub async fn await_all<T>(&mut self, handles: &[PromiseHandle]) -> Flow<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            values.push(self.await_promise(handle).await?);
        }
        Ok(values)
    }

    fn begin(&mut self, kind: StepKind, label: Option<&str>) -> Flow<Begin> {
        let step = self.cursor;
        self.cursor = step.next();
        let action = Action {
            step,
            kind,
            label: label.map(str::to_string),
        };

        if let Some(record) = self.history.get(&step) {
            if record.kind != kind || record.label.as_deref() != label {
                return Err(Interrupt::Fault(SagaError::NonDeterminism {
                    workflow_id: self.workflow_id.clone(),
                    step,
                    recorded: record.kind,
                    recorded_label: record.label.clone().unwrap_or_default(),
                    requested: kind,
                    requested_label: label.unwrap_or_default().to_string(),
                }));
            }
            metrics::counter!("saga_steps_replayed_total").increment(1);
            let outcome = record.outcome.clone();
            self.replayed.push(action);
            return Ok(Begin::Replayed(outcome));
        }

        if self.mode == Mode::Inspect {
            self.next = Some(action);
            return Err(Interrupt::Suspended(Suspension {
                step,
                promise: None,
            }));
        }

        tracing::debug!(workflow_id = %self.workflow_id, %step, %kind, "executing step");
        Ok(Begin::Fresh(step))
    }

    async fn settle_wait<T>(
        &mut self,
        step: StepId,
        kind: StepKind,
        label: &str,
        promise: &PromiseId,
    ) -> Flow<T>
    where
        T: DeserializeOwned,
    {
        match self.gate.poll(promise, &self.workflow_id).await? {
            Some(outcome) => {
                let outcome = self.record(step, kind, Some(label), outcome).await?;
                decode(outcome)
            }
            None => {
                tracing::debug!(
                    workflow_id = %self.workflow_id,
                    %step,
                    promise_id = %promise,
                    "suspending on promise"
                );
                Err(Interrupt::Suspended(Suspension {
                    step,
                    promise: Some(promise.clone()),
                }))
            }
        }
    }

    /// Journals the outcome of `step`. If another driver journaled it first,
    /// the stored outcome wins.
    async fn record(
        &mut self,
        step: StepId,
        kind: StepKind,
        label: Option<&str>,
        outcome: StepOutcome,
    ) -> Flow<StepOutcome> {
        let record = StepRecord::new(
            self.workflow_id.clone(),
            step,
            kind,
            label.map(str::to_string),
            outcome,
        );

        match self.store.record_step(record).await {
            Ok(record) => Ok(record.outcome),
            Err(e) if e.is_already_completed() => {
                let stored = self
                    .store
                    .get_step(&self.workflow_id, step)
                    .await?
                    .ok_or(Interrupt::Fault(SagaError::Store(e)))?;
                Ok(stored.outcome)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(outcome: StepOutcome) -> Flow<T> {
    match outcome {
        StepOutcome::Success(value) => Ok(serde_json::from_value(value)?),
        StepOutcome::Failure(message) => Err(Interrupt::Failed(StepError::new(message))),
    }
}
