//! Wake-up bookkeeping for live workflow instances.
//!
//! Each live instance runs as one tokio task that sleeps on its own wake
//! channel. Settling a promise wakes exactly the instances registered as
//! waiting on it; nothing polls.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use common::{PromiseId, WorkflowId};
use durable_store::StepOutcome;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

struct Slot {
    wake: mpsc::UnboundedSender<()>,
    done: watch::Sender<Option<StepOutcome>>,
    task: JoinHandle<()>,
}

/// Tracks the task, wake channel and completion signal of every instance
/// driven by this process, and which instances wait on which promises.
#[derive(Default)]
pub struct Scheduler {
    slots: Mutex<HashMap<WorkflowId, Slot>>,
    waiters: Mutex<HashMap<PromiseId, HashSet<WorkflowId>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `drive` for `id` unless a task for it is already live.
    ///
    /// Returns true if a task was spawned.
    pub(crate) async fn activate<F, Fut>(&self, id: &WorkflowId, drive: F) -> bool
    where
        F: FnOnce(mpsc::UnboundedReceiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(id) {
            return false;
        }

        let (wake, wake_rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(None);
        // The lock is held until the slot is inserted, so the task cannot
        // finish and look for its slot before it exists.
        let task = tokio::spawn(drive(wake_rx));
        slots.insert(id.clone(), Slot { wake, done, task });
        true
    }

    /// Returns true if a task is driving `id` in this process.
    pub async fn is_active(&self, id: &WorkflowId) -> bool {
        self.slots.lock().await.contains_key(id)
    }

    /// Number of instances driven by this process.
    pub async fn active_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Subscribes to the completion of `id`, if it is live.
    pub(crate) async fn subscribe(
        &self,
        id: &WorkflowId,
    ) -> Option<watch::Receiver<Option<StepOutcome>>> {
        self.slots
            .lock()
            .await
            .get(id)
            .map(|slot| slot.done.subscribe())
    }

    /// Publishes the terminal outcome of `id` and retires its slot.
    pub(crate) async fn finish(&self, id: &WorkflowId, outcome: StepOutcome) {
        if let Some(slot) = self.slots.lock().await.remove(id) {
            slot.done.send_replace(Some(outcome));
        }
    }

    /// Retires the slot of `id` without an outcome; subscribers observe a
    /// closed channel.
    pub(crate) async fn release(&self, id: &WorkflowId) {
        self.slots.lock().await.remove(id);
    }

    /// Wakes `id` so it re-drives its definition.
    pub(crate) async fn wake(&self, id: &WorkflowId) {
        if let Some(slot) = self.slots.lock().await.get(id) {
            let _ = slot.wake.send(());
        }
    }

    /// Records that `id` is suspended on `promise`.
    pub(crate) async fn register_waiter(&self, promise: &PromiseId, id: &WorkflowId) {
        self.waiters
            .lock()
            .await
            .entry(promise.clone())
            .or_default()
            .insert(id.clone());
    }

    pub(crate) async fn forget_waiter(&self, promise: &PromiseId, id: &WorkflowId) {
        let mut waiters = self.waiters.lock().await;
        if let Some(ids) = waiters.get_mut(promise) {
            ids.remove(id);
            if ids.is_empty() {
                waiters.remove(promise);
            }
        }
    }

    /// Wakes every instance waiting on `promise`.
    pub(crate) async fn wake_waiters(&self, promise: &PromiseId) {
        let ids = self.waiters.lock().await.remove(promise).unwrap_or_default();
        for id in ids {
            tracing::debug!(workflow_id = %id, promise_id = %promise, "waking waiter");
            self.wake(&id).await;
        }
    }

    /// Aborts every instance task. Journals and instances stay in the store.
    pub async fn shutdown(&self) {
        let slots: Vec<(WorkflowId, Slot)> = self.slots.lock().await.drain().collect();
        for (id, slot) in slots {
            tracing::debug!(workflow_id = %id, "aborting instance task");
            slot.task.abort();
        }
        self.waiters.lock().await.clear();
    }
}
