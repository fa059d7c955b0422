//! Worker nodes that execute named remote functions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{IdempotencyKey, TargetGroup};
use durable_store::{RemoteTask, StepOutcome};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{StepError, TransportError};

/// A function a worker node exposes to remote callers.
///
/// Implemented for any `Fn(Value) -> impl Future<Output = Result<Value, StepError>>`
/// closure, so services usually register closures.
#[async_trait]
pub trait RemoteFunction: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, StepError>;
}

#[async_trait]
impl<F, Fut> RemoteFunction for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StepError>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value, StepError> {
        (self)(args).await
    }
}

/// A member of a target group.
///
/// Tasks are deduplicated by idempotency key: a redelivered task returns the
/// outcome of the first execution without running the function again.
pub struct ServiceNode {
    name: String,
    group: TargetGroup,
    functions: HashMap<String, Arc<dyn RemoteFunction>>,
    executed: Mutex<HashMap<IdempotencyKey, Arc<OnceCell<StepOutcome>>>>,
    executions: Mutex<HashMap<String, usize>>,
    live: AtomicBool,
}

impl ServiceNode {
    /// Starts building a node named `name` in `group`.
    pub fn builder(
        name: impl Into<String>,
        group: impl Into<TargetGroup>,
    ) -> ServiceNodeBuilder {
        ServiceNodeBuilder {
            name: name.into(),
            group: group.into(),
            functions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &TargetGroup {
        &self.group
    }

    /// Takes the node up or down. A down node refuses every task.
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of times `function` actually ran on this node.
    pub async fn executions(&self, function: &str) -> usize {
        self.executions
            .lock()
            .await
            .get(function)
            .copied()
            .unwrap_or(0)
    }

    /// Executes a task at most once per idempotency key.
    ///
    /// Application failures come back as `StepOutcome::Failure`; only a down
    /// node yields a [`TransportError`].
    #[tracing::instrument(skip(self, task), fields(node = %self.name, function = %task.function))]
    pub async fn execute(&self, task: &RemoteTask) -> Result<StepOutcome, TransportError> {
        if !self.is_live() {
            return Err(TransportError::NodeDown(self.name.clone()));
        }

        let cell = self
            .executed
            .lock()
            .await
            .entry(task.idempotency_key.clone())
            .or_default()
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                *self
                    .executions
                    .lock()
                    .await
                    .entry(task.function.clone())
                    .or_default() += 1;
                self.run(task).await
            })
            .await;
        Ok(outcome.clone())
    }

    async fn run(&self, task: &RemoteTask) -> StepOutcome {
        let Some(function) = self.functions.get(&task.function) else {
            tracing::warn!("function not registered");
            return StepOutcome::Failure(format!(
                "function {} is not registered on {}",
                task.function, self.group
            ));
        };

        match function.call(task.args.clone()).await {
            Ok(value) => StepOutcome::Success(value),
            Err(e) => {
                tracing::warn!(error = %e, "remote function failed");
                StepOutcome::Failure(e.to_string())
            }
        }
    }
}

/// Builder for [`ServiceNode`].
pub struct ServiceNodeBuilder {
    name: String,
    group: TargetGroup,
    functions: HashMap<String, Arc<dyn RemoteFunction>>,
}

impl ServiceNodeBuilder {
    /// Registers a function under `name`.
    pub fn function(
        mut self,
        name: impl Into<String>,
        function: impl RemoteFunction + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn build(self) -> ServiceNode {
        ServiceNode {
            name: self.name,
            group: self.group,
            functions: self.functions,
            executed: Mutex::new(HashMap::new()),
            executions: Mutex::new(HashMap::new()),
            live: AtomicBool::new(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{PromiseId, TaskId};
    use serde_json::json;

    fn task(key: &str, function: &str, args: Value) -> RemoteTask {
        RemoteTask {
            task_id: TaskId::new(),
            promise_id: PromiseId::new(key),
            target: TargetGroup::new("math"),
            function: function.to_string(),
            args,
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    fn node() -> ServiceNode {
        ServiceNode::builder("math-1", "math")
            .function("double", |args: Value| async move {
                let n = args.as_i64().ok_or_else(|| StepError::new("expected a number"))?;
                Ok::<_, StepError>(json!(n * 2))
            })
            .build()
    }

    #[tokio::test]
    async fn executes_registered_function() {
        let node = node();
        let outcome = node.execute(&task("k1", "double", json!(21))).await.unwrap();
        assert_eq!(outcome, StepOutcome::Success(json!(42)));
    }

    #[tokio::test]
    async fn redelivery_is_deduplicated() {
        let node = node();
        let first = node.execute(&task("k1", "double", json!(1))).await.unwrap();
        let again = node.execute(&task("k1", "double", json!(1))).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(node.executions("double").await, 1);

        node.execute(&task("k2", "double", json!(1))).await.unwrap();
        assert_eq!(node.executions("double").await, 2);
    }

    #[tokio::test]
    async fn application_errors_are_outcomes() {
        let node = node();
        let outcome = node
            .execute(&task("k1", "double", json!("two")))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Failure("expected a number".into()));

        let unknown = node.execute(&task("k2", "triple", json!(1))).await.unwrap();
        assert!(!unknown.is_success());
    }

    #[tokio::test]
    async fn down_node_refuses_work() {
        let node = node();
        node.set_live(false);
        let result = node.execute(&task("k1", "double", json!(1))).await;
        assert!(matches!(result, Err(TransportError::NodeDown(_))));
        assert_eq!(node.executions("double").await, 0);
    }
}
