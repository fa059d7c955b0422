//! Task delivery to worker groups.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{IdempotencyKey, TargetGroup};
use durable_store::{RemoteTask, StepOutcome};
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::error::TransportError;
use crate::worker::ServiceNode;

/// Delivery channel for remote tasks.
///
/// `deliver` returns the callee's outcome. Delivery is at-least-once:
/// callers may hand the same task over again after a restart, and receivers
/// deduplicate on the task's idempotency key.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, task: &RemoteTask) -> Result<StepOutcome, TransportError>;
}

/// Exponential backoff between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

type Receipts = HashMap<(TargetGroup, IdempotencyKey), Arc<OnceCell<StepOutcome>>>;

/// In-process transport that load-balances tasks round-robin across the
/// nodes registered for each target group.
///
/// Receipts are kept per group, not per node: a task redelivered to another
/// replica of the same group gets the first outcome back and runs nowhere.
#[derive(Clone, Default)]
pub struct LocalTransport {
    groups: Arc<RwLock<HashMap<TargetGroup, Vec<Arc<ServiceNode>>>>>,
    cursor: Arc<AtomicUsize>,
    receipts: Arc<Mutex<Receipts>>,
    delivered: Arc<Mutex<HashMap<String, usize>>>,
    policy: RetryPolicy,
}

impl LocalTransport {
    /// Creates a transport with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Adds a node to its target group.
    pub async fn register(&self, node: Arc<ServiceNode>) {
        tracing::info!(node = node.name(), group = %node.group(), "worker node registered");
        self.groups
            .write()
            .await
            .entry(node.group().clone())
            .or_default()
            .push(node);
    }

    /// Nodes registered for a group.
    pub async fn nodes(&self, group: &TargetGroup) -> Vec<Arc<ServiceNode>> {
        self.groups
            .read()
            .await
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful deliveries of `function`, redeliveries included.
    pub async fn delivered(&self, function: &str) -> usize {
        self.delivered
            .lock()
            .await
            .get(function)
            .copied()
            .unwrap_or(0)
    }

    async fn pick(&self, group: &TargetGroup) -> Option<Arc<ServiceNode>> {
        let groups = self.groups.read().await;
        let nodes = groups.get(group).filter(|nodes| !nodes.is_empty())?;
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
        Some(nodes[index].clone())
    }

    async fn receipt(&self, task: &RemoteTask) -> Arc<OnceCell<StepOutcome>> {
        self.receipts
            .lock()
            .await
            .entry((task.target.clone(), task.idempotency_key.clone()))
            .or_default()
            .clone()
    }

    async fn attempt(&self, task: &RemoteTask) -> Result<StepOutcome, TransportError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let result = match self.pick(&task.target).await {
                Some(node) => node.execute(task).await,
                None => Err(TransportError::Unreachable(task.target.clone())),
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "delivery attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                metrics::counter!("transport_retries_total").increment(1);
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(TransportError::Exhausted {
            target: task.target.clone(),
            attempts: max_attempts,
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    #[tracing::instrument(skip(self, task), fields(target = %task.target, function = %task.function, key = %task.idempotency_key))]
    async fn deliver(&self, task: &RemoteTask) -> Result<StepOutcome, TransportError> {
        let receipt = self.receipt(task).await;
        if receipt.initialized() {
            tracing::debug!("task already executed in group");
        }
        let outcome = receipt.get_or_try_init(|| self.attempt(task)).await?.clone();

        *self
            .delivered
            .lock()
            .await
            .entry(task.function.clone())
            .or_default() += 1;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use common::{IdempotencyKey, PromiseId, TaskId};
    use serde_json::{Value, json};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn echo_node(name: &str) -> Arc<ServiceNode> {
        let name = name.to_string();
        let reply = name.clone();
        Arc::new(
            ServiceNode::builder(name, "echo")
                .function("whoami", move |_args: Value| {
                    let reply = reply.clone();
                    async move { Ok::<_, StepError>(json!(reply)) }
                })
                .build(),
        )
    }

    fn task(key: &str) -> RemoteTask {
        RemoteTask {
            task_id: TaskId::new(),
            promise_id: PromiseId::new(key),
            target: TargetGroup::new("echo"),
            function: "whoami".into(),
            args: Value::Null,
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn round_robins_across_group() {
        let transport = LocalTransport::new(fast_policy());
        transport.register(echo_node("echo-1")).await;
        transport.register(echo_node("echo-2")).await;

        let mut seen = Vec::new();
        for key in ["a", "b", "c", "d"] {
            match transport.deliver(&task(key)).await.unwrap() {
                StepOutcome::Success(value) => seen.push(value),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(
            seen,
            vec![json!("echo-1"), json!("echo-2"), json!("echo-1"), json!("echo-2")]
        );
        assert_eq!(transport.delivered("whoami").await, 4);
    }

    #[tokio::test]
    async fn retries_past_a_down_node() {
        let transport = LocalTransport::new(fast_policy());
        let down = echo_node("echo-1");
        down.set_live(false);
        transport.register(down).await;
        transport.register(echo_node("echo-2")).await;

        let outcome = transport.deliver(&task("a")).await.unwrap();
        assert_eq!(outcome, StepOutcome::Success(json!("echo-2")));
    }

    #[tokio::test]
    async fn exhausts_when_every_node_is_down() {
        let transport = LocalTransport::new(fast_policy());
        let down = echo_node("echo-1");
        down.set_live(false);
        transport.register(down).await;

        let result = transport.deliver(&task("a")).await;
        match result {
            Err(TransportError::Exhausted { attempts, reason, .. }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("echo-1 is down"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redelivery_to_another_replica_runs_once() {
        let transport = LocalTransport::new(fast_policy());
        let replica_1 = echo_node("echo-1");
        let replica_2 = echo_node("echo-2");
        transport.register(replica_1.clone()).await;
        transport.register(replica_2.clone()).await;

        let first = transport.deliver(&task("wf:0")).await.unwrap();
        let again = transport.deliver(&task("wf:0")).await.unwrap();

        assert_eq!(first, StepOutcome::Success(json!("echo-1")));
        assert_eq!(again, first);
        let executions =
            replica_1.executions("whoami").await + replica_2.executions("whoami").await;
        assert_eq!(executions, 1);
        assert_eq!(transport.delivered("whoami").await, 2);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_no_receipt() {
        let transport = LocalTransport::new(fast_policy());
        let node = echo_node("echo-1");
        node.set_live(false);
        transport.register(node.clone()).await;

        assert!(transport.deliver(&task("wf:0")).await.is_err());

        node.set_live(true);
        let outcome = transport.deliver(&task("wf:0")).await.unwrap();
        assert_eq!(outcome, StepOutcome::Success(json!("echo-1")));
        assert_eq!(node.executions("whoami").await, 1);
    }

    #[tokio::test]
    async fn unknown_group_is_unreachable() {
        let transport = LocalTransport::new(fast_policy());
        let result = transport.deliver(&task("a")).await;
        assert!(matches!(result, Err(TransportError::Exhausted { .. })));
    }
}
