//! Integration tests for the saga orchestration engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{PromiseId, WorkflowId};
use domain::{NewCustomer, NewOrderItem, Order, OrderGate, OrderStatus};
use durable_store::{
    DurableStore, InMemoryDurableStore, PromiseState, RemoteTask, StepKind, StepOutcome,
    StepRecord, WorkflowStatus,
};
use saga::{
    Flow, LocalTransport, Orchestrator, PromiseHandle, RemoteCall, RetryPolicy, SagaError, ServiceNode, Services,
    StepError, Transport, TransportError, Workflow, WorkflowContext, WorkflowRegistry, workflows,
};
use serde_json::{Value, json};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

struct TestHarness {
    store: Arc<InMemoryDurableStore>,
    transport: LocalTransport,
    services: Services,
    nodes: Vec<Arc<ServiceNode>>,
    orchestrator: Orchestrator,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_registry(workflows::registry()).await
    }

    async fn with_registry(registry: WorkflowRegistry) -> Self {
        let store = Arc::new(InMemoryDurableStore::new());
        let transport = LocalTransport::new(fast_policy());
        let services = Services::new();
        let nodes = services.register(&transport, 2).await;
        let orchestrator = Orchestrator::builder(store.clone(), Arc::new(transport.clone()))
            .registry(registry)
            .build();

        Self {
            store,
            transport,
            services,
            nodes,
            orchestrator,
        }
    }

    /// A second orchestrator on the same store and workers, as after a
    /// process restart.
    fn restart(&self, registry: WorkflowRegistry) -> Orchestrator {
        Orchestrator::builder(self.store.clone(), Arc::new(self.transport.clone()))
            .registry(registry)
            .build()
    }

    async fn seed_order(&self, order_id: i64, email: &str) {
        self.services
            .customers
            .store()
            .create(NewCustomer {
                customer_email: email.to_string(),
                customer_name: "Alice".to_string(),
                customer_delivery_address: "1 Main St".to_string(),
            })
            .await
            .unwrap();

        let orders = self.services.orders.store();
        orders.insert(Order::cart(order_id, email)).await.unwrap();
        orders
            .add_item(
                order_id,
                NewOrderItem {
                    product_name: "pizza".to_string(),
                    product_display: "Pizza".to_string(),
                    product_price: 12,
                    product_image: None,
                },
            )
            .await
            .unwrap();
    }

    async fn order(&self, order_id: i64) -> Order {
        self.services.orders.store().get(order_id).await.unwrap()
    }

    /// Times `function` actually ran, across every node.
    async fn executions(&self, function: &str) -> usize {
        let mut total = 0;
        for node in &self.nodes {
            total += node.executions(function).await;
        }
        total
    }

    async fn wait_for_journal(&self, id: &WorkflowId, len: usize) -> Vec<StepRecord> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let steps = self.store.get_steps(id).await.unwrap();
                if steps.len() >= len {
                    return steps;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("journal of {id} never reached {len} steps"))
    }

    async fn wait_for_status(&self, order_id: i64, status: OrderStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.order(order_id).await.order_status != status {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("order {order_id} never reached {status}"));
    }
}

fn order_123() -> WorkflowId {
    WorkflowId::new("order-123")
}

#[tokio::test]
async fn test_order_123_issues_calls_then_waits_for_payment() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;

    h.orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();

    let steps = h.wait_for_journal(&order_123(), 9).await;
    let shape: Vec<(StepKind, Option<&str>)> = steps
        .iter()
        .map(|s| (s.kind, s.label.as_deref()))
        .collect();
    let mut expected = vec![
        (StepKind::RemoteCall, Some("get_order_by_id")),
        (StepKind::RemoteCall, Some("get_customer")),
    ];
    expected.extend([(StepKind::RemoteInvoke, Some("promise")); 6]);
    expected.push((StepKind::RemoteCall, Some("update_order_by_id")));
    assert_eq!(shape, expected);

    let order = h.order(123).await;
    assert_eq!(order.order_status, OrderStatus::PaymentRequired);
    assert_eq!(order.customer_name.as_deref(), Some("Alice"));
    assert_eq!(
        order.gate_promise(OrderGate::PaymentConfirmation),
        Some("order-123.2")
    );
    assert_eq!(
        order.gate_promise(OrderGate::DeliveryConfirmation),
        Some("order-123.7")
    );

    h.orchestrator
        .resolve_promise(&PromiseId::new("order-123.2"), json!({"paid": true}))
        .await
        .unwrap();
    h.wait_for_status(123, OrderStatus::PaymentComplete).await;

    h.orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 11).await;

    assert_eq!(h.executions("get_order_by_id").await, 1);
    assert_eq!(h.executions("get_customer").await, 1);
    assert_eq!(h.executions("update_order_by_id").await, 2);
}

#[tokio::test]
async fn test_fulfillment_writes_the_eight_stage_history() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;

    let handle = h
        .orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 9).await;

    // Resolve out of waiting order; the saga still advances one stage at a time.
    let order = h.order(123).await;
    for gate in OrderGate::ALL.into_iter().rev() {
        let id = order.gate_promise(gate).unwrap();
        h.orchestrator
            .resolve_promise(&PromiseId::new(id), Value::Null)
            .await
            .unwrap();
    }

    let result = handle.result().await.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(handle.status().await.unwrap(), WorkflowStatus::Completed);
    assert_eq!(
        h.services.orders.store().status_history(123).await,
        OrderStatus::ALL.to_vec()
    );
    assert_eq!(h.executions("update_order_by_id").await, 7);
}

#[tokio::test]
async fn test_resubmission_returns_first_result() {
    let h = TestHarness::new().await;
    let id = WorkflowId::new("in-progress-1");

    let first = h
        .orchestrator
        .submit(id.clone(), "dispatch_get_in_progress_orders", Value::Null)
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    let second = h
        .orchestrator
        .submit(id.clone(), "dispatch_get_in_progress_orders", Value::Null)
        .await
        .unwrap()
        .result()
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.transport.delivered("get_in_progress_orders").await, 1);
}

#[tokio::test]
async fn test_concurrent_submissions_share_one_instance() {
    let h = TestHarness::new().await;
    let id = WorkflowId::new("in-progress-race");

    let submissions = (0..8).map(|_| {
        h.orchestrator
            .submit(id.clone(), "dispatch_get_in_progress_orders", Value::Null)
    });
    let handles = futures_util::future::join_all(submissions).await;

    for handle in handles {
        let result = handle.unwrap().result().await.unwrap();
        assert_eq!(result["success"], true);
    }
    assert_eq!(h.transport.delivered("get_in_progress_orders").await, 1);
}

#[tokio::test]
async fn test_promise_resolves_only_once() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;
    h.orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 9).await;

    let payment = PromiseId::new("order-123.2");
    h.orchestrator
        .resolve_promise(&payment, json!("first"))
        .await
        .unwrap();
    let second = h.orchestrator.reject_promise(&payment, "second").await;
    assert!(matches!(second, Err(SagaError::AlreadyCompleted(_))));

    let promise = h.orchestrator.get_promise(&payment).await.unwrap();
    assert_eq!(promise.state, PromiseState::Resolved);
    assert_eq!(promise.value, Some(json!("first")));
}

#[tokio::test]
async fn test_rejected_gate_fails_the_order() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;
    let handle = h
        .orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 9).await;

    h.orchestrator
        .reject_promise(&PromiseId::new("order-123.2"), "card declined")
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    match err {
        SagaError::WorkflowFailed { message, .. } => {
            assert_eq!(message, "Error in Order Workflow: card declined")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.order(123).await.order_status, OrderStatus::PaymentRequired);
}

#[tokio::test]
async fn test_missing_order_fails_with_original_message() {
    let h = TestHarness::new().await;
    let id = WorkflowId::new("order-999");
    let handle = h
        .orchestrator
        .submit(id.clone(), "order_workflow", json!({"order_id": 999}))
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Workflow order-999 failed: Error in Order Workflow: order with ID 999 not found"
    );
    assert_eq!(handle.status().await.unwrap(), WorkflowStatus::Failed);

    let journal = h.orchestrator.journal(&id).await.unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(
        journal[0].outcome,
        StepOutcome::Success(json!({"success": false, "message": "order with ID 999 not found"}))
    );
}

#[tokio::test]
async fn test_validation_happens_before_any_step() {
    let h = TestHarness::new().await;
    let id = WorkflowId::new("bad");

    let err = h
        .orchestrator
        .submit(id.clone(), "order_workflow", json!({"customer_email": "a@b.c"}))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SagaError::Validation(_)));
    assert!(matches!(
        h.orchestrator.get_instance(&id).await,
        Err(SagaError::InstanceNotFound(_))
    ));

    let err = h
        .orchestrator
        .submit(id, "no_such_workflow", Value::Null)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SagaError::UnknownWorkflow(_)));
}

#[tokio::test]
async fn test_resubmission_ignores_new_input() {
    let h = TestHarness::new().await;
    let id = WorkflowId::new("order-999");

    let first = h
        .orchestrator
        .submit(id.clone(), "order_workflow", json!({"order_id": 999}))
        .await
        .unwrap()
        .result()
        .await
        .map_err(|e| e.to_string());

    let again = h
        .orchestrator
        .submit(id.clone(), "order_workflow", json!({"customer_email": "a@b.c"}))
        .await
        .unwrap()
        .result()
        .await
        .map_err(|e| e.to_string());

    assert_eq!(first, again);
    assert_eq!(h.orchestrator.journal(&id).await.unwrap().len(), 1);
}

struct AwaitsUnknownPromise;

#[async_trait]
impl Workflow for AwaitsUnknownPromise {
    fn name(&self) -> &str {
        "ghost_wait"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let handle = PromiseHandle::new(PromiseId::new("nobody-made-this"));
        ctx.await_promise(&handle).await
    }
}

#[tokio::test]
async fn test_awaiting_unknown_promise_fails_the_workflow() {
    let h = TestHarness::with_registry(
        WorkflowRegistry::builder()
            .register(AwaitsUnknownPromise)
            .build(),
    )
    .await;
    let id = WorkflowId::new("ghost-1");

    let err = h
        .orchestrator
        .submit(id.clone(), "ghost_wait", Value::Null)
        .await
        .unwrap()
        .result()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Promise not found: nobody-made-this"), "{err}");
    assert_eq!(
        h.orchestrator.get_instance(&id).await.unwrap().status,
        WorkflowStatus::Failed
    );
    assert_eq!(h.orchestrator.recover().await.unwrap().resumed, 0);
}

struct ReserveThenWait;

#[async_trait]
impl Workflow for ReserveThenWait {
    fn name(&self) -> &str {
        "relabeled"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let _: String = ctx.run("reserve_stock", || Ok("reserved".to_string())).await?;
        let gate = ctx.promise(None).await?;
        ctx.await_promise(&gate).await
    }
}

struct ChargeThenWait;

#[async_trait]
impl Workflow for ChargeThenWait {
    fn name(&self) -> &str {
        "relabeled"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let charged: String = ctx.run("charge_card", || Ok("charged".to_string())).await?;
        Ok(json!(charged))
    }
}

#[tokio::test]
async fn test_renamed_step_fails_replay() {
    let h =
        TestHarness::with_registry(WorkflowRegistry::builder().register(ReserveThenWait).build())
            .await;
    let id = WorkflowId::new("relabeled-1");
    h.orchestrator
        .submit(id.clone(), "relabeled", Value::Null)
        .await
        .unwrap();
    h.wait_for_journal(&id, 2).await;
    h.orchestrator.shutdown().await;

    let restarted = h.restart(WorkflowRegistry::builder().register(ChargeThenWait).build());
    restarted.recover().await.unwrap();

    let err = restarted.handle(id.clone()).result().await.unwrap_err();
    assert!(err.to_string().contains("'reserve_stock'"), "{err}");
    assert!(err.to_string().contains("'charge_card'"), "{err}");
    assert_eq!(
        restarted.get_instance(&id).await.unwrap().status,
        WorkflowStatus::Failed
    );
}

#[tokio::test]
async fn test_exhausted_transport_surfaces_as_step_error() {
    let h = TestHarness::new().await;
    for node in &h.nodes {
        node.set_live(false);
    }

    let handle = h
        .orchestrator
        .submit(
            WorkflowId::new("in-progress-down"),
            "dispatch_get_in_progress_orders",
            Value::Null,
        )
        .await
        .unwrap();

    let err = handle.result().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("failed after 3 attempts"), "{message}");
    assert_eq!(h.executions("get_in_progress_orders").await, 0);
}

#[tokio::test]
async fn test_customer_view_fans_out_reads() {
    let h = TestHarness::new().await;
    h.seed_order(1, "alice@example.com").await;
    h.services
        .products
        .add_product(json!({
            "product_name": "pizza",
            "product_display": "Pizza",
            "product_price": 12,
            "product_image": "pizza.png",
        }))
        .await
        .unwrap();

    let view = h
        .orchestrator
        .submit(
            WorkflowId::new("get-customer-view-alice"),
            "get_customer_view_workflow",
            json!("alice@example.com"),
        )
        .await
        .unwrap()
        .result()
        .await
        .unwrap();

    assert_eq!(view["success"], true);
    let view = &view["customer_view"];
    assert_eq!(view["customer"]["customer_name"], "Alice");
    assert_eq!(view["cart"]["order_id"], 1);
    assert_eq!(view["products"].as_array().unwrap().len(), 1);
    assert_eq!(view["orders"], json!([]));

    let unknown = h
        .orchestrator
        .submit(
            WorkflowId::new("get-customer-view-bob"),
            "get_customer_view_workflow",
            json!({"customer_email": "bob@example.com"}),
        )
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    assert_eq!(
        unknown,
        json!({"success": false, "message": "Customer not found"})
    );
}

struct FanOut;

#[async_trait]
impl Workflow for FanOut {
    fn name(&self) -> &str {
        "fan_out"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let mut handles = Vec::new();
        for (tag, ms) in [("a", 40), ("b", 20), ("c", 1)] {
            let call = RemoteCall::new("slow", "echo_after", json!({"tag": tag, "ms": ms}));
            handles.push(ctx.rfi(call).await?);
        }

        let mut tags = Vec::new();
        for handle in handles.iter().rev() {
            let tag: String = ctx.await_promise(handle).await?;
            tags.push(tag);
        }
        Ok(json!(tags))
    }
}

#[tokio::test]
async fn test_fan_out_results_match_their_calls() {
    let h = TestHarness::with_registry(WorkflowRegistry::builder().register(FanOut).build()).await;
    h.transport
        .register(Arc::new(
            ServiceNode::builder("slow-1", "slow")
                .function("echo_after", |args: Value| async move {
                    let ms = args["ms"].as_u64().unwrap_or_default();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, StepError>(args["tag"].clone())
                })
                .build(),
        ))
        .await;

    let result = h
        .orchestrator
        .submit(WorkflowId::new("fan-1"), "fan_out", Value::Null)
        .await
        .unwrap()
        .result()
        .await
        .unwrap();

    assert_eq!(result, json!(["c", "b", "a"]));
}

#[tokio::test]
async fn test_restart_resumes_without_repeating_calls() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;
    h.orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 9).await;
    h.orchestrator.shutdown().await;
    assert_eq!(h.orchestrator.active_instances().await, 0);

    let restarted = h.restart(workflows::registry());
    let report = restarted.recover().await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(report.redelivered, 0);

    let order = h.order(123).await;
    for gate in OrderGate::WAIT_ORDER {
        let id = order.gate_promise(gate).unwrap();
        restarted
            .resolve_promise(&PromiseId::new(id), Value::Null)
            .await
            .unwrap();
    }

    let result = restarted.handle(order_123()).result().await.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(h.executions("get_order_by_id").await, 1);
    assert_eq!(h.executions("get_customer").await, 1);
    assert_eq!(h.executions("update_order_by_id").await, 7);
}

/// Accepts tasks and never delivers them, like a process that died right
/// after persisting its calls.
struct BlackHole;

#[async_trait]
impl Transport for BlackHole {
    async fn deliver(&self, _task: &RemoteTask) -> Result<StepOutcome, TransportError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_recovery_redelivers_pending_tasks() {
    let h = TestHarness::new().await;
    let crashed = Orchestrator::builder(h.store.clone(), Arc::new(BlackHole))
        .registry(workflows::registry())
        .build();
    let id = WorkflowId::new("in-progress-crash");

    crashed
        .submit(id.clone(), "dispatch_get_in_progress_orders", Value::Null)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.promise_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    crashed.shutdown().await;

    let restarted = h.restart(workflows::registry());
    let report = restarted.recover().await.unwrap();
    assert_eq!(report.redelivered, 1);
    assert_eq!(report.resumed, 1);

    let result = restarted.handle(id).result().await.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(h.executions("get_in_progress_orders").await, 1);
}

#[tokio::test]
async fn test_plan_reports_replayed_steps_and_next_step() {
    let h = TestHarness::new().await;
    h.seed_order(123, "alice@example.com").await;
    h.orchestrator
        .submit(order_123(), "order_workflow", json!({"order_id": 123}))
        .await
        .unwrap();
    h.wait_for_journal(&order_123(), 9).await;

    let first = h.orchestrator.plan(&order_123()).await.unwrap();
    let second = h.orchestrator.plan(&order_123()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.replayed.len(), 9);

    let next = first.next.unwrap();
    assert_eq!(next.step.as_u32(), 9);
    assert_eq!(next.kind, StepKind::PromiseWait);
    assert_eq!(next.label.as_deref(), Some("order-123.2"));
    assert_eq!(h.store.step_count().await, 9);
}

struct RollThenWait;

#[async_trait]
impl Workflow for RollThenWait {
    fn name(&self) -> &str {
        "shifty"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let _: i64 = ctx.run("roll", || Ok(4)).await?;
        let gate = ctx.promise(None).await?;
        ctx.await_promise(&gate).await
    }
}

struct WaitFirst;

#[async_trait]
impl Workflow for WaitFirst {
    fn name(&self) -> &str {
        "shifty"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        let gate = ctx.promise(None).await?;
        ctx.await_promise(&gate).await
    }
}

#[tokio::test]
async fn test_changed_definition_fails_replay() {
    let h =
        TestHarness::with_registry(WorkflowRegistry::builder().register(RollThenWait).build())
            .await;
    let id = WorkflowId::new("shifty-1");
    h.orchestrator
        .submit(id.clone(), "shifty", Value::Null)
        .await
        .unwrap();
    h.wait_for_journal(&id, 2).await;
    h.orchestrator.shutdown().await;

    let restarted = h.restart(WorkflowRegistry::builder().register(WaitFirst).build());
    restarted.recover().await.unwrap();

    let err = restarted.handle(id.clone()).result().await.unwrap_err();
    assert!(err.to_string().contains("Non-deterministic replay"), "{err}");
    assert_eq!(
        restarted.get_instance(&id).await.unwrap().status,
        WorkflowStatus::Failed
    );
    assert_eq!(restarted.journal(&id).await.unwrap().len(), 2);
}
