//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency and run
//! serially because every test truncates the shared tables.
//!
//! ```bash
//! cargo test -p durable-store --test postgres_integration
//! ```

use std::sync::Arc;

use durable_store::{
    DurableStore, IdempotencyKey, NewPromise, PostgresDurableStore, PromiseId, PromiseState,
    RemoteTask, Settlement, StepId, StepKind, StepOutcome, StepRecord, StoreError, TargetGroup,
    TaskId, WorkflowId, WorkflowInstance, WorkflowStatus,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_durable_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresDurableStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE durable_promises, step_records, workflow_instances")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDurableStore::new(pool)
}

fn task(workflow: &str, step: u32) -> RemoteTask {
    let workflow_id = WorkflowId::new(workflow);
    let step = StepId::new(step);
    RemoteTask {
        task_id: TaskId::new(),
        promise_id: PromiseId::derived(&workflow_id, step),
        target: TargetGroup::new("orders-service-nodes"),
        function: "get_order_by_id".to_string(),
        args: json!(123),
        idempotency_key: IdempotencyKey::for_step(&workflow_id, step),
    }
}

#[tokio::test]
#[serial]
async fn create_promise_once() {
    let store = get_test_store().await;
    let id = PromiseId::new("order-123.payment");

    let first = store
        .create_promise(NewPromise::rendezvous(id.clone()))
        .await
        .unwrap();
    assert!(first.was_created());
    assert_eq!(first.promise().state, PromiseState::Pending);

    let second = store
        .create_promise(NewPromise::rendezvous(id.clone()))
        .await
        .unwrap();
    assert!(!second.was_created());
    assert_eq!(second.promise().id, id);
}

#[tokio::test]
#[serial]
async fn settle_promise_first_writer_wins() {
    let store = get_test_store().await;
    let id = PromiseId::new("order-123.payment");
    store
        .create_promise(NewPromise::rendezvous(id.clone()))
        .await
        .unwrap();

    let settled = store
        .settle_promise(&id, Settlement::Resolve(json!({"paid": true})))
        .await
        .unwrap();
    assert_eq!(settled.state, PromiseState::Resolved);
    assert!(settled.resolved_at.is_some());

    let late = store
        .settle_promise(&id, Settlement::Reject("declined".into()))
        .await;
    assert!(matches!(late, Err(StoreError::AlreadyCompleted { .. })));

    let stored = store.get_promise(&id).await.unwrap().unwrap();
    assert_eq!(
        stored.outcome(),
        Some(StepOutcome::Success(json!({"paid": true})))
    );
}

#[tokio::test]
#[serial]
async fn settle_missing_promise_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .settle_promise(&PromiseId::new("nope"), Settlement::Resolve(json!(null)))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn task_survives_round_trip_and_leaves_pending_on_settle() {
    let store = get_test_store().await;
    let first = task("wf-1", 0);
    let second = task("wf-1", 1);
    store
        .create_promise(NewPromise::for_task(first.clone()))
        .await
        .unwrap();
    store
        .create_promise(NewPromise::for_task(second.clone()))
        .await
        .unwrap();

    let pending = store.pending_tasks().await.unwrap();
    assert_eq!(pending, vec![first.clone(), second.clone()]);

    store
        .settle_promise(&first.promise_id, Settlement::Resolve(json!({"order_id": 123})))
        .await
        .unwrap();

    let pending = store.pending_tasks().await.unwrap();
    assert_eq!(pending, vec![second]);
}

#[tokio::test]
#[serial]
async fn step_records_are_write_once_and_ordered() {
    let store = get_test_store().await;
    let workflow_id = WorkflowId::new("wf-steps");

    for step in [1, 0] {
        store
            .record_step(StepRecord::new(
                workflow_id.clone(),
                StepId::new(step),
                StepKind::Local,
                Some(format!("step-{step}")),
                StepOutcome::Success(json!(step)),
            ))
            .await
            .unwrap();
    }

    let duplicate = store
        .record_step(StepRecord::new(
            workflow_id.clone(),
            StepId::new(0),
            StepKind::RemoteCall,
            None,
            StepOutcome::Failure("other".into()),
        ))
        .await;
    assert!(matches!(duplicate, Err(StoreError::AlreadyCompleted { .. })));

    let steps = store.get_steps(&workflow_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_id, StepId::new(0));
    assert_eq!(steps[0].kind, StepKind::Local);
    assert_eq!(steps[0].outcome, StepOutcome::Success(json!(0)));
    assert_eq!(steps[1].label.as_deref(), Some("step-1"));

    let missing = store.get_step(&workflow_id, StepId::new(7)).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn instance_created_once_and_finished_once() {
    let store = get_test_store().await;
    let id = WorkflowId::new("start-order-workflow-alice@example.com-order-1");

    let created = store
        .create_instance(WorkflowInstance::start(
            id.clone(),
            "order_workflow",
            json!({"order_id": 1}),
        ))
        .await
        .unwrap();
    assert!(created.was_created());

    let again = store
        .create_instance(WorkflowInstance::start(
            id.clone(),
            "order_workflow",
            json!({"order_id": 2}),
        ))
        .await
        .unwrap();
    assert!(!again.was_created());
    assert_eq!(again.instance().input, json!({"order_id": 1}));

    let running = store.running_instances().await.unwrap();
    assert_eq!(running.len(), 1);

    let finished = store
        .finish_instance(&id, StepOutcome::Failure("Customer not found".into()))
        .await
        .unwrap();
    assert_eq!(finished.status, WorkflowStatus::Failed);

    let twice = store
        .finish_instance(&id, StepOutcome::Success(json!("late")))
        .await;
    assert!(matches!(twice, Err(StoreError::AlreadyCompleted { .. })));
    assert!(store.running_instances().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_settlement_has_single_winner() {
    let store = get_test_store().await;
    let id = PromiseId::new("race");
    store
        .create_promise(NewPromise::rendezvous(id.clone()))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..10 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store.settle_promise(&id, Settlement::Resolve(json!(n))).await
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::AlreadyCompleted { .. }) => losers += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, 9);
}
