//! Durable saga orchestration for order fulfillment.
//!
//! Workflow definitions are async functions over a [`WorkflowContext`].
//! Every context operation is a journaled step, so an instance can be
//! re-driven from the top at any time (after a wake-up or a crash) without
//! repeating side effects that already completed:
//!
//! 1. Local steps run once; replays return the recorded value.
//! 2. Remote calls are persisted as promises and delivered at least once;
//!    worker nodes deduplicate on the idempotency key.
//! 3. Promise waits suspend the instance until someone resolves the promise.
//!
//! The order fulfillment saga in [`workflows`] walks an order through six
//! externally resolved gates, from payment to delivery.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod promise;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod transport;
pub mod worker;
pub mod workflows;

pub use context::{Action, Flow, Interrupt, Plan, Suspension, WorkflowContext};
pub use dispatch::{Dispatcher, RemoteCall};
pub use error::{Result, SagaError, StepError, TransportError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RecoveryReport, WorkflowHandle};
pub use promise::{PromiseGate, PromiseHandle};
pub use registry::{Workflow, WorkflowRegistry, WorkflowRegistryBuilder};
pub use scheduler::Scheduler;
pub use services::{CustomersService, OrdersService, ProductsService, Services};
pub use transport::{LocalTransport, RetryPolicy, Transport};
pub use worker::{RemoteFunction, ServiceNode, ServiceNodeBuilder};
