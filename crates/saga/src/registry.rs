//! Workflow definitions and the registry they are submitted through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{Flow, WorkflowContext};
use crate::error::Result;

/// A workflow definition.
///
/// `run` is re-executed from the top every time the instance is driven, so
/// it must reach the same steps in the same order given the same input and
/// journal. Side effects belong in context steps.
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Name the definition is registered and submitted under.
    fn name(&self) -> &str;

    /// Checks the input before an instance is created.
    fn validate(&self, _input: &Value) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut WorkflowContext, input: Value) -> Flow<Value>;
}

/// Immutable name-to-definition table.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    inner: Arc<HashMap<String, Arc<dyn Workflow>>>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.inner.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct WorkflowRegistryBuilder {
    map: HashMap<String, Arc<dyn Workflow>>,
}

impl WorkflowRegistryBuilder {
    /// Registers a definition under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(mut self, workflow: impl Workflow + 'static) -> Self {
        let name = workflow.name().to_string();
        if self.map.insert(name.clone(), Arc::new(workflow)).is_some() {
            tracing::warn!(workflow = %name, "workflow definition replaced");
        }
        self
    }

    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            inner: Arc::new(self.map),
        }
    }
}
