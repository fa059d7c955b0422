//! Workflow instance inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::WorkflowId;
use durable_store::{StepRecord, WorkflowInstance};
use saga::Plan;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub instance: WorkflowInstance,
    pub journal: Vec<StepRecord>,
}

/// GET /workflows/{id}: the instance with every recorded step.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let id = WorkflowId::new(id);
    let instance = state.orchestrator.get_instance(&id).await?;
    let journal = state.orchestrator.journal(&id).await?;
    Ok(Json(WorkflowResponse { instance, journal }))
}

/// GET /workflows/{id}/plan: replays the journal without side effects and
/// reports the step the instance would take next.
#[tracing::instrument(skip(state))]
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Plan>, ApiError> {
    let plan = state.orchestrator.plan(&WorkflowId::new(id)).await?;
    Ok(Json(plan))
}
