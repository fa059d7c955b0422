use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    DurablePromise, DurableStore, IdempotencyKey, InstanceCreation, NewPromise, PromiseCreation,
    PromiseId, RemoteTask, Result, Settlement, StepId, StepOutcome, StepRecord, StoreError,
    WorkflowId, WorkflowInstance, WorkflowStatus,
};

const PROMISE_COLUMNS: &str =
    "id, state, value, error, idempotency_key, task, created_at, resolved_at";
const STEP_COLUMNS: &str = "workflow_id, step_id, kind, label, outcome, completed_at";
const INSTANCE_COLUMNS: &str =
    "id, definition_name, input, status, outcome, created_at, completed_at";

/// PostgreSQL-backed durable store implementation.
///
/// Compare-and-set writes are single statements guarded by the table's
/// primary key or by a `WHERE state = 'pending'` predicate, so concurrent
/// writers across processes still see exactly one winner.
#[derive(Clone)]
pub struct PostgresDurableStore {
    pool: PgPool,
}

impl PostgresDurableStore {
    /// Creates a new PostgreSQL durable store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_promise(row: PgRow) -> Result<DurablePromise> {
        let state: String = row.try_get("state")?;
        let task: Option<serde_json::Value> = row.try_get("task")?;

        Ok(DurablePromise {
            id: PromiseId::new(row.try_get::<String, _>("id")?),
            state: state.parse()?,
            value: row.try_get("value")?,
            error: row.try_get("error")?,
            idempotency_key: row
                .try_get::<Option<String>, _>("idempotency_key")?
                .map(IdempotencyKey::new),
            task: task.map(serde_json::from_value::<RemoteTask>).transpose()?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }

    fn row_to_step(row: PgRow) -> Result<StepRecord> {
        let step_id: i64 = row.try_get("step_id")?;
        let step_id = u32::try_from(step_id)
            .map_err(|_| StoreError::Corrupt(format!("step id {step_id} out of range")))?;
        let kind: String = row.try_get("kind")?;
        let outcome: serde_json::Value = row.try_get("outcome")?;

        Ok(StepRecord {
            workflow_id: WorkflowId::new(row.try_get::<String, _>("workflow_id")?),
            step_id: StepId::new(step_id),
            kind: kind.parse()?,
            label: row.try_get("label")?,
            outcome: serde_json::from_value(outcome)?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn row_to_instance(row: PgRow) -> Result<WorkflowInstance> {
        let status: String = row.try_get("status")?;
        let outcome: Option<serde_json::Value> = row.try_get("outcome")?;

        Ok(WorkflowInstance {
            id: WorkflowId::new(row.try_get::<String, _>("id")?),
            definition_name: row.try_get("definition_name")?,
            input: row.try_get("input")?,
            status: status.parse()?,
            outcome: outcome.map(serde_json::from_value).transpose()?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn fetch_promise(&self, id: &PromiseId) -> Result<Option<DurablePromise>> {
        let row = sqlx::query(&format!(
            "SELECT {PROMISE_COLUMNS} FROM durable_promises WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_promise).transpose()
    }

    async fn fetch_instance(&self, id: &WorkflowId) -> Result<Option<WorkflowInstance>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_instance).transpose()
    }
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    #[tracing::instrument(skip(self, promise), fields(promise_id = %promise.id))]
    async fn create_promise(&self, promise: NewPromise) -> Result<PromiseCreation> {
        let task = promise.task.as_ref().map(serde_json::to_value).transpose()?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO durable_promises (id, state, idempotency_key, task)
            VALUES ($1, 'pending', $2, $3)
            ON CONFLICT (id) DO NOTHING
            RETURNING {PROMISE_COLUMNS}
            "#
        ))
        .bind(promise.id.as_str())
        .bind(promise.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(task)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(PromiseCreation::Created(Self::row_to_promise(row)?));
        }

        // Lost the insert race; the winner's row is authoritative.
        let existing = self
            .fetch_promise(&promise.id)
            .await?
            .ok_or_else(|| StoreError::not_found("Promise", &promise.id))?;
        Ok(PromiseCreation::Existing(existing))
    }

    async fn get_promise(&self, id: &PromiseId) -> Result<Option<DurablePromise>> {
        self.fetch_promise(id).await
    }

    #[tracing::instrument(skip(self, settlement), fields(state = %settlement.state()))]
    async fn settle_promise(
        &self,
        id: &PromiseId,
        settlement: Settlement,
    ) -> Result<DurablePromise> {
        let state = settlement.state();
        let (value, error) = match settlement {
            Settlement::Resolve(value) => (Some(value), None),
            Settlement::Reject(error) => (None, Some(error)),
        };

        let updated = sqlx::query(&format!(
            r#"
            UPDATE durable_promises
            SET state = $2, value = $3, error = $4, resolved_at = NOW()
            WHERE id = $1 AND state = 'pending'
            RETURNING {PROMISE_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(state.as_str())
        .bind(value)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Self::row_to_promise(row),
            None => match self.fetch_promise(id).await? {
                Some(_) => Err(StoreError::already_completed("Promise", id)),
                None => Err(StoreError::not_found("Promise", id)),
            },
        }
    }

    async fn pending_tasks(&self) -> Result<Vec<RemoteTask>> {
        let rows = sqlx::query(
            r#"
            SELECT task FROM durable_promises
            WHERE state = 'pending' AND task IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<RemoteTask> {
                let task: serde_json::Value = row.try_get("task")?;
                Ok(serde_json::from_value(task)?)
            })
            .collect()
    }

    #[tracing::instrument(skip(self, record), fields(step = %record.key()))]
    async fn record_step(&self, record: StepRecord) -> Result<StepRecord> {
        let outcome = serde_json::to_value(&record.outcome)?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO step_records (workflow_id, step_id, kind, label, outcome, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (workflow_id, step_id) DO NOTHING
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(record.workflow_id.as_str())
        .bind(i64::from(record.step_id.as_u32()))
        .bind(record.kind.as_str())
        .bind(record.label.as_deref())
        .bind(outcome)
        .bind(record.completed_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Self::row_to_step(row),
            None => Err(StoreError::already_completed("Step", record.key())),
        }
    }

    async fn get_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: StepId,
    ) -> Result<Option<StepRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM step_records WHERE workflow_id = $1 AND step_id = $2"
        ))
        .bind(workflow_id.as_str())
        .bind(i64::from(step_id.as_u32()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_step).transpose()
    }

    async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM step_records WHERE workflow_id = $1 ORDER BY step_id ASC"
        ))
        .bind(workflow_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step).collect()
    }

    #[tracing::instrument(skip(self, instance), fields(workflow_id = %instance.id))]
    async fn create_instance(&self, instance: WorkflowInstance) -> Result<InstanceCreation> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO workflow_instances (id, definition_name, input, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(instance.id.as_str())
        .bind(&instance.definition_name)
        .bind(&instance.input)
        .bind(instance.status.as_str())
        .bind(instance.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InstanceCreation::Created(Self::row_to_instance(row)?));
        }

        let existing = self
            .fetch_instance(&instance.id)
            .await?
            .ok_or_else(|| StoreError::not_found("Workflow", &instance.id))?;
        Ok(InstanceCreation::Existing(existing))
    }

    async fn get_instance(&self, id: &WorkflowId) -> Result<Option<WorkflowInstance>> {
        self.fetch_instance(id).await
    }

    #[tracing::instrument(skip(self, outcome))]
    async fn finish_instance(
        &self,
        id: &WorkflowId,
        outcome: StepOutcome,
    ) -> Result<WorkflowInstance> {
        let status = WorkflowStatus::for_outcome(&outcome);
        let outcome = serde_json::to_value(&outcome)?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE workflow_instances
            SET status = $2, outcome = $3, completed_at = NOW()
            WHERE id = $1 AND status = 'RUNNING'
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(outcome)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Self::row_to_instance(row),
            None => match self.fetch_instance(id).await? {
                Some(_) => Err(StoreError::already_completed("Workflow", id)),
                None => Err(StoreError::not_found("Workflow", id)),
            },
        }
    }

    async fn running_instances(&self) -> Result<Vec<WorkflowInstance>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE status = 'RUNNING' ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_instance).collect()
    }
}
