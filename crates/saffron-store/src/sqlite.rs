use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{RunStatus, StepExecution, WorkflowRun};
use crate::{Error, RunStore};

/// SQLite-backed store.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a store over an existing connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn create_run(&self, workflow: &str, steps: &[String]) -> Result<WorkflowRun, Error> {
    let run = WorkflowRun {
      run_id: Uuid::new_v4().to_string(),
      workflow: workflow.to_string(),
      status: RunStatus::Pending,
      result: None,
      error: None,
      created_at: Utc::now(),
      completed_at: None,
    };

    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
            INSERT INTO workflow_runs (run_id, workflow, status, result, error, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&run.run_id)
    .bind(&run.workflow)
    .bind(run.status)
    .bind(&run.result)
    .bind(&run.error)
    .bind(run.created_at)
    .bind(run.completed_at)
    .execute(&mut *tx)
    .await?;

    for step in steps {
      sqlx::query(
        r#"
                INSERT INTO step_executions (run_id, step, status, attempts, output, error, started_at, completed_at)
                VALUES (?, ?, 'pending', 0, NULL, NULL, NULL, NULL)
                "#,
      )
      .bind(&run.run_id)
      .bind(step)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(run)
  }

  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, workflow, status, result, error, created_at, completed_at
            FROM workflow_runs
            WHERE run_id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
  }

  async fn start_run(&self, run_id: &str) -> Result<(), Error> {
    let updated = sqlx::query(
      r#"
            UPDATE workflow_runs
            SET status = 'running'
            WHERE run_id = ? AND status = 'pending'
            "#,
    )
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if updated.rows_affected() == 0 {
      // Either the run is unknown or it already left Pending; only the
      // former is an error.
      self.get_run(run_id).await?;
    }
    Ok(())
  }

  async fn get_step(&self, run_id: &str, step: &str) -> Result<StepExecution, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, step, status, attempts, output, error, started_at, completed_at
            FROM step_executions
            WHERE run_id = ? AND step = ?
            "#,
    )
    .bind(run_id)
    .bind(step)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("step {step} of run {run_id}")))
  }

  async fn update_step(&self, step: &StepExecution) -> Result<(), Error> {
    let updated = sqlx::query(
      r#"
            UPDATE step_executions
            SET status = ?, attempts = ?, output = ?, error = ?, started_at = ?, completed_at = ?
            WHERE run_id = ? AND step = ?
            "#,
    )
    .bind(step.status)
    .bind(step.attempts)
    .bind(&step.output)
    .bind(&step.error)
    .bind(step.started_at)
    .bind(step.completed_at)
    .bind(&step.run_id)
    .bind(&step.step)
    .execute(&self.pool)
    .await?;

    if updated.rows_affected() == 0 {
      return Err(Error::NotFound(format!(
        "step {} of run {}",
        step.step, step.run_id
      )));
    }
    Ok(())
  }

  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepExecution>, Error> {
    let steps: Vec<StepExecution> = sqlx::query_as(
      r#"
            SELECT run_id, step, status, attempts, output, error, started_at, completed_at
            FROM step_executions
            WHERE run_id = ?
            ORDER BY step ASC
            "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;

    if steps.is_empty() {
      // Distinguish an empty (zero-step) run from an unknown run id.
      self.get_run(run_id).await?;
    }
    Ok(steps)
  }

  async fn finalize_run(
    &self,
    run_id: &str,
    status: RunStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
  ) -> Result<(), Error> {
    let updated = sqlx::query(
      r#"
            UPDATE workflow_runs
            SET status = ?, result = ?, error = ?, completed_at = ?
            WHERE run_id = ? AND status IN ('pending', 'running')
            "#,
    )
    .bind(status)
    .bind(result.map(sqlx::types::Json))
    .bind(&error)
    .bind(Utc::now())
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if updated.rows_affected() == 0 {
      // No-op when the run is already terminal; error when it is unknown.
      self.get_run(run_id).await?;
    }
    Ok(())
  }
}
