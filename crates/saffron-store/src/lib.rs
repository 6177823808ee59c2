//! Saffron Store
//!
//! Durable record of every workflow run: run status, per-step execution
//! state, attempt counts, and final results. The [`RunStore`] trait keeps
//! the engine storage-agnostic; [`MemoryStore`] backs tests and ephemeral
//! deployments, [`SqliteStore`] persists through `sqlx`.
//!
//! Runs are owned by the scheduler driving them: only that scheduler writes
//! a given run's rows, and writes to different steps of the same run must
//! not interfere with one another.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{RunStatus, StepExecution, StepStatus, WorkflowRun};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested run or step was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage operations for workflow runs and their step executions.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Allocate a fresh run in `Pending` status with one pending step
  /// execution per step name.
  async fn create_run(&self, workflow: &str, steps: &[String]) -> Result<WorkflowRun, Error>;

  /// Get a run by id.
  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error>;

  /// Transition a run from `Pending` to `Running`.
  async fn start_run(&self, run_id: &str) -> Result<(), Error>;

  /// Get one step execution.
  async fn get_step(&self, run_id: &str, step: &str) -> Result<StepExecution, Error>;

  /// Overwrite a step execution record.
  async fn update_step(&self, step: &StepExecution) -> Result<(), Error>;

  /// List a run's step executions, ordered by step name.
  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepExecution>, Error>;

  /// Set the run's terminal status, result, and error exactly once.
  ///
  /// Calls after the run is already terminal are no-ops, so redundant
  /// completion paths stay idempotent.
  async fn finalize_run(
    &self,
    run_id: &str,
    status: RunStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
  ) -> Result<(), Error>;
}
