use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed)
  }
}

/// Status of a single step execution within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
}

/// One execution instance of a registered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRun {
  pub run_id: String,
  pub workflow: String,
  pub status: RunStatus,
  /// Aggregated terminal-step result, set when the run succeeds.
  pub result: Option<Json<serde_json::Value>>,
  /// Failure message, set when the run fails.
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

/// Execution record for one step of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StepExecution {
  pub run_id: String,
  pub step: String,
  pub status: StepStatus,
  /// Number of invocations made so far.
  pub attempts: u32,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
  /// A fresh, never-dispatched step record.
  pub fn pending(run_id: impl Into<String>, step: impl Into<String>) -> Self {
    Self {
      run_id: run_id.into(),
      step: step.into(),
      status: StepStatus::Pending,
      attempts: 0,
      output: None,
      error: None,
      started_at: None,
      completed_at: None,
    }
  }
}
