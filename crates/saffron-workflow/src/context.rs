use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::definition::StepOutput;
use crate::error::StepError;

/// The terminal outcome of a run: the aggregated result, or the failure
/// message of the step that ended it.
pub type RunOutcome = Result<StepOutput, String>;

/// Seam through which step bodies start child workflow runs.
///
/// Implemented by the engine; step bodies only see it through
/// [`StepContext::spawn_workflow`].
#[async_trait]
pub trait ChildSpawner: Send + Sync {
  /// Trigger the workflow bound to `event` and return a handle to await it.
  async fn spawn_workflow(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<ChildRunHandle, StepError>;
}

/// Handle to a spawned child run.
///
/// The run executes regardless of whether the handle is awaited; `result`
/// suspends the calling step until the child reaches a terminal state.
#[derive(Debug)]
pub struct ChildRunHandle {
  run_id: String,
  outcome: oneshot::Receiver<RunOutcome>,
}

impl ChildRunHandle {
  pub fn new(run_id: impl Into<String>, outcome: oneshot::Receiver<RunOutcome>) -> Self {
    Self {
      run_id: run_id.into(),
      outcome,
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Wait for the child run to finish and return its aggregated result.
  ///
  /// A failed child surfaces as a terminal failure of the awaiting step.
  pub async fn result(self) -> Result<StepOutput, StepError> {
    match self.outcome.await {
      Ok(Ok(result)) => Ok(result),
      Ok(Err(message)) => Err(StepError::terminal(format!(
        "child run {} failed: {}",
        self.run_id, message
      ))),
      Err(_) => Err(StepError::terminal(format!(
        "child run {} abandoned before completion",
        self.run_id
      ))),
    }
  }
}

/// Everything a step body sees: run identity, the trigger payload, parent
/// outputs, and the ability to spawn child runs.
#[derive(Clone)]
pub struct StepContext {
  run_id: String,
  workflow: String,
  step: String,
  payload: StepOutput,
  parent_outputs: HashMap<String, StepOutput>,
  spawner: Arc<dyn ChildSpawner>,
}

impl StepContext {
  pub fn new(
    run_id: impl Into<String>,
    workflow: impl Into<String>,
    step: impl Into<String>,
    payload: StepOutput,
    parent_outputs: HashMap<String, StepOutput>,
    spawner: Arc<dyn ChildSpawner>,
  ) -> Self {
    Self {
      run_id: run_id.into(),
      workflow: workflow.into(),
      step: step.into(),
      payload,
      parent_outputs,
      spawner,
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn workflow(&self) -> &str {
    &self.workflow
  }

  pub fn step(&self) -> &str {
    &self.step
  }

  /// The payload the run was triggered with.
  pub fn payload(&self) -> &StepOutput {
    &self.payload
  }

  /// The output of a parent step, if that step is a declared parent.
  pub fn parent_output(&self, step: &str) -> Option<&StepOutput> {
    self.parent_outputs.get(step)
  }

  /// Start the workflow bound to `event` as a child run.
  pub async fn spawn_workflow(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<ChildRunHandle, StepError> {
    self.spawner.spawn_workflow(event, payload).await
  }
}

impl std::fmt::Debug for StepContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepContext")
      .field("run_id", &self.run_id)
      .field("workflow", &self.workflow)
      .field("step", &self.step)
      .finish_non_exhaustive()
  }
}
