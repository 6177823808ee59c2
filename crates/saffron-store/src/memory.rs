use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::types::{RunStatus, StepExecution, WorkflowRun};
use crate::{Error, RunStore};

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
  runs: RwLock<HashMap<String, RunEntry>>,
}

struct RunEntry {
  run: WorkflowRun,
  steps: HashMap<String, StepExecution>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_runs<T>(&self, f: impl FnOnce(&HashMap<String, RunEntry>) -> T) -> T {
    f(&self.runs.read().unwrap_or_else(|e| e.into_inner()))
  }

  fn with_runs_mut<T>(&self, f: impl FnOnce(&mut HashMap<String, RunEntry>) -> T) -> T {
    f(&mut self.runs.write().unwrap_or_else(|e| e.into_inner()))
  }
}

#[async_trait]
impl RunStore for MemoryStore {
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

    let step_map = steps
      .iter()
      .map(|step| {
        (
          step.clone(),
          StepExecution::pending(run.run_id.clone(), step.clone()),
        )
      })
      .collect();

    self.with_runs_mut(|runs| {
      runs.insert(
        run.run_id.clone(),
        RunEntry {
          run: run.clone(),
          steps: step_map,
        },
      );
    });
    Ok(run)
  }

  async fn get_run(&self, run_id: &str) -> Result<WorkflowRun, Error> {
    self.with_runs(|runs| {
      runs
        .get(run_id)
        .map(|entry| entry.run.clone())
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
    })
  }

  async fn start_run(&self, run_id: &str) -> Result<(), Error> {
    self.with_runs_mut(|runs| {
      let entry = runs
        .get_mut(run_id)
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
      if entry.run.status == RunStatus::Pending {
        entry.run.status = RunStatus::Running;
      }
      Ok(())
    })
  }

  async fn get_step(&self, run_id: &str, step: &str) -> Result<StepExecution, Error> {
    self.with_runs(|runs| {
      runs
        .get(run_id)
        .and_then(|entry| entry.steps.get(step))
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("step {step} of run {run_id}")))
    })
  }

  async fn update_step(&self, step: &StepExecution) -> Result<(), Error> {
    self.with_runs_mut(|runs| {
      let entry = runs
        .get_mut(&step.run_id)
        .ok_or_else(|| Error::NotFound(format!("run {}", step.run_id)))?;
      if !entry.steps.contains_key(&step.step) {
        return Err(Error::NotFound(format!(
          "step {} of run {}",
          step.step, step.run_id
        )));
      }
      entry.steps.insert(step.step.clone(), step.clone());
      Ok(())
    })
  }

  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepExecution>, Error> {
    self.with_runs(|runs| {
      let entry = runs
        .get(run_id)
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
      let mut steps: Vec<StepExecution> = entry.steps.values().cloned().collect();
      steps.sort_by(|a, b| a.step.cmp(&b.step));
      Ok(steps)
    })
  }

  async fn finalize_run(
    &self,
    run_id: &str,
    status: RunStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
  ) -> Result<(), Error> {
    self.with_runs_mut(|runs| {
      let entry = runs
        .get_mut(run_id)
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
      if entry.run.status.is_terminal() {
        return Ok(());
      }
      entry.run.status = status;
      entry.run.result = result.map(sqlx::types::Json);
      entry.run.error = error;
      entry.run.completed_at = Some(Utc::now());
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::StepStatus;
  use serde_json::json;

  fn step_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[tokio::test]
  async fn create_allocates_pending_run_and_steps() {
    let store = MemoryStore::new();
    let run = store
      .create_run("techcrunch-ai", &step_names(&["fetch_homepage", "parse_articles"]))
      .await
      .unwrap();

    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.result.is_none());

    let steps = store.list_steps(&run.run_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
    assert_eq!(steps[0].step, "fetch_homepage");
    assert_eq!(steps[1].step, "parse_articles");
  }

  #[tokio::test]
  async fn missing_lookups_are_not_found() {
    let store = MemoryStore::new();
    assert!(matches!(
      store.get_run("nope").await,
      Err(Error::NotFound(_))
    ));
    assert!(matches!(
      store.get_step("nope", "step").await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn update_step_overwrites() {
    let store = MemoryStore::new();
    let run = store
      .create_run("w", &step_names(&["fetch"]))
      .await
      .unwrap();

    let mut step = store.get_step(&run.run_id, "fetch").await.unwrap();
    step.status = StepStatus::Succeeded;
    step.attempts = 3;
    step.output = Some(sqlx::types::Json(json!({"status": "success"})));
    store.update_step(&step).await.unwrap();

    let fetched = store.get_step(&run.run_id, "fetch").await.unwrap();
    assert_eq!(fetched.status, StepStatus::Succeeded);
    assert_eq!(fetched.attempts, 3);
  }

  #[tokio::test]
  async fn update_unknown_step_is_not_found() {
    let store = MemoryStore::new();
    let run = store.create_run("w", &step_names(&["fetch"])).await.unwrap();

    let stray = StepExecution::pending(run.run_id.clone(), "intruder");
    assert!(matches!(
      store.update_step(&stray).await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn finalize_is_idempotent() {
    let store = MemoryStore::new();
    let run = store.create_run("w", &step_names(&["only"])).await.unwrap();
    store.start_run(&run.run_id).await.unwrap();

    store
      .finalize_run(
        &run.run_id,
        RunStatus::Succeeded,
        Some(json!({"articles": []})),
        None,
      )
      .await
      .unwrap();
    let first = store.get_run(&run.run_id).await.unwrap();
    assert_eq!(first.status, RunStatus::Succeeded);

    // A later, conflicting finalize must not change anything.
    store
      .finalize_run(&run.run_id, RunStatus::Failed, None, Some("late".into()))
      .await
      .unwrap();
    let second = store.get_run(&run.run_id).await.unwrap();
    assert_eq!(second.status, RunStatus::Succeeded);
    assert_eq!(second.result, first.result);
    assert!(second.error.is_none());
    assert_eq!(second.completed_at, first.completed_at);
  }

  #[tokio::test]
  async fn start_run_only_promotes_pending() {
    let store = MemoryStore::new();
    let run = store.create_run("w", &[]).await.unwrap();

    store.start_run(&run.run_id).await.unwrap();
    assert_eq!(
      store.get_run(&run.run_id).await.unwrap().status,
      RunStatus::Running
    );

    store
      .finalize_run(&run.run_id, RunStatus::Succeeded, Some(json!({})), None)
      .await
      .unwrap();
    store.start_run(&run.run_id).await.unwrap();
    assert_eq!(
      store.get_run(&run.run_id).await.unwrap().status,
      RunStatus::Succeeded
    );
  }
}
