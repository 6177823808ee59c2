//! Frontier-driven execution of a single workflow run.
//!
//! The scheduler dispatches every step whose parents have all succeeded,
//! each on its own tokio task, and recomputes the frontier as soon as any
//! step settles. The first terminal step failure fails the run: outstanding
//! steps are cancelled and descendants of the failed step are never
//! dispatched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use sqlx::types::Json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use saffron_store::{RunStatus, RunStore, StepExecution, StepStatus};
use saffron_workflow::{
  ChildSpawner, RunOutcome, StepContext, StepGraph, StepOutput, WorkflowDefinition,
};

use crate::events::{EventBus, ProgressEventKind};
use crate::retry::{RetryPolicy, StepRun, run_step};

/// Drives one run of one workflow to a terminal state.
pub(crate) struct Scheduler {
  pub(crate) store: Arc<dyn RunStore>,
  pub(crate) bus: Arc<EventBus>,
  pub(crate) retry: RetryPolicy,
  pub(crate) max_concurrency: Option<usize>,
  pub(crate) spawner: Arc<dyn ChildSpawner>,
}

struct SettledStep {
  step: String,
  started_at: DateTime<Utc>,
  run: StepRun,
}

impl Scheduler {
  /// Execute the run and return its terminal outcome.
  ///
  /// The outcome is also persisted to the store and published on the bus;
  /// the returned value resolves child-run handles.
  pub(crate) async fn run(
    &self,
    definition: &WorkflowDefinition,
    run_id: &str,
    payload: StepOutput,
    cancel: CancellationToken,
  ) -> RunOutcome {
    match self.execute(definition, run_id, payload, &cancel).await {
      Ok(result) => {
        if let Err(e) = self
          .store
          .finalize_run(run_id, RunStatus::Succeeded, Some(result.clone()), None)
          .await
        {
          error!(run_id, error = %e, "failed to finalize run");
        }
        info!(run_id, workflow = %definition.name, "run completed");
        self.bus.publish(
          run_id,
          ProgressEventKind::RunCompleted {
            result: result.clone(),
          },
        );
        Ok(result)
      }
      Err(message) => {
        // Stop anything still in flight before sealing the failure.
        cancel.cancel();
        if let Err(e) = self
          .store
          .finalize_run(run_id, RunStatus::Failed, None, Some(message.clone()))
          .await
        {
          error!(run_id, error = %e, "failed to finalize run");
        }
        info!(run_id, workflow = %definition.name, error = %message, "run failed");
        self.bus.publish(
          run_id,
          ProgressEventKind::RunFailed {
            message: message.clone(),
          },
        );
        Err(message)
      }
    }
  }

  async fn execute(
    &self,
    definition: &WorkflowDefinition,
    run_id: &str,
    payload: StepOutput,
    cancel: &CancellationToken,
  ) -> Result<StepOutput, String> {
    // Registration already validated the graph; a failure here means the
    // definition changed underneath us.
    let graph = definition
      .graph()
      .map_err(|e| format!("workflow '{}' has an invalid step graph: {e}", definition.name))?;

    self
      .store
      .start_run(run_id)
      .await
      .map_err(|e| format!("failed to start run: {e}"))?;

    let mut succeeded: HashSet<String> = HashSet::new();
    let mut outputs: HashMap<String, StepOutput> = HashMap::new();
    let mut dispatched: HashSet<String> = HashSet::new();
    let mut in_flight: FuturesUnordered<JoinHandle<SettledStep>> = FuturesUnordered::new();

    loop {
      for step in &definition.steps {
        if dispatched.contains(&step.name) {
          continue;
        }
        if let Some(limit) = self.max_concurrency {
          if in_flight.len() >= limit {
            break;
          }
        }
        if !graph.parents_satisfied(&step.name, &succeeded) {
          continue;
        }

        dispatched.insert(step.name.clone());
        self
          .dispatch(definition, &graph, step.name.as_str(), run_id, &payload, &outputs, cancel)
          .await
          .map(|handle| in_flight.push(handle))?;
      }

      let Some(settled) = in_flight.next().await else {
        break;
      };
      let settled = settled.map_err(|e| format!("step task panicked: {e}"))?;

      match settled.run {
        StepRun::Cancelled => continue,
        StepRun::Completed { attempts, result } => {
          let mut record = StepExecution {
            run_id: run_id.to_string(),
            step: settled.step.clone(),
            status: StepStatus::Running,
            attempts,
            output: None,
            error: None,
            started_at: Some(settled.started_at),
            completed_at: Some(Utc::now()),
          };

          match result {
            Ok(output) => {
              record.status = StepStatus::Succeeded;
              record.output = Some(Json(output.clone()));
              self.write_step(&record).await?;
              self.bus.publish(
                run_id,
                ProgressEventKind::StepCompleted {
                  step: settled.step.clone(),
                  output: output.clone(),
                },
              );
              outputs.insert(settled.step.clone(), output);
              succeeded.insert(settled.step);
            }
            Err(failure) => {
              let message = failure.message().to_string();
              record.status = StepStatus::Failed;
              record.error = Some(message.clone());
              self.write_step(&record).await?;
              self.bus.publish(
                run_id,
                ProgressEventKind::StepFailed {
                  step: settled.step.clone(),
                  message: message.clone(),
                },
              );
              return Err(format!("step '{}' failed: {message}", settled.step));
            }
          }
        }
      }
    }

    if succeeded.len() < definition.steps.len() {
      if cancel.is_cancelled() {
        return Err("run cancelled before completion".to_string());
      }
      return Err("no runnable steps remain".to_string());
    }

    Ok(aggregate_result(&graph, &outputs))
  }

  /// Mark a step running, publish its start, and spawn its retry loop.
  async fn dispatch(
    &self,
    definition: &WorkflowDefinition,
    graph: &StepGraph,
    step_name: &str,
    run_id: &str,
    payload: &StepOutput,
    outputs: &HashMap<String, StepOutput>,
    cancel: &CancellationToken,
  ) -> Result<JoinHandle<SettledStep>, String> {
    let step = definition
      .get_step(step_name)
      .ok_or_else(|| format!("step '{step_name}' not found in workflow '{}'", definition.name))?;

    let started_at = Utc::now();
    self
      .write_step(&StepExecution {
        run_id: run_id.to_string(),
        step: step.name.clone(),
        status: StepStatus::Running,
        attempts: 0,
        output: None,
        error: None,
        started_at: Some(started_at),
        completed_at: None,
      })
      .await?;
    self.bus.publish(
      run_id,
      ProgressEventKind::StepStarted {
        step: step.name.clone(),
      },
    );
    info!(run_id, workflow = %definition.name, step = %step.name, "step started");

    let parent_outputs: HashMap<String, StepOutput> = graph
      .parents(&step.name)
      .iter()
      .filter_map(|parent| outputs.get(parent).map(|o| (parent.clone(), o.clone())))
      .collect();

    let ctx = StepContext::new(
      run_id,
      definition.name.clone(),
      step.name.clone(),
      payload.clone(),
      parent_outputs,
      self.spawner.clone(),
    );

    let body = step.body();
    let max_retries = step.max_retries;
    let retry = self.retry.clone();
    let cancel = cancel.clone();
    let name = step.name.clone();

    Ok(tokio::spawn(async move {
      let run = run_step(body, ctx, max_retries, &retry, &cancel).await;
      SettledStep {
        step: name,
        started_at,
        run,
      }
    }))
  }

  async fn write_step(&self, record: &StepExecution) -> Result<(), String> {
    self
      .store
      .update_step(record)
      .await
      .map_err(|e| format!("failed to persist step '{}': {e}", record.step))
  }
}

/// Aggregate the run result from terminal-step outputs: a single terminal
/// step contributes its output directly, several are keyed by step name, and
/// a zero-step workflow yields an empty object.
fn aggregate_result(graph: &StepGraph, outputs: &HashMap<String, StepOutput>) -> StepOutput {
  let terminals = graph.terminals();
  match terminals.as_slice() {
    [] => serde_json::json!({}),
    [only] => outputs.get(*only).cloned().unwrap_or(serde_json::Value::Null),
    many => serde_json::Value::Object(
      many
        .iter()
        .filter_map(|step| {
          outputs
            .get(*step)
            .map(|output| (step.to_string(), output.clone()))
        })
        .collect(),
    ),
  }
}
