//! The run coordinator.
//!
//! [`Engine`] is the public entry point: it owns the registry, the store,
//! and the event bus, and turns a triggering event into a scheduled run.
//! Triggering is fire-and-return; callers observe progress by subscribing
//! or by holding a [`ChildRunHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use saffron_store::RunStore;
use saffron_workflow::{
  ChildRunHandle, ChildSpawner, RegistryError, StepError, StepOutput, WorkflowDefinition,
  WorkflowRegistry,
};

use crate::error::EngineError;
use crate::events::{EventBus, ProgressEvent, ProgressEventKind};
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;

/// Engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
  /// Backoff applied between retryable step failures.
  pub retry: RetryPolicy,

  /// Cap on concurrently executing steps within one run. `None` dispatches
  /// the whole frontier at once.
  pub max_step_concurrency: Option<usize>,
}

/// Process-wide workflow engine: registry, store, bus, and scheduler in one
/// handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Engine {
  inner: Arc<EngineInner>,
}

struct EngineInner {
  registry: WorkflowRegistry,
  store: Arc<dyn RunStore>,
  bus: Arc<EventBus>,
  config: EngineConfig,
  shutdown: CancellationToken,
}

impl Engine {
  pub fn new(store: Arc<dyn RunStore>) -> Self {
    Self::with_config(store, EngineConfig::default())
  }

  pub fn with_config(store: Arc<dyn RunStore>, config: EngineConfig) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        registry: WorkflowRegistry::new(),
        store,
        bus: Arc::new(EventBus::new()),
        config,
        shutdown: CancellationToken::new(),
      }),
    }
  }

  /// Register a workflow definition and bind its trigger events.
  pub fn register(&self, definition: WorkflowDefinition) -> Result<(), RegistryError> {
    info!(workflow = %definition.name, events = ?definition.on_events, "registering workflow");
    self.inner.registry.register(definition)
  }

  /// Trigger the workflow bound to `event` and return the new run's id
  /// without waiting for the run to finish.
  pub async fn trigger(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<String, EngineError> {
    let (run_id, _) = self.launch(event, payload).await?;
    Ok(run_id)
  }

  /// Trigger a run and return a handle that resolves with its terminal
  /// outcome. This is the composition primitive behind child workflows.
  pub async fn spawn_run(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<ChildRunHandle, EngineError> {
    let (run_id, outcome) = self.launch(event, payload).await?;
    Ok(ChildRunHandle::new(run_id, outcome))
  }

  async fn launch(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<(String, oneshot::Receiver<saffron_workflow::RunOutcome>), EngineError> {
    if self.inner.shutdown.is_cancelled() {
      return Err(EngineError::ShutDown);
    }

    let definition = self
      .inner
      .registry
      .lookup_event(event)
      .ok_or_else(|| EngineError::UnknownEvent(event.to_string()))?;

    let step_names: Vec<String> = definition.steps.iter().map(|s| s.name.clone()).collect();
    let run = self.inner.store.create_run(&definition.name, &step_names).await?;
    let run_id = run.run_id;

    // Open the bus entry before the scheduler can publish, so subscribers
    // attaching right after trigger never miss the channel.
    self.inner.bus.open(&run_id);
    info!(run_id = %run_id, workflow = %definition.name, event, "run triggered");

    let (outcome_tx, outcome_rx) = oneshot::channel();
    let scheduler = Scheduler {
      store: self.inner.store.clone(),
      bus: self.inner.bus.clone(),
      retry: self.inner.config.retry.clone(),
      max_concurrency: self.inner.config.max_step_concurrency.map(|n| n.max(1)),
      spawner: Arc::new(self.clone()),
    };
    let cancel = self.inner.shutdown.child_token();
    let task_run_id = run_id.clone();

    tokio::spawn(async move {
      let outcome = scheduler
        .run(&definition, &task_run_id, payload, cancel)
        .await;
      // The handle may have been dropped; the outcome is already durable.
      let _ = outcome_tx.send(outcome);
    });

    Ok((run_id, outcome_rx))
  }

  /// Subscribe to a run's progress from this point onward.
  ///
  /// The stream is finite: it ends right after the terminal event. For a
  /// run that already finished, the terminal event is synthesized from the
  /// store, mirroring stream-then-result semantics for late subscribers.
  pub async fn subscribe(&self, run_id: &str) -> Result<ProgressStream, EngineError> {
    if let Some(rx) = self.inner.bus.subscribe(run_id) {
      return Ok(ProgressStream::live(rx));
    }

    let run = self.inner.store.get_run(run_id).await?;
    let kind = match run.status {
      saffron_store::RunStatus::Succeeded => ProgressEventKind::RunCompleted {
        result: run.result.map(|r| r.0).unwrap_or(serde_json::Value::Null),
      },
      saffron_store::RunStatus::Failed => ProgressEventKind::RunFailed {
        message: run
          .error
          .unwrap_or_else(|| "run failed".to_string()),
      },
      // A non-terminal run without a bus channel predates this process
      // (e.g. interrupted by a restart); report it as failed.
      _ => ProgressEventKind::RunFailed {
        message: "run was interrupted before completion".to_string(),
      },
    };
    Ok(ProgressStream::completed(ProgressEvent {
      run_id: run_id.to_string(),
      seq: 0,
      kind,
    }))
  }

  /// Fetch a run's stored state.
  pub async fn get_run(&self, run_id: &str) -> Result<saffron_store::WorkflowRun, EngineError> {
    Ok(self.inner.store.get_run(run_id).await?)
  }

  /// Fetch a run's step executions, ordered by step name.
  pub async fn list_steps(
    &self,
    run_id: &str,
  ) -> Result<Vec<saffron_store::StepExecution>, EngineError> {
    Ok(self.inner.store.list_steps(run_id).await?)
  }

  /// Stop accepting triggers and cancel running schedulers.
  pub fn shutdown(&self) {
    info!("engine shutting down");
    self.inner.shutdown.cancel();
  }
}

#[async_trait]
impl ChildSpawner for Engine {
  async fn spawn_workflow(
    &self,
    event: &str,
    payload: StepOutput,
  ) -> Result<ChildRunHandle, StepError> {
    self
      .spawn_run(event, payload)
      .await
      .map_err(|e| StepError::terminal(format!("failed to spawn workflow for '{event}': {e}")))
  }
}

/// A finite, ordered stream of [`ProgressEvent`]s for one run.
pub struct ProgressStream {
  inner: BoxStream<'static, ProgressEvent>,
}

impl std::fmt::Debug for ProgressStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProgressStream").finish_non_exhaustive()
  }
}

impl ProgressStream {
  fn live(rx: broadcast::Receiver<ProgressEvent>) -> Self {
    let inner = futures::stream::unfold((rx, false), |(mut rx, done)| async move {
      if done {
        return None;
      }
      loop {
        match rx.recv().await {
          Ok(event) => {
            let done = event.kind.is_terminal();
            return Some((event, (rx, done)));
          }
          Err(broadcast::error::RecvError::Closed) => return None,
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "subscriber lagged, skipping events");
            continue;
          }
        }
      }
    })
    .boxed();
    Self { inner }
  }

  fn completed(event: ProgressEvent) -> Self {
    Self {
      inner: futures::stream::once(async move { event }).boxed(),
    }
  }
}

impl futures::Stream for ProgressStream {
  type Item = ProgressEvent;

  fn poll_next(
    mut self: std::pin::Pin<&mut Self>,
    cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Option<Self::Item>> {
    self.inner.poll_next_unpin(cx)
  }
}
