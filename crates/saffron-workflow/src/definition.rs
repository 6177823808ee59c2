use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::StepContext;
use crate::error::{GraphError, StepError};
use crate::graph::StepGraph;

/// The JSON value a step produces on success.
pub type StepOutput = serde_json::Value;

/// The future returned by a step body.
pub type StepFuture = BoxFuture<'static, Result<StepOutput, StepError>>;

/// A boxed step body: `StepContext -> Result<StepOutput, StepError>`.
pub type StepFn = Arc<dyn Fn(StepContext) -> StepFuture + Send + Sync>;

/// A named unit of work within a workflow.
///
/// Steps declare the parents whose success gates their execution and a retry
/// ceiling applied to [`StepError::Retryable`] failures. Built fluently:
///
/// ```ignore
/// StepDefinition::new("fetch_homepage", fetch_homepage).max_retries(3)
/// StepDefinition::new("parse_articles", parse_articles).parents(["fetch_homepage"])
/// ```
#[derive(Clone)]
pub struct StepDefinition {
  pub name: String,
  pub parents: Vec<String>,
  pub max_retries: u32,
  body: StepFn,
}

impl StepDefinition {
  /// Create a step with no parents and no retries.
  pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      parents: Vec::new(),
      max_retries: 0,
      body: Arc::new(move |ctx| body(ctx).boxed()),
    }
  }

  /// Declare the parent steps that must succeed before this step runs.
  pub fn parents<I, S>(mut self, parents: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.parents = parents.into_iter().map(Into::into).collect();
    self
  }

  /// Set the maximum number of retries after a retryable failure.
  ///
  /// A ceiling of N allows N + 1 invocations in total.
  pub fn max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  /// The step body, shared with the scheduler.
  pub fn body(&self) -> StepFn {
    self.body.clone()
  }
}

impl fmt::Debug for StepDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StepDefinition")
      .field("name", &self.name)
      .field("parents", &self.parents)
      .field("max_retries", &self.max_retries)
      .finish_non_exhaustive()
  }
}

/// An immutable workflow template: a name, the events that trigger it, and a
/// DAG of steps.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDefinition {
  pub name: String,
  pub on_events: Vec<String>,
  pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      on_events: Vec::new(),
      steps: Vec::new(),
    }
  }

  /// Bind an event name that triggers this workflow.
  pub fn on_event(mut self, event: impl Into<String>) -> Self {
    self.on_events.push(event.into());
    self
  }

  /// Append a step definition.
  pub fn step(mut self, step: StepDefinition) -> Self {
    self.steps.push(step);
    self
  }

  /// Get a step by name.
  pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
    self.steps.iter().find(|s| s.name == name)
  }

  /// Build the validated dependency graph for this workflow.
  pub fn graph(&self) -> Result<StepGraph, GraphError> {
    StepGraph::build(&self.steps)
  }
}
