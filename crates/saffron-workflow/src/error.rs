use thiserror::Error;

/// Structural problems in a workflow's step graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// Two steps share the same name.
  #[error("duplicate step name: {0}")]
  DuplicateStep(String),

  /// A step declares a parent that does not exist in the workflow.
  #[error("step '{step}' references unknown parent '{parent}'")]
  UnknownParent { step: String, parent: String },

  /// The dependency edges form a cycle.
  #[error("dependency cycle involving step '{0}'")]
  Cycle(String),
}

/// Errors raised when registering or resolving workflows.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// A workflow with this name is already registered.
  #[error("workflow already registered: {0}")]
  DuplicateWorkflow(String),

  /// The event is already bound to another workflow.
  #[error("event '{event}' already bound to workflow '{workflow}'")]
  DuplicateEvent { event: String, workflow: String },

  /// The workflow's step graph failed validation.
  #[error("invalid dag in workflow '{workflow}': {source}")]
  InvalidDag {
    workflow: String,
    #[source]
    source: GraphError,
  },
}

/// A failure returned by a step body.
///
/// The variant carries the retry classification: transient failures (network
/// errors and the like) are retried up to the step's ceiling, terminal
/// failures (malformed input, failed child runs) end the run immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
  #[error("{0}")]
  Retryable(String),

  #[error("{0}")]
  Terminal(String),
}

impl StepError {
  /// A transient failure, retried while attempts remain.
  pub fn retryable(message: impl Into<String>) -> Self {
    Self::Retryable(message.into())
  }

  /// A permanent failure that ends the run regardless of retries left.
  pub fn terminal(message: impl Into<String>) -> Self {
    Self::Terminal(message.into())
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Retryable(_))
  }

  /// The human-readable failure message.
  pub fn message(&self) -> &str {
    match self {
      Self::Retryable(message) | Self::Terminal(message) => message,
    }
  }
}
