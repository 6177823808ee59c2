use thiserror::Error;

use saffron_workflow::RegistryError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
  /// No workflow is registered for the triggering event.
  #[error("no workflow registered for event '{0}'")]
  UnknownEvent(String),

  /// Registration failed (duplicate name/event or invalid DAG).
  #[error(transparent)]
  Registry(#[from] RegistryError),

  /// The run store rejected an operation.
  #[error(transparent)]
  Store(#[from] saffron_store::Error),

  /// The engine has been shut down.
  #[error("engine is shut down")]
  ShutDown,
}

impl EngineError {
  /// Whether this is a lookup miss a caller should report as "not found".
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Store(saffron_store::Error::NotFound(_)))
  }
}
