use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::definition::WorkflowDefinition;
use crate::error::RegistryError;

/// Maps triggering event names to workflow definitions.
///
/// Registration validates the step DAG up front so the scheduler never sees
/// a malformed workflow. Intended usage registers everything once at
/// startup, but the map is behind a lock so registration from any thread is
/// sound; lookups are concurrent reads.
#[derive(Default)]
pub struct WorkflowRegistry {
  inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
  workflows: HashMap<String, Arc<WorkflowDefinition>>,
  events: HashMap<String, String>,
}

impl WorkflowRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a workflow and bind its trigger events.
  pub fn register(&self, definition: WorkflowDefinition) -> Result<(), RegistryError> {
    definition.graph().map_err(|source| RegistryError::InvalidDag {
      workflow: definition.name.clone(),
      source,
    })?;

    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

    if inner.workflows.contains_key(&definition.name) {
      return Err(RegistryError::DuplicateWorkflow(definition.name.clone()));
    }
    for event in &definition.on_events {
      if let Some(existing) = inner.events.get(event) {
        return Err(RegistryError::DuplicateEvent {
          event: event.clone(),
          workflow: existing.clone(),
        });
      }
    }

    for event in &definition.on_events {
      inner.events.insert(event.clone(), definition.name.clone());
    }
    inner
      .workflows
      .insert(definition.name.clone(), Arc::new(definition));
    Ok(())
  }

  /// Resolve the workflow bound to an event name.
  pub fn lookup_event(&self, event: &str) -> Option<Arc<WorkflowDefinition>> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    let workflow = inner.events.get(event)?;
    inner.workflows.get(workflow).cloned()
  }

  /// Get a workflow by its own name.
  pub fn get(&self, workflow: &str) -> Option<Arc<WorkflowDefinition>> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner.workflows.get(workflow).cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::definition::StepDefinition;
  use crate::error::GraphError;

  fn noop_step(name: &str) -> StepDefinition {
    StepDefinition::new(name, |_ctx| async { Ok(serde_json::json!({})) })
  }

  fn simple_workflow(name: &str, event: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(name)
      .on_event(event)
      .step(noop_step("only"))
  }

  #[test]
  fn register_and_lookup() {
    let registry = WorkflowRegistry::new();
    registry
      .register(simple_workflow("scraper", "scraper:start"))
      .unwrap();

    let def = registry.lookup_event("scraper:start").unwrap();
    assert_eq!(def.name, "scraper");
    assert!(registry.lookup_event("scraper:unknown").is_none());
    assert!(registry.get("scraper").is_some());
  }

  #[test]
  fn rejects_duplicate_workflow_name() {
    let registry = WorkflowRegistry::new();
    registry.register(simple_workflow("w", "a")).unwrap();

    let err = registry.register(simple_workflow("w", "b")).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateWorkflow(name) if name == "w"));
    // The failed registration must not have claimed the event.
    assert!(registry.lookup_event("b").is_none());
  }

  #[test]
  fn rejects_duplicate_event_binding() {
    let registry = WorkflowRegistry::new();
    registry.register(simple_workflow("first", "shared")).unwrap();

    let err = registry
      .register(simple_workflow("second", "shared"))
      .unwrap_err();
    assert!(
      matches!(err, RegistryError::DuplicateEvent { event, workflow } if event == "shared" && workflow == "first")
    );
  }

  #[test]
  fn rejects_invalid_dag_at_registration() {
    let registry = WorkflowRegistry::new();
    let cyclic = WorkflowDefinition::new("cyclic")
      .on_event("cyclic:start")
      .step(noop_step("a").parents(["b"]))
      .step(noop_step("b").parents(["a"]));

    let err = registry.register(cyclic).unwrap_err();
    assert!(matches!(
      err,
      RegistryError::InvalidDag {
        source: GraphError::Cycle(_),
        ..
      }
    ));
    assert!(registry.lookup_event("cyclic:start").is_none());
  }
}
