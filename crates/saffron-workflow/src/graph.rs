use std::collections::{HashMap, HashSet};

use crate::definition::StepDefinition;
use crate::error::GraphError;

/// Dependency graph over a workflow's steps.
///
/// Construction validates the structure: step names must be unique, parent
/// references must resolve, and the edges must be acyclic.
#[derive(Debug, Clone)]
pub struct StepGraph {
  /// step -> declared parents.
  parents: HashMap<String, Vec<String>>,
  /// step -> steps that depend on it.
  children: HashMap<String, Vec<String>>,
}

impl StepGraph {
  /// Build and validate a graph from step definitions.
  pub fn build(steps: &[StepDefinition]) -> Result<Self, GraphError> {
    let mut parents: HashMap<String, Vec<String>> = HashMap::new();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();

    for step in steps {
      if parents.contains_key(&step.name) {
        return Err(GraphError::DuplicateStep(step.name.clone()));
      }
      parents.insert(step.name.clone(), step.parents.clone());
      children.entry(step.name.clone()).or_default();
    }

    for step in steps {
      for parent in &step.parents {
        if !parents.contains_key(parent) {
          return Err(GraphError::UnknownParent {
            step: step.name.clone(),
            parent: parent.clone(),
          });
        }
        children
          .entry(parent.clone())
          .or_default()
          .push(step.name.clone());
      }
    }

    let graph = Self { parents, children };
    graph.check_acyclic()?;
    Ok(graph)
  }

  /// Topological-sort (Kahn) cycle detection.
  ///
  /// Reports the lexicographically smallest step left on a cycle so the
  /// error is deterministic.
  fn check_acyclic(&self) -> Result<(), GraphError> {
    let mut in_degree: HashMap<&str, usize> = self
      .parents
      .iter()
      .map(|(step, parents)| (step.as_str(), parents.len()))
      .collect();

    let mut ready: Vec<&str> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(step, _)| *step)
      .collect();

    let mut visited = 0usize;
    while let Some(step) = ready.pop() {
      visited += 1;
      for child in self.children(step) {
        let degree = in_degree
          .get_mut(child.as_str())
          .ok_or_else(|| GraphError::Cycle(child.clone()))?;
        *degree -= 1;
        if *degree == 0 {
          ready.push(child);
        }
      }
    }

    if visited == self.parents.len() {
      return Ok(());
    }

    let offending = in_degree
      .iter()
      .filter(|(_, degree)| **degree > 0)
      .map(|(step, _)| *step)
      .min()
      .unwrap_or_default();
    Err(GraphError::Cycle(offending.to_string()))
  }

  /// Declared parents of a step.
  pub fn parents(&self, step: &str) -> &[String] {
    self.parents.get(step).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Steps that list `step` as a parent.
  pub fn children(&self, step: &str) -> &[String] {
    self.children.get(step).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Steps with no parents, eligible as soon as the run starts.
  pub fn roots(&self) -> Vec<&str> {
    let mut roots: Vec<&str> = self
      .parents
      .iter()
      .filter(|(_, parents)| parents.is_empty())
      .map(|(step, _)| step.as_str())
      .collect();
    roots.sort_unstable();
    roots
  }

  /// Steps with no children; their outputs form the run result.
  pub fn terminals(&self) -> Vec<&str> {
    let mut terminals: Vec<&str> = self
      .children
      .iter()
      .filter(|(_, children)| children.is_empty())
      .map(|(step, _)| step.as_str())
      .collect();
    terminals.sort_unstable();
    terminals
  }

  /// Whether every parent of `step` is in the `succeeded` set.
  pub fn parents_satisfied(&self, step: &str, succeeded: &HashSet<String>) -> bool {
    self.parents(step).iter().all(|p| succeeded.contains(p))
  }

  pub fn len(&self) -> usize {
    self.parents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.parents.is_empty()
  }
}
