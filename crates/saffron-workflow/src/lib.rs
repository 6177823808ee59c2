//! Saffron Workflow
//!
//! This crate defines the workflow model: immutable [`WorkflowDefinition`]s
//! made of named steps with declared parent edges, the dependency graph used
//! for scheduling and registration-time validation, and the
//! [`WorkflowRegistry`] that maps triggering event names to definitions.
//!
//! Step bodies are plain async Rust closures. They receive a [`StepContext`]
//! carrying the trigger payload and the outputs of parent steps, and may
//! spawn and await child workflow runs through the [`ChildSpawner`] seam
//! implemented by the engine.

mod context;
mod definition;
mod error;
mod graph;
mod registry;

pub use context::{ChildRunHandle, ChildSpawner, RunOutcome, StepContext};
pub use definition::{StepDefinition, StepFn, StepFuture, StepOutput, WorkflowDefinition};
pub use error::{GraphError, RegistryError, StepError};
pub use graph::StepGraph;
pub use registry::WorkflowRegistry;
