//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows: the block registry,
//! pull-based dependency resolution with per-scope memoization, outcome
//! routing, failure containment and the concurrent branch pool.

mod executor;
mod pool;
mod registry;
mod runner;
mod scope;
mod validate;

pub use executor::{dependencies, terminal_nodes, NodeRun};
pub use registry::{
    BlockFactory, BlockRegistry, BlockTemplate, FieldDefinition, OutDefinition, OutStyle,
};
pub use runner::{RunReport, RunnerConfig, WorkflowRunner};
pub use scope::{ExecutionRecord, RunScope};
pub use validate::{validate_nodes, validate_workflow, WorkflowSummary};
