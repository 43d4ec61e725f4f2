//! Core abstractions for the pull-based workflow engine
//!
//! This crate provides the graph model, the block contract, execution
//! environments and the external collaborator interfaces (graph accessor,
//! field evaluator, execution log). It does not execute anything itself.

mod block;
mod env;
mod error;
mod evaluator;
mod graph;
mod log;

pub use block::{
    Block, BlockContext, BlockFailure, BlockOutput, BranchRunner, OutcomeExt, OUTCOME_ERROR,
    OUTCOME_SUCCESS,
};
pub use env::ExecutionEnvironment;
pub use error::{BlockError, FlowError, GraphError};
pub use evaluator::{
    instance_path_for, value_to_text, Evaluator, InstancePath, InstancePathItem, StateEvaluator,
};
pub use graph::{
    ComponentTree, GraphAccessor, Node, NodeId, Out, WorkflowDocument, WORKFLOW_TYPE,
};
pub use log::{
    ExecutionLogEntry, ExecutionLogSink, ExecutionSummaryItem, LogBus, LogSeverity,
    MemoryLogSink, NoopLogSink, RunId,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
