use crate::runner::WorkflowRunner;
use crate::scope::{ExecutionRecord, RunScope};
use futures::future::BoxFuture;
use pullcore::{BlockContext, ExecutionEnvironment, FlowError, GraphError, Node};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// What resolving one node produced.
#[derive(Debug, Clone)]
pub enum NodeRun {
    /// The node executed, now or earlier in the same scope.
    Reached(Arc<ExecutionRecord>),
    /// None of the node's incoming edges fired.
    Unreached,
    /// A node on the path set a return value; the run stops with it.
    Returned(Value),
}

/// `(producer, outcome label)` for every edge in `universe` into `target`.
///
/// A node without a parent is a root and never has dependencies.
pub fn dependencies<'a>(target: &Node, universe: &'a [Node]) -> Vec<(&'a Node, &'a str)> {
    if target.parent_id.is_none() {
        return Vec::new();
    }
    universe
        .iter()
        .flat_map(|producer| {
            producer
                .outs
                .iter()
                .filter(|out| out.to_node_id == target.id)
                .map(move |out| (producer, out.out_id.as_str()))
        })
        .collect()
}

/// Nodes with no outgoing edge into `universe`.
pub fn terminal_nodes(universe: &[Node]) -> Vec<&Node> {
    let ids: HashSet<&str> = universe.iter().map(|n| n.id.as_str()).collect();
    universe
        .iter()
        .filter(|n| !n.outs.iter().any(|out| ids.contains(out.to_node_id.as_str())))
        .collect()
}

impl WorkflowRunner {
    /// Resolve every terminal node of `universe` within `scope`.
    ///
    /// The first return value met, in terminal order, ends the run.
    pub(crate) fn execute_nodes<'a>(
        &'a self,
        universe: &'a [Node],
        env: &'a ExecutionEnvironment,
        scope: &'a mut RunScope,
    ) -> BoxFuture<'a, pullcore::Result<Option<Value>>> {
        Box::pin(async move {
            for terminal in terminal_nodes(universe) {
                match self.run_node(terminal, universe, env, scope).await? {
                    NodeRun::Returned(value) => return Ok(Some(value)),
                    NodeRun::Reached(record) => {
                        if let Some(value) = &record.return_value {
                            return Ok(Some(value.clone()));
                        }
                    }
                    NodeRun::Unreached => {}
                }
            }
            Ok(None)
        })
    }

    /// Execute `target` after its dependencies, at most once per scope.
    pub fn run_node<'a>(
        &'a self,
        target: &'a Node,
        universe: &'a [Node],
        env: &'a ExecutionEnvironment,
        scope: &'a mut RunScope,
    ) -> BoxFuture<'a, pullcore::Result<NodeRun>> {
        Box::pin(async move {
            if !self.registry.contains(&target.node_type) {
                return Err(GraphError::UnknownBlockType {
                    node_id: target.id.clone(),
                    block_type: target.node_type.clone(),
                }
                .into());
            }

            if let Some(record) = scope.get(&target.id) {
                return Ok(NodeRun::Reached(record));
            }

            if !scope.enter(&target.id) {
                return Err(GraphError::CyclicDependency(target.id.clone()).into());
            }
            let run = self.resolve_and_run(target, universe, env, scope).await;
            scope.leave(&target.id);
            run
        })
    }

    async fn resolve_and_run(
        &self,
        target: &Node,
        universe: &[Node],
        env: &ExecutionEnvironment,
        scope: &mut RunScope,
    ) -> pullcore::Result<NodeRun> {
        let dependencies = dependencies(target, universe);

        let mut result = Value::Null;
        let mut matched = 0usize;
        for (producer, out_id) in &dependencies {
            let record = match self.run_node(producer, universe, env, scope).await? {
                NodeRun::Reached(record) => record,
                NodeRun::Unreached => continue,
                NodeRun::Returned(value) => return Ok(NodeRun::Returned(value)),
            };
            if let Some(value) = &record.return_value {
                return Ok(NodeRun::Returned(value.clone()));
            }
            if record.matches(out_id) {
                matched += 1;
            }
            result = record.result.clone();
        }

        if !dependencies.is_empty() && matched == 0 {
            tracing::debug!("Node {} not reached by any fired edge", target.id);
            return Ok(NodeRun::Unreached);
        }

        let node_env = env.extend([
            ("result".to_string(), result),
            ("results".to_string(), Value::Object(scope.results())),
        ]);
        self.execute_block(target, node_env, scope).await
    }

    async fn execute_block(
        &self,
        target: &Node,
        node_env: ExecutionEnvironment,
        scope: &mut RunScope,
    ) -> pullcore::Result<NodeRun> {
        let block = self.registry.create_block(target)?;
        let ctx = BlockContext::new(target, self, node_env.clone());

        tracing::debug!("Running node {} ({})", target.id, target.node_type);
        let start = Instant::now();
        let run = block.run(&ctx).await;
        let execution_time_in_seconds = start.elapsed().as_secs_f64();

        match run {
            Ok(output) => {
                tracing::debug!(
                    "Node {} finished with outcome {:?} in {:.3}s",
                    target.id,
                    output.outcome,
                    execution_time_in_seconds
                );
                let record = scope.insert(ExecutionRecord {
                    node_id: target.id.clone(),
                    outcome: output.outcome,
                    result: output.result,
                    return_value: output.return_value,
                    env: node_env,
                    execution_time_in_seconds,
                });
                Ok(NodeRun::Reached(record))
            }
            Err(failure) => {
                let contained = failure
                    .outcome
                    .as_deref()
                    .is_some_and(|outcome| target.handles_outcome(outcome));
                let result = failure
                    .result
                    .unwrap_or_else(|| Value::String(failure.error.to_string()));
                let record = scope.insert(ExecutionRecord {
                    node_id: target.id.clone(),
                    outcome: failure.outcome,
                    result,
                    return_value: None,
                    env: node_env,
                    execution_time_in_seconds,
                });

                if contained {
                    tracing::warn!(
                        "Node {} failed, continuing on outcome {:?}: {}",
                        target.id,
                        record.outcome,
                        failure.error
                    );
                    Ok(NodeRun::Reached(record))
                } else {
                    tracing::error!("Node {} failed: {}", target.id, failure.error);
                    Err(FlowError::Block {
                        node_id: target.id.clone(),
                        source: failure.error,
                    })
                }
            }
        }
    }
}
