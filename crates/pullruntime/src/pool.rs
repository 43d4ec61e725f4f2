use crate::runner::WorkflowRunner;
use crate::scope::RunScope;
use pullcore::{ExecutionEnvironment, FlowError, Node};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;

impl WorkflowRunner {
    /// Replay the branch reached from `from_node_id` on `outcome` once per
    /// environment.
    ///
    /// Each iteration runs in its own [`RunScope`] on a bounded set of tokio
    /// tasks. The returned values line up with `envs` whatever order the
    /// iterations finish in. The first fatal error is returned as soon as it
    /// is seen and the iterations still in flight are aborted.
    pub async fn run_branch_pool(
        &self,
        from_node_id: &str,
        outcome: &str,
        envs: Vec<ExecutionEnvironment>,
    ) -> pullcore::Result<Vec<Value>> {
        let total = envs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let nodes: Arc<[Node]> = self.branch_nodes(from_node_id, outcome)?.into();
        let workers = self.pool_size(total);
        tracing::debug!(
            "Branch pool from {} on {:?}: {} iterations, {} workers",
            from_node_id,
            outcome,
            total,
            workers
        );

        let mut results = vec![Value::Null; total];
        let mut pending = envs.into_iter().enumerate();
        let mut join_set: JoinSet<(usize, pullcore::Result<Option<Value>>)> = JoinSet::new();

        loop {
            while join_set.len() < workers {
                let Some((index, env)) = pending.next() else {
                    break;
                };
                let runner = self.clone();
                let nodes = Arc::clone(&nodes);
                join_set.spawn(async move {
                    let mut scope = RunScope::new();
                    let run = runner.execute_nodes(&nodes, &env, &mut scope).await;
                    (index, run)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (index, run) = joined.map_err(|e| FlowError::Join(e.to_string()))?;
            results[index] = run?.unwrap_or(Value::Null);
        }

        Ok(results)
    }

    fn pool_size(&self, total: usize) -> usize {
        let limit = self.config.max_pool_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        limit.clamp(1, total.max(1))
    }
}
