use crate::registry::BlockRegistry;
use crate::scope::RunScope;
use async_trait::async_trait;
use chrono::Utc;
use pullcore::{
    BranchRunner, Evaluator, ExecutionEnvironment, ExecutionLogEntry, ExecutionLogSink,
    FlowError, GraphAccessor, GraphError, LogSeverity, Node, NoopLogSink, RunId,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Upper bound on concurrently running pooled iterations. `None` uses
    /// the available parallelism.
    pub max_pool_workers: Option<usize>,
    /// When false, no execution log entries are assembled or emitted.
    pub execution_log_enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_pool_workers: None,
            execution_log_enabled: true,
        }
    }
}

impl RunnerConfig {
    pub fn with_max_pool_workers(mut self, workers: usize) -> Self {
        self.max_pool_workers = Some(workers.max(1));
        self
    }

    pub fn with_execution_log(mut self, enabled: bool) -> Self {
        self.execution_log_enabled = enabled;
        self
    }
}

/// Result of a top-level run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub return_value: Option<Value>,
    pub scope: RunScope,
}

/// Executes workflows by pulling terminal nodes' dependencies on demand.
///
/// Cheap to clone; all collaborators are shared. Holds no per-run state:
/// every run threads its own [`RunScope`].
#[derive(Clone)]
pub struct WorkflowRunner {
    pub(crate) registry: Arc<BlockRegistry>,
    pub(crate) graph: Arc<dyn GraphAccessor>,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    log_sink: Arc<dyn ExecutionLogSink>,
    pub(crate) config: RunnerConfig,
}

impl WorkflowRunner {
    pub fn new(
        registry: Arc<BlockRegistry>,
        graph: Arc<dyn GraphAccessor>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            registry,
            graph,
            evaluator,
            log_sink: Arc::new(NoopLogSink),
            config: RunnerConfig::default(),
        }
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn ExecutionLogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn graph(&self) -> &Arc<dyn GraphAccessor> {
        &self.graph
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every descendant of `root_id`.
    pub async fn run_workflow(
        &self,
        root_id: &str,
        env: ExecutionEnvironment,
    ) -> pullcore::Result<Option<Value>> {
        Ok(self.run_workflow_report(root_id, env).await?.return_value)
    }

    pub async fn run_workflow_report(
        &self,
        root_id: &str,
        env: ExecutionEnvironment,
    ) -> pullcore::Result<RunReport> {
        let nodes = self.workflow_nodes(root_id)?;
        self.run_nodes_report(&nodes, env).await
    }

    /// Run the workflow container whose `key` field equals `key`.
    pub async fn run_workflow_by_key(
        &self,
        key: &str,
        env: ExecutionEnvironment,
    ) -> pullcore::Result<Option<Value>> {
        let workflow = self
            .graph
            .find_workflow(key)
            .ok_or_else(|| GraphError::WorkflowKeyNotFound(key.to_string()))?;
        self.run_workflow(&workflow.id, env).await
    }

    /// Run the nodes reached from `from_node_id` on `outcome` as a
    /// top-level run.
    pub async fn run_branch(
        &self,
        from_node_id: &str,
        outcome: &str,
        env: ExecutionEnvironment,
    ) -> pullcore::Result<Option<Value>> {
        let nodes = self.branch_nodes(from_node_id, outcome)?;
        Ok(self.run_nodes_report(&nodes, env).await?.return_value)
    }

    pub async fn run_nodes(
        &self,
        universe: &[Node],
        env: ExecutionEnvironment,
    ) -> pullcore::Result<Option<Value>> {
        Ok(self.run_nodes_report(universe, env).await?.return_value)
    }

    /// Run `universe` in a fresh scope and emit one log entry for it.
    pub async fn run_nodes_report(
        &self,
        universe: &[Node],
        env: ExecutionEnvironment,
    ) -> pullcore::Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        tracing::info!(%run_id, nodes = universe.len(), "Starting workflow run");

        let mut scope = RunScope::new();
        match self.execute_nodes(universe, &env, &mut scope).await {
            Ok(return_value) => {
                tracing::info!(
                    %run_id,
                    executed = scope.len(),
                    "Workflow run completed in {}ms",
                    started.elapsed().as_millis()
                );
                self.emit_log(
                    run_id,
                    "Workflow execution",
                    LogSeverity::Info,
                    &scope,
                    return_value.as_ref(),
                );
                Ok(RunReport {
                    run_id,
                    return_value,
                    scope,
                })
            }
            Err(e) => {
                tracing::error!(%run_id, executed = scope.len(), "Workflow run failed: {}", e);
                self.emit_log(
                    run_id,
                    "Failed workflow execution",
                    LogSeverity::Error,
                    &scope,
                    None,
                );
                Err(e)
            }
        }
    }

    pub(crate) fn workflow_nodes(&self, root_id: &str) -> pullcore::Result<Vec<Node>> {
        if self.graph.get_component(root_id).is_none() {
            return Err(GraphError::ComponentNotFound(root_id.to_string()).into());
        }
        Ok(self.graph.get_descendants(root_id))
    }

    /// Nodes targeted by `from_node_id`'s edges labelled `outcome`.
    pub(crate) fn branch_nodes(
        &self,
        from_node_id: &str,
        outcome: &str,
    ) -> pullcore::Result<Vec<Node>> {
        let base = self
            .graph
            .get_component(from_node_id)
            .ok_or_else(|| GraphError::ComponentNotFound(from_node_id.to_string()))?;

        base.targets(outcome)
            .map(|to| {
                self.graph.get_component(to).ok_or_else(|| {
                    GraphError::DanglingEdge {
                        from: from_node_id.to_string(),
                        to: to.to_string(),
                    }
                    .into()
                })
            })
            .collect()
    }

    fn emit_log(
        &self,
        run_id: RunId,
        title: &str,
        severity: LogSeverity,
        scope: &RunScope,
        return_value: Option<&Value>,
    ) {
        if !self.config.execution_log_enabled {
            return;
        }
        self.log_sink.append(ExecutionLogEntry {
            run_id,
            title: title.to_string(),
            severity,
            message: "Execution finished.".to_string(),
            summary: scope.summary(),
            return_value: return_value.cloned(),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl BranchRunner for WorkflowRunner {
    fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    async fn run_branch(
        &self,
        from_node_id: &str,
        outcome: &str,
        env: ExecutionEnvironment,
    ) -> pullcore::Result<Option<Value>> {
        let nodes = self.branch_nodes(from_node_id, outcome)?;
        let mut scope = RunScope::new();
        self.execute_nodes(&nodes, &env, &mut scope).await
    }

    async fn run_branch_pool(
        &self,
        from_node_id: &str,
        outcome: &str,
        envs: Vec<ExecutionEnvironment>,
    ) -> Result<Vec<Value>, FlowError> {
        WorkflowRunner::run_branch_pool(self, from_node_id, outcome, envs).await
    }
}
