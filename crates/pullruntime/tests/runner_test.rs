// crates/pullruntime/tests/runner_test.rs

use async_trait::async_trait;
use pullcore::{
    Block, BlockContext, BlockError, BlockFailure, BlockOutput, ComponentTree, ExecutionEnvironment,
    FlowError, GraphError, LogSeverity, MemoryLogSink, Node, StateEvaluator, WORKFLOW_TYPE,
};
use pullruntime::{BlockFactory, BlockRegistry, RunnerConfig, WorkflowRunner};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Counts = Arc<Mutex<HashMap<String, usize>>>;

/// Test block whose behaviour is picked by its registered type.
struct TestBlock {
    kind: &'static str,
    node: Node,
    counts: Counts,
}

#[async_trait]
impl Block for TestBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(self.node.id.clone())
            .or_insert(0) += 1;

        let outcome = self
            .node
            .content
            .get("outcome")
            .and_then(Value::as_str)
            .unwrap_or("success")
            .to_string();
        let value = self.node.content.get("value").cloned().unwrap_or(Value::Null);

        match self.kind {
            "pass" => Ok(BlockOutput::new(outcome).with_result(value)),
            "echo_result" => {
                let result = ctx.env().get("result").cloned().unwrap_or(Value::Null);
                Ok(BlockOutput::new(outcome).with_result(result))
            }
            "results" => {
                let results = ctx.env().get("results").cloned().unwrap_or(Value::Null);
                Ok(BlockOutput::new(outcome).with_result(results))
            }
            "return" => Ok(BlockOutput::new(outcome)
                .with_result(value.clone())
                .with_return_value(value)),
            "copy_item" => {
                let item = ctx.env().get("item").cloned().unwrap_or(Value::Null);
                tokio::task::yield_now().await;
                Ok(BlockOutput::success()
                    .with_result(item.clone())
                    .with_return_value(item))
            }
            "fail" => {
                let failure =
                    BlockFailure::new(BlockError::ExecutionFailed("division by zero".to_string()));
                match self.node.content.get("outcome").and_then(Value::as_str) {
                    Some(outcome) => Err(failure.with_outcome(outcome)),
                    None => Err(failure),
                }
            }
            "branch" => {
                let returned = ctx.run_branch("sub", ctx.env().clone()).await?;
                Ok(BlockOutput::new(outcome).with_result(returned.unwrap_or(Value::Null)))
            }
            other => panic!("unknown test block {}", other),
        }
    }
}

struct TestFactory {
    kind: &'static str,
    counts: Counts,
}

impl BlockFactory for TestFactory {
    fn create(&self, node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(TestBlock {
            kind: self.kind,
            node: node.clone(),
            counts: Arc::clone(&self.counts),
        }))
    }

    fn block_type(&self) -> &str {
        self.kind
    }
}

struct Harness {
    runner: WorkflowRunner,
    counts: Counts,
    sink: Arc<MemoryLogSink>,
}

impl Harness {
    fn new(nodes: Vec<Node>) -> Self {
        Self::with_config(nodes, RunnerConfig::default())
    }

    fn with_config(nodes: Vec<Node>, config: RunnerConfig) -> Self {
        let mut tree = ComponentTree::new();
        tree.add(Node::new("wf", WORKFLOW_TYPE).with_content("key", "main"));
        for node in nodes {
            tree.add(node.with_parent("wf"));
        }
        let graph = Arc::new(tree);

        let counts: Counts = Arc::default();
        let mut registry = BlockRegistry::new();
        for kind in [
            "pass",
            "echo_result",
            "results",
            "return",
            "copy_item",
            "fail",
            "branch",
        ] {
            registry.register(Arc::new(TestFactory {
                kind,
                counts: Arc::clone(&counts),
            }));
        }

        let sink = Arc::new(MemoryLogSink::new());
        let runner = WorkflowRunner::new(
            Arc::new(registry),
            graph.clone(),
            Arc::new(StateEvaluator::new(graph)),
        )
        .with_log_sink(sink.clone())
        .with_config(config);

        Self {
            runner,
            counts,
            sink,
        }
    }

    fn count(&self, id: &str) -> usize {
        self.counts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

fn env() -> ExecutionEnvironment {
    ExecutionEnvironment::new()
}

#[tokio::test]
async fn test_linear_chain_runs_in_order() {
    let harness = Harness::new(vec![
        Node::new("c", "pass"),
        Node::new("a", "pass").with_out("success", "b"),
        Node::new("b", "pass").with_out("success", "c"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    assert_eq!(report.return_value, None);
    let order: Vec<_> = report.scope.records().map(|r| r.node_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    for id in ["a", "b", "c"] {
        assert_eq!(harness.count(id), 1);
    }
    assert_eq!(harness.sink.count(LogSeverity::Info), 1);
}

#[tokio::test]
async fn test_fan_in_diamond_executes_each_node_once() {
    let harness = Harness::new(vec![
        Node::new("a", "pass").with_out("success", "b").with_out("success", "c"),
        Node::new("b", "pass").with_out("success", "d"),
        Node::new("c", "pass").with_out("success", "d"),
        Node::new("d", "pass"),
    ]);

    harness.runner.run_workflow("wf", env()).await.unwrap();

    for id in ["a", "b", "c", "d"] {
        assert_eq!(harness.count(id), 1, "node {} should run exactly once", id);
    }
}

#[tokio::test]
async fn test_outcome_prunes_untaken_branch() {
    let harness = Harness::new(vec![
        Node::new("a", "pass")
            .with_content("outcome", "true")
            .with_out("true", "b")
            .with_out("false", "c"),
        Node::new("b", "pass"),
        Node::new("c", "pass").with_out("success", "d"),
        Node::new("d", "pass"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    assert!(report.scope.contains("b"));
    assert!(report.scope.get("c").is_none());
    assert!(report.scope.get("d").is_none());
    assert_eq!(harness.count("c"), 0);
    assert_eq!(harness.count("d"), 0);
}

#[tokio::test]
async fn test_convergence_reached_through_one_satisfied_path() {
    let harness = Harness::new(vec![
        Node::new("a", "pass")
            .with_content("outcome", "false")
            .with_out("true", "b")
            .with_out("false", "c"),
        Node::new("b", "pass").with_out("success", "d"),
        Node::new("c", "pass").with_out("success", "d"),
        Node::new("d", "pass"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    assert!(!report.scope.contains("b"));
    assert!(report.scope.contains("c"));
    assert!(report.scope.contains("d"));
}

#[tokio::test]
async fn test_dependency_result_flows_forward() {
    let harness = Harness::new(vec![
        Node::new("a", "pass").with_content("value", 5).with_out("success", "b"),
        Node::new("b", "echo_result").with_out("success", "c"),
        Node::new("c", "results"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    assert_eq!(report.scope.get("b").unwrap().result, json!(5));
    assert_eq!(report.scope.get("c").unwrap().result, json!({"a": 5, "b": 5}));
    // The caller's bindings reach every node.
    let a_env = &report.scope.get("a").unwrap().env;
    assert_eq!(a_env.get("result"), Some(&Value::Null));
}

#[tokio::test]
async fn test_caller_environment_is_visible() {
    let harness = Harness::new(vec![Node::new("a", "copy_item")]);

    let value = harness
        .runner
        .run_workflow("wf", env().with("item", "hello"))
        .await
        .unwrap();

    assert_eq!(value, Some(json!("hello")));
}

#[tokio::test]
async fn test_return_value_short_circuits() {
    let harness = Harness::new(vec![
        Node::new("a", "pass").with_out("success", "r"),
        Node::new("r", "return").with_content("value", 42).with_out("success", "c"),
        Node::new("c", "pass"),
    ]);

    let value = harness.runner.run_workflow("wf", env()).await.unwrap();

    assert_eq!(value, Some(json!(42)));
    assert_eq!(harness.count("r"), 1);
    assert_eq!(harness.count("c"), 0);
}

#[tokio::test]
async fn test_contained_failure_takes_error_branch() {
    let harness = Harness::new(vec![
        Node::new("a", "fail")
            .with_content("outcome", "error")
            .with_out("success", "ok")
            .with_out("error", "handler"),
        Node::new("ok", "pass"),
        Node::new("handler", "echo_result"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    let failed = report.scope.get("a").unwrap();
    assert_eq!(failed.outcome.as_deref(), Some("error"));
    assert_eq!(failed.result, json!("Execution failed: division by zero"));
    assert_eq!(harness.count("handler"), 1);
    assert_eq!(harness.count("ok"), 0);
    assert_eq!(
        report.scope.get("handler").unwrap().result,
        json!("Execution failed: division by zero")
    );
    assert_eq!(harness.sink.count(LogSeverity::Error), 0);
}

#[tokio::test]
async fn test_uncontained_failure_aborts_run() {
    let harness = Harness::new(vec![
        Node::new("a", "fail")
            .with_content("outcome", "error")
            .with_out("success", "b"),
        Node::new("b", "pass"),
    ]);

    let err = harness.runner.run_workflow("wf", env()).await.unwrap_err();

    assert_eq!(err.failed_node(), Some("a"));
    assert!(matches!(
        err,
        FlowError::Block {
            source: BlockError::ExecutionFailed(_),
            ..
        }
    ));
    assert_eq!(harness.count("b"), 0);

    let entries = harness.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert_eq!(entries[0].summary.len(), 1);
    assert_eq!(entries[0].summary[0].component_id, "a");
}

#[tokio::test]
async fn test_failure_without_outcome_is_fatal_even_with_error_edge() {
    let harness = Harness::new(vec![
        Node::new("a", "fail").with_out("error", "handler"),
        Node::new("handler", "pass"),
    ]);

    assert!(harness.runner.run_workflow("wf", env()).await.is_err());
    assert_eq!(harness.count("handler"), 0);
}

#[tokio::test]
async fn test_unknown_block_type_is_fatal() {
    let harness = Harness::new(vec![Node::new("a", "missing")]);

    let err = harness.runner.run_workflow("wf", env()).await.unwrap_err();

    assert!(matches!(
        err,
        FlowError::Graph(GraphError::UnknownBlockType { .. })
    ));
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let harness = Harness::new(vec![]);

    let err = harness.runner.run_workflow("nope", env()).await.unwrap_err();

    assert!(matches!(err, FlowError::Graph(GraphError::ComponentNotFound(_))));
}

#[tokio::test]
async fn test_cycle_is_detected_during_resolution() {
    let harness = Harness::new(vec![
        Node::new("a", "pass").with_out("success", "b"),
        Node::new("b", "pass").with_out("success", "a").with_out("success", "c"),
        Node::new("c", "pass"),
    ]);

    let err = harness.runner.run_workflow("wf", env()).await.unwrap_err();

    assert!(matches!(err, FlowError::Graph(GraphError::CyclicDependency(_))));
}

#[tokio::test]
async fn test_run_workflow_by_key() {
    let harness = Harness::new(vec![Node::new("r", "return").with_content("value", "done")]);

    let value = harness.runner.run_workflow_by_key("main", env()).await.unwrap();
    assert_eq!(value, Some(json!("done")));

    let err = harness
        .runner
        .run_workflow_by_key("other", env())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Graph(GraphError::WorkflowKeyNotFound(_))));
}

#[tokio::test]
async fn test_run_branch_uses_direct_targets_only() {
    let harness = Harness::new(vec![
        Node::new("a", "pass")
            .with_out("true", "b")
            .with_out("true", "c")
            .with_out("false", "d"),
        Node::new("b", "pass").with_out("success", "e"),
        Node::new("c", "pass"),
        Node::new("d", "pass"),
        Node::new("e", "pass"),
    ]);

    harness.runner.run_branch("a", "true", env()).await.unwrap();

    assert_eq!(harness.count("a"), 0);
    assert_eq!(harness.count("b"), 1);
    assert_eq!(harness.count("c"), 1);
    assert_eq!(harness.count("d"), 0);
    assert_eq!(harness.count("e"), 0);
    assert_eq!(harness.sink.entries().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_branch_pool_preserves_order_and_isolates_iterations() {
    let harness = Harness::with_config(
        vec![
            Node::new("loop", "pass").with_out("loop", "body"),
            Node::new("body", "copy_item"),
        ],
        RunnerConfig::default().with_max_pool_workers(3),
    );
    let items: Vec<Value> = (0..10).map(|i| json!(format!("item-{}", i))).collect();
    let envs = items.iter().map(|item| env().with("item", item.clone())).collect();

    let results = harness
        .runner
        .run_branch_pool("loop", "loop", envs)
        .await
        .unwrap();

    assert_eq!(results, items);
    // Every iteration re-executes the body in its own scope.
    assert_eq!(harness.count("body"), 10);
    // Pooled iterations never emit their own log entries.
    assert!(harness.sink.entries().is_empty());
}

#[tokio::test]
async fn test_branch_pool_empty_input() {
    let harness = Harness::new(vec![
        Node::new("loop", "pass").with_out("loop", "body"),
        Node::new("body", "copy_item"),
    ]);

    let results = harness
        .runner
        .run_branch_pool("loop", "loop", Vec::new())
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(harness.count("body"), 0);
}

#[tokio::test]
async fn test_branch_pool_without_return_value_yields_null() {
    let harness = Harness::new(vec![
        Node::new("loop", "pass").with_out("loop", "body"),
        Node::new("body", "pass").with_content("value", 1),
    ]);

    let results = harness
        .runner
        .run_branch_pool("loop", "loop", vec![env(), env()])
        .await
        .unwrap();

    assert_eq!(results, vec![Value::Null, Value::Null]);
}

#[tokio::test]
async fn test_branch_pool_propagates_fatal_failure() {
    let harness = Harness::new(vec![
        Node::new("loop", "pass").with_out("loop", "body"),
        Node::new("body", "fail"),
    ]);

    let err = harness
        .runner
        .run_branch_pool("loop", "loop", vec![env(), env(), env()])
        .await
        .unwrap_err();

    assert_eq!(err.failed_node(), Some("body"));
}

#[tokio::test]
async fn test_disabled_execution_log_emits_nothing() {
    let harness = Harness::with_config(
        vec![Node::new("a", "fail")],
        RunnerConfig::default().with_execution_log(false),
    );

    assert!(harness.runner.run_workflow("wf", env()).await.is_err());
    assert!(harness.sink.entries().is_empty());
}

#[tokio::test]
async fn test_nested_branch_runs_in_its_own_scope() {
    let harness = Harness::new(vec![
        Node::new("p", "pass").with_out("success", "q"),
        Node::new("q", "pass"),
        Node::new("s", "branch")
            .with_out("sub", "q")
            .with_out("sub", "r")
            .with_out("success", "c"),
        Node::new("r", "return").with_content("value", 42),
        Node::new("c", "echo_result"),
    ]);

    let report = harness.runner.run_workflow_report("wf", env()).await.unwrap();

    // `q` runs once inside the branch and once more in the outer run.
    assert_eq!(harness.count("q"), 2);
    assert_eq!(harness.count("r"), 1);
    assert!(!report.scope.contains("r"));
    assert_eq!(report.scope.get("s").unwrap().result, json!(42));
    assert_eq!(report.scope.get("c").unwrap().result, json!(42));
    // The branch return value stays inside the block that asked for it.
    assert_eq!(report.return_value, None);
    assert_eq!(harness.sink.entries().len(), 1);
}

#[tokio::test]
async fn test_self_parented_workflow_does_not_recurse() {
    let mut tree = ComponentTree::new();
    tree.add(Node::new("wf", WORKFLOW_TYPE).with_parent("wf"));
    tree.add(Node::new("a", "pass").with_parent("wf"));
    let graph = Arc::new(tree);
    let mut registry = BlockRegistry::new();
    registry.register(Arc::new(TestFactory {
        kind: "pass",
        counts: Counts::default(),
    }));
    let runner = WorkflowRunner::new(
        Arc::new(registry),
        graph.clone(),
        Arc::new(StateEvaluator::new(graph)),
    );

    let report = runner.run_workflow_report("wf", env()).await.unwrap();

    let ids: Vec<_> = report.scope.records().map(|r| r.node_id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
}
