use crate::{
    instance_path_for, BlockError, Evaluator, ExecutionEnvironment, FlowError, InstancePath, Node,
};
use async_trait::async_trait;
use serde_json::Value;

/// Conventional outcome labels.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_ERROR: &str = "error";

/// Core trait that every executable block implements
#[async_trait]
pub trait Block: Send + Sync {
    /// Execute the block for its bound node
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure>;
}

/// What a completed block produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockOutput {
    /// Label selecting which outgoing edges fire. `None` routes nowhere.
    pub outcome: Option<String>,
    /// Value visible to dependents as `result` and in `results`.
    pub result: Value,
    /// When set, the enclosing run stops and returns this value.
    pub return_value: Option<Value>,
}

impl BlockOutput {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: Some(outcome.into()),
            ..Self::default()
        }
    }

    pub fn success() -> Self {
        Self::new(OUTCOME_SUCCESS)
    }

    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.result = result.into();
        self
    }

    pub fn with_return_value(mut self, value: impl Into<Value>) -> Self {
        self.return_value = Some(value.into());
        self
    }
}

/// A block failure plus whatever the block committed before failing.
///
/// The runner contains the failure when `outcome` names an edge declared on
/// the node; otherwise the failure aborts the run.
#[derive(Debug)]
pub struct BlockFailure {
    pub error: BlockError,
    pub outcome: Option<String>,
    pub result: Option<Value>,
}

impl BlockFailure {
    pub fn new(error: BlockError) -> Self {
        Self {
            error,
            outcome: None,
            result: None,
        }
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.result = Some(result.into());
        self
    }
}

impl From<BlockError> for BlockFailure {
    fn from(error: BlockError) -> Self {
        Self::new(error)
    }
}

impl From<FlowError> for BlockFailure {
    fn from(error: FlowError) -> Self {
        Self::new(error.into())
    }
}

/// Tags an error with the outcome the block reports for it.
pub trait OutcomeExt<T> {
    fn or_outcome(self, outcome: &str) -> Result<T, BlockFailure>;
}

impl<T, E: Into<BlockError>> OutcomeExt<T> for Result<T, E> {
    fn or_outcome(self, outcome: &str) -> Result<T, BlockFailure> {
        self.map_err(|e| BlockFailure::new(e.into()).with_outcome(outcome))
    }
}

/// Nested execution facilities a block may call back into.
#[async_trait]
pub trait BranchRunner: Send + Sync {
    fn evaluator(&self) -> &dyn Evaluator;

    /// Runs the nodes reached from `from_node_id` on `outcome` as a
    /// self-contained universe and returns its return value.
    async fn run_branch(
        &self,
        from_node_id: &str,
        outcome: &str,
        env: ExecutionEnvironment,
    ) -> Result<Option<Value>, FlowError>;

    /// Replays a branch once per environment, each with its own run scope.
    /// Results line up with `envs`; an iteration without a return value
    /// contributes `null`.
    async fn run_branch_pool(
        &self,
        from_node_id: &str,
        outcome: &str,
        envs: Vec<ExecutionEnvironment>,
    ) -> Result<Vec<Value>, FlowError>;
}

/// Execution context passed to a block's `run`
pub struct BlockContext<'a> {
    node: &'a Node,
    runner: &'a dyn BranchRunner,
    env: ExecutionEnvironment,
    instance_path: InstancePath,
}

impl<'a> BlockContext<'a> {
    pub fn new(node: &'a Node, runner: &'a dyn BranchRunner, env: ExecutionEnvironment) -> Self {
        Self {
            node,
            runner,
            env,
            instance_path: instance_path_for(&node.id),
        }
    }

    pub fn node(&self) -> &Node {
        self.node
    }

    pub fn env(&self) -> &ExecutionEnvironment {
        &self.env
    }

    pub fn instance_path(&self) -> &InstancePath {
        &self.instance_path
    }

    /// Evaluate a field as text, defaulting to the empty string.
    pub fn get_field(&self, field_key: &str) -> Result<String, BlockError> {
        let value = self.get_field_or(field_key, false, "")?;
        Ok(crate::value_to_text(&value))
    }

    /// Evaluate a field as JSON, defaulting to `{}`.
    pub fn get_field_json(&self, field_key: &str) -> Result<Value, BlockError> {
        self.get_field_or(field_key, true, "{}")
    }

    pub fn get_field_or(
        &self,
        field_key: &str,
        as_json: bool,
        default: &str,
    ) -> Result<Value, BlockError> {
        self.runner.evaluator().evaluate_field(
            &self.instance_path,
            field_key,
            as_json,
            default,
            &self.env,
        )
    }

    /// Evaluate a field that must be present and non-empty.
    pub fn require_field(&self, field_key: &str) -> Result<String, BlockError> {
        let value = self.get_field(field_key)?;
        if value.is_empty() {
            return Err(BlockError::MissingField(field_key.to_string()));
        }
        Ok(value)
    }

    pub fn set_state(&self, expr: &str, value: Value) -> Result<(), BlockError> {
        self.runner
            .evaluator()
            .set_state(expr, &self.instance_path, value, &self.env)
    }

    pub async fn run_branch(
        &self,
        outcome: &str,
        env: ExecutionEnvironment,
    ) -> Result<Option<Value>, FlowError> {
        self.runner.run_branch(&self.node.id, outcome, env).await
    }

    pub async fn run_branch_pool(
        &self,
        outcome: &str,
        envs: Vec<ExecutionEnvironment>,
    ) -> Result<Vec<Value>, FlowError> {
        self.runner.run_branch_pool(&self.node.id, outcome, envs).await
    }
}
