use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Block '{node_id}' failed: {source}")]
    Block {
        node_id: String,
        #[source]
        source: BlockError,
    },

    #[error("Branch worker failed: {0}")]
    Join(String),
}

impl FlowError {
    /// Node id of the block whose failure aborted the run, if any.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            FlowError::Block { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Errors raised from inside a block's `run`.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Field evaluation failed for '{field}': {message}")]
    Evaluation { field: String, message: String },

    #[error("State update failed: {0}")]
    State(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Branch run failed: {0}")]
    Branch(#[source] Box<FlowError>),
}

impl From<FlowError> for BlockError {
    fn from(err: FlowError) -> Self {
        BlockError::Branch(Box::new(err))
    }
}

/// Malformed graph conditions. These never have a recovery path.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Workflow with key \"{0}\" not found")]
    WorkflowKeyNotFound(String),

    #[error("Unknown block type \"{block_type}\" on node {node_id}")]
    UnknownBlockType { node_id: String, block_type: String },

    #[error("Cyclic dependency detected at node {0}")]
    CyclicDependency(String),

    #[error("Edge from {from} targets missing node {to}")]
    DanglingEdge { from: String, to: String },

    #[error("Invalid workflow document: {0}")]
    InvalidDocument(String),
}
