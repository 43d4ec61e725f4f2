use pullcore::{ExecutionEnvironment, ExecutionSummaryItem, NodeId};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of one executed node. Immutable once stored.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub node_id: NodeId,
    pub outcome: Option<String>,
    pub result: Value,
    pub return_value: Option<Value>,
    pub env: ExecutionEnvironment,
    pub execution_time_in_seconds: f64,
}

impl ExecutionRecord {
    pub fn matches(&self, outcome: &str) -> bool {
        self.outcome.as_deref() == Some(outcome)
    }
}

/// Memoization boundary for one logical run.
///
/// Every top-level run, branch run and pooled iteration gets its own scope,
/// so a node executed in one never satisfies the lookup of another.
#[derive(Debug, Default)]
pub struct RunScope {
    records: Vec<Arc<ExecutionRecord>>,
    index: HashMap<NodeId, usize>,
    resolving: HashSet<NodeId>,
}

impl RunScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<ExecutionRecord>> {
        self.index.get(node_id).map(|&i| Arc::clone(&self.records[i]))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub(crate) fn insert(&mut self, record: ExecutionRecord) -> Arc<ExecutionRecord> {
        let record = Arc::new(record);
        match self.index.get(&record.node_id) {
            Some(&i) => self.records[i] = Arc::clone(&record),
            None => {
                self.index.insert(record.node_id.clone(), self.records.len());
                self.records.push(Arc::clone(&record));
            }
        }
        record
    }

    /// Marks `node_id` as being resolved. False if it already was, which
    /// means the graph loops back onto it.
    pub(crate) fn enter(&mut self, node_id: &str) -> bool {
        self.resolving.insert(node_id.to_string())
    }

    pub(crate) fn leave(&mut self, node_id: &str) {
        self.resolving.remove(node_id);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in execution order.
    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().map(|r| r.as_ref())
    }

    /// Node id to result for everything executed so far.
    pub fn results(&self) -> Map<String, Value> {
        self.records()
            .map(|r| (r.node_id.clone(), r.result.clone()))
            .collect()
    }

    pub fn summary(&self) -> Vec<ExecutionSummaryItem> {
        self.records()
            .map(|r| ExecutionSummaryItem {
                component_id: r.node_id.clone(),
                outcome: r.outcome.clone(),
                result: r.result.clone(),
                return_value: r.return_value.clone(),
                execution_environment: r.env.to_value(),
                execution_time_in_seconds: r.execution_time_in_seconds,
            })
            .collect()
    }
}
