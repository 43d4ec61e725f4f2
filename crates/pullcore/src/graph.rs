use crate::GraphError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

pub type NodeId = String;

/// Component type of the container that owns a workflow's nodes.
pub const WORKFLOW_TYPE: &str = "workflows_workflow";

/// A graph vertex: one workflow step bound to a block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Raw field values as authored in the editor.
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default)]
    pub outs: Vec<Out>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            parent_id: None,
            content: Map::new(),
            outs: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_content(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn with_out(mut self, out_id: impl Into<String>, to_node_id: impl Into<String>) -> Self {
        self.outs.push(Out {
            out_id: out_id.into(),
            to_node_id: to_node_id.into(),
        });
        self
    }

    /// Whether any outgoing edge fires on `outcome`.
    pub fn handles_outcome(&self, outcome: &str) -> bool {
        self.outs.iter().any(|out| out.out_id == outcome)
    }

    /// Targets of every edge labelled `outcome`, in declaration order.
    pub fn targets<'a>(&'a self, outcome: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.outs
            .iter()
            .filter(move |out| out.out_id == outcome)
            .map(|out| out.to_node_id.as_str())
    }
}

/// Outcome-labelled edge stored on its producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Out {
    pub out_id: String,
    pub to_node_id: NodeId,
}

/// Read-only view over a component tree.
pub trait GraphAccessor: Send + Sync {
    fn get_component(&self, id: &str) -> Option<Node>;

    /// Every component below `root_id`, depth first, in insertion order.
    fn get_descendants(&self, root_id: &str) -> Vec<Node>;

    /// Workflow container whose `key` content field equals `key`.
    fn find_workflow(&self, key: &str) -> Option<Node>;
}

/// Serialized form of a component tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub components: Vec<Node>,
}

/// In-memory component tree.
#[derive(Debug, Clone, Default)]
pub struct ComponentTree {
    components: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a component. Replacement keeps the original position.
    pub fn add(&mut self, node: Node) {
        if !self.components.contains_key(&node.id) {
            self.order.push(node.id.clone());
        }
        self.components.insert(node.id.clone(), node);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.components.get(id))
    }

    pub fn from_document(document: WorkflowDocument) -> Result<Self, GraphError> {
        let mut tree = Self::new();
        for node in document.components {
            if tree.components.contains_key(&node.id) {
                return Err(GraphError::InvalidDocument(format!(
                    "duplicate component id {}",
                    node.id
                )));
            }
            tree.add(node);
        }
        tree.check_parents()?;
        Ok(tree)
    }

    /// Every parent chain must end without revisiting a component.
    fn check_parents(&self) -> Result<(), GraphError> {
        for node in self.iter() {
            let mut seen = HashSet::from([node.id.as_str()]);
            let mut parent = node.parent_id.as_deref();
            while let Some(id) = parent {
                if !seen.insert(id) {
                    return Err(GraphError::InvalidDocument(format!(
                        "component {} is its own ancestor",
                        node.id
                    )));
                }
                parent = self
                    .components
                    .get(id)
                    .and_then(|p| p.parent_id.as_deref());
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let document: WorkflowDocument = serde_json::from_str(json)
            .map_err(|e| GraphError::InvalidDocument(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn to_document(&self) -> WorkflowDocument {
        WorkflowDocument {
            components: self.iter().cloned().collect(),
        }
    }

    fn collect_descendants<'a>(
        &'a self,
        parent_id: &str,
        visited: &mut HashSet<&'a str>,
        out: &mut Vec<Node>,
    ) {
        for node in self.iter() {
            if node.parent_id.as_deref() == Some(parent_id) && visited.insert(node.id.as_str()) {
                out.push(node.clone());
                self.collect_descendants(&node.id, visited, out);
            }
        }
    }
}

impl GraphAccessor for ComponentTree {
    fn get_component(&self, id: &str) -> Option<Node> {
        self.components.get(id).cloned()
    }

    fn get_descendants(&self, root_id: &str) -> Vec<Node> {
        let mut nodes = Vec::new();
        // Trees built with `add` may still loop; never revisit a component.
        let mut visited = HashSet::from([root_id]);
        self.collect_descendants(root_id, &mut visited, &mut nodes);
        nodes
    }

    fn find_workflow(&self, key: &str) -> Option<Node> {
        self.iter()
            .find(|node| {
                node.node_type == WORKFLOW_TYPE
                    && node.content.get("key").and_then(Value::as_str) == Some(key)
            })
            .cloned()
    }
}
