use crate::registry::BlockRegistry;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use pullcore::{GraphAccessor, GraphError, Node};
use std::collections::HashMap;

/// Summary of a workflow that passed validation.
#[derive(Debug, Clone)]
pub struct WorkflowSummary {
    pub nodes: usize,
    pub edges: usize,
    /// Node ids in one valid execution order.
    pub order: Vec<String>,
}

/// Check the descendants of `root_id` before running them: every block type
/// is registered, every edge lands on a node, and there are no cycles.
pub fn validate_workflow(
    graph: &dyn GraphAccessor,
    registry: &BlockRegistry,
    root_id: &str,
) -> Result<WorkflowSummary, GraphError> {
    if graph.get_component(root_id).is_none() {
        return Err(GraphError::ComponentNotFound(root_id.to_string()));
    }
    validate_nodes(graph, registry, &graph.get_descendants(root_id))
}

pub fn validate_nodes(
    graph: &dyn GraphAccessor,
    registry: &BlockRegistry,
    nodes: &[Node],
) -> Result<WorkflowSummary, GraphError> {
    let mut dag: DiGraph<&str, ()> = DiGraph::new();
    let mut node_to_index: HashMap<&str, NodeIndex> = HashMap::new();

    for node in nodes {
        if !registry.contains(&node.node_type) {
            return Err(GraphError::UnknownBlockType {
                node_id: node.id.clone(),
                block_type: node.node_type.clone(),
            });
        }
        node_to_index.insert(node.id.as_str(), dag.add_node(node.id.as_str()));
    }

    let mut edges = 0;
    for node in nodes {
        for out in &node.outs {
            let Some(to_idx) = node_to_index.get(out.to_node_id.as_str()) else {
                // Edges may leave the workflow, but must land somewhere.
                if graph.get_component(&out.to_node_id).is_none() {
                    return Err(GraphError::DanglingEdge {
                        from: node.id.clone(),
                        to: out.to_node_id.clone(),
                    });
                }
                continue;
            };
            dag.add_edge(node_to_index[node.id.as_str()], *to_idx, ());
            edges += 1;
        }
    }

    let order = toposort(&dag, None)
        .map_err(|cycle| GraphError::CyclicDependency(dag[cycle.node_id()].to_string()))?;

    Ok(WorkflowSummary {
        nodes: nodes.len(),
        edges,
        order: order.into_iter().map(|idx| dag[idx].to_string()).collect(),
    })
}
