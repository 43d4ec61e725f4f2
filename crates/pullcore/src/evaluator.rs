//! Field evaluation and application state.
//!
//! The runner never interprets field syntax; blocks go through an
//! [`Evaluator`] to read their configuration and to write state.
//! [`StateEvaluator`] is the in-memory implementation used by the CLI and
//! tests. It understands `@{path}` expressions, where `path` is a dotted
//! lookup into the execution environment, falling back to state.

use crate::{BlockError, ExecutionEnvironment, GraphAccessor};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One level of component instancing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePathItem {
    pub component_id: String,
    pub instance_number: usize,
}

pub type InstancePath = Vec<InstancePathItem>;

/// Single-element instance path used for every executed block.
pub fn instance_path_for(component_id: &str) -> InstancePath {
    vec![InstancePathItem {
        component_id: component_id.to_string(),
        instance_number: 0,
    }]
}

pub trait Evaluator: Send + Sync {
    fn evaluate_field(
        &self,
        instance_path: &InstancePath,
        field_key: &str,
        as_json: bool,
        default: &str,
        env: &ExecutionEnvironment,
    ) -> Result<Value, BlockError>;

    fn set_state(
        &self,
        expr: &str,
        instance_path: &InstancePath,
        value: Value,
        base_context: &ExecutionEnvironment,
    ) -> Result<(), BlockError>;
}

pub struct StateEvaluator {
    graph: Arc<dyn GraphAccessor>,
    state: RwLock<Map<String, Value>>,
}

impl StateEvaluator {
    pub fn new(graph: Arc<dyn GraphAccessor>) -> Self {
        Self::with_state(graph, Map::new())
    }

    pub fn with_state(graph: Arc<dyn GraphAccessor>, state: Map<String, Value>) -> Self {
        Self {
            graph,
            state: RwLock::new(state),
        }
    }

    /// Snapshot of the application state.
    pub fn state(&self) -> Value {
        Value::Object(self.state.read().clone())
    }

    fn lookup(&self, path: &str, env: &ExecutionEnvironment) -> Value {
        let mut segments = path.split('.').map(str::trim);
        let Some(head) = segments.next() else {
            return Value::Null;
        };

        let root = match env.get(head) {
            Some(value) => value.clone(),
            None => match self.state.read().get(head) {
                Some(value) => value.clone(),
                None => return Value::Null,
            },
        };

        segments
            .try_fold(root, |current, segment| match current {
                Value::Object(mut map) => map.remove(segment),
                Value::Array(mut items) => segment
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < items.len())
                    .map(|i| items.swap_remove(i)),
                _ => None,
            })
            .unwrap_or(Value::Null)
    }

    fn render(&self, template: &str, as_json: bool, env: &ExecutionEnvironment) -> RenderedField {
        let parts = split_template(template);
        if let [Part::Expr(path)] = parts.as_slice() {
            return RenderedField::Value(self.lookup(path, env));
        }

        let mut text = String::with_capacity(template.len());
        for part in parts {
            match part {
                Part::Text(t) => text.push_str(t),
                Part::Expr(path) => {
                    let value = self.lookup(path, env);
                    if as_json {
                        text.push_str(&value.to_string());
                    } else {
                        text.push_str(&value_to_text(&value));
                    }
                }
            }
        }
        RenderedField::Text(text)
    }
}

impl Evaluator for StateEvaluator {
    fn evaluate_field(
        &self,
        instance_path: &InstancePath,
        field_key: &str,
        as_json: bool,
        default: &str,
        env: &ExecutionEnvironment,
    ) -> Result<Value, BlockError> {
        let component_id = instance_path
            .last()
            .map(|item| item.component_id.as_str())
            .ok_or_else(|| BlockError::Evaluation {
                field: field_key.to_string(),
                message: "empty instance path".to_string(),
            })?;
        let node = self
            .graph
            .get_component(component_id)
            .ok_or_else(|| BlockError::Evaluation {
                field: field_key.to_string(),
                message: format!("component {} not found", component_id),
            })?;

        let template = match node.content.get(field_key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => default.to_string(),
            // Non-text content was authored as structured data already.
            Some(other) => {
                return Ok(if as_json {
                    other.clone()
                } else {
                    Value::String(value_to_text(other))
                })
            }
        };

        match self.render(&template, as_json, env) {
            RenderedField::Value(value) if as_json => Ok(value),
            RenderedField::Value(value) => Ok(Value::String(value_to_text(&value))),
            RenderedField::Text(text) if as_json => {
                serde_json::from_str(&text).map_err(|e| BlockError::Evaluation {
                    field: field_key.to_string(),
                    message: format!("invalid JSON: {}", e),
                })
            }
            RenderedField::Text(text) => Ok(Value::String(text)),
        }
    }

    fn set_state(
        &self,
        expr: &str,
        _instance_path: &InstancePath,
        value: Value,
        base_context: &ExecutionEnvironment,
    ) -> Result<(), BlockError> {
        let path = match self.render(expr, false, base_context) {
            RenderedField::Value(v) => value_to_text(&v),
            RenderedField::Text(t) => t,
        };
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(BlockError::State(format!("invalid state path \"{}\"", path)));
        }

        let mut state = self.state.write();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| BlockError::State("empty state path".to_string()))?;

        let mut current = &mut *state;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry
                .as_object_mut()
                .ok_or_else(|| BlockError::State(format!("cannot descend into \"{}\"", segment)))?;
        }
        current.insert(last.to_string(), value);
        Ok(())
    }
}

enum RenderedField {
    Value(Value),
    Text(String),
}

#[derive(Debug, PartialEq)]
enum Part<'a> {
    Text(&'a str),
    Expr(&'a str),
}

fn split_template(template: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("@{") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        if start > 0 {
            parts.push(Part::Text(&rest[..start]));
        }
        parts.push(Part::Expr(rest[start + 2..start + 2 + len].trim()));
        rest = &rest[start + 3 + len..];
    }
    if !rest.is_empty() {
        parts.push(Part::Text(rest));
    }
    parts
}

/// Text form used when a value is spliced into a string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentTree, Node};
    use serde_json::json;

    fn evaluator_for(node: Node) -> StateEvaluator {
        let mut tree = ComponentTree::new();
        tree.add(node);
        StateEvaluator::new(Arc::new(tree))
    }

    #[test]
    fn test_split_template() {
        assert_eq!(
            split_template("Hi @{ name }!"),
            vec![Part::Text("Hi "), Part::Expr("name"), Part::Text("!")]
        );
        assert_eq!(split_template("@{x"), vec![Part::Text("@{x")]);
    }

    #[test]
    fn test_single_expression_keeps_raw_value() {
        let evaluator = evaluator_for(Node::new("n", "t").with_content("value", "@{item}"));
        let env = ExecutionEnvironment::new().with("item", json!({"a": [1, 2]}));
        let path = instance_path_for("n");

        let raw = evaluator.evaluate_field(&path, "value", true, "{}", &env).unwrap();
        assert_eq!(raw, json!({"a": [1, 2]}));

        let text = evaluator.evaluate_field(&path, "value", false, "", &env).unwrap();
        assert_eq!(text, json!(r#"{"a":[1,2]}"#));
    }

    #[test]
    fn test_json_field_splices_expressions() {
        let evaluator = evaluator_for(Node::new("n", "t").with_content("items", "[@{a}, @{b.c}]"));
        let env = ExecutionEnvironment::new()
            .with("a", "France")
            .with("b", json!({"c": 2}));
        let value = evaluator
            .evaluate_field(&instance_path_for("n"), "items", true, "[]", &env)
            .unwrap();
        assert_eq!(value, json!(["France", 2]));
    }

    #[test]
    fn test_missing_field_uses_default() {
        let evaluator = evaluator_for(Node::new("n", "t"));
        let value = evaluator
            .evaluate_field(&instance_path_for("n"), "items", true, "[]", &ExecutionEnvironment::new())
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_invalid_json_is_an_evaluation_error() {
        let evaluator = evaluator_for(Node::new("n", "t").with_content("items", "[1,"));
        let err = evaluator
            .evaluate_field(&instance_path_for("n"), "items", true, "[]", &ExecutionEnvironment::new())
            .unwrap_err();
        assert!(matches!(err, BlockError::Evaluation { .. }));
    }

    #[test]
    fn test_set_state_creates_nested_paths() {
        let evaluator = evaluator_for(Node::new("n", "t"));
        let env = ExecutionEnvironment::new().with("key", "b");
        evaluator
            .set_state("a.@{key}", &instance_path_for("n"), json!(5), &env)
            .unwrap();
        assert_eq!(evaluator.state(), json!({"a": {"b": 5}}));

        // Later lookups see the state.
        let node_eval = evaluator_for(Node::new("m", "t").with_content("v", "@{a.b}"));
        node_eval
            .set_state("a.b", &instance_path_for("m"), json!(7), &env)
            .unwrap();
        let v = node_eval
            .evaluate_field(&instance_path_for("m"), "v", true, "null", &ExecutionEnvironment::new())
            .unwrap();
        assert_eq!(v, json!(7));
    }
}
