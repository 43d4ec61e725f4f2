use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Variable bindings visible to a node.
///
/// Cloning is cheap and extending always produces a new environment, so a
/// node never observes bindings added further downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionEnvironment {
    vars: Arc<Map<String, Value>>,
}

impl ExecutionEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// New environment with `name` bound to `value`.
    pub fn with(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extend([(name.into(), value.into())])
    }

    /// New environment with every binding in `bindings` applied over this one.
    pub fn extend<I>(&self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut vars = (*self.vars).clone();
        vars.extend(bindings);
        Self {
            vars: Arc::new(vars),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.vars).clone())
    }
}

impl From<Map<String, Value>> for ExecutionEnvironment {
    fn from(vars: Map<String, Value>) -> Self {
        Self {
            vars: Arc::new(vars),
        }
    }
}

impl FromIterator<(String, Value)> for ExecutionEnvironment {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::from(iter.into_iter().collect::<Map<String, Value>>())
    }
}
