use pullcore::{Block, BlockError, GraphError, Node};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Factory trait for creating block instances
pub trait BlockFactory: Send + Sync {
    /// Create a block bound to `node`
    fn create(&self, node: &Node) -> Result<Box<dyn Block>, BlockError>;

    /// Get block type identifier
    fn block_type(&self) -> &str;

    /// Editor-facing description of the block. The runner never reads it.
    fn template(&self) -> BlockTemplate {
        BlockTemplate::default()
    }
}

/// Declarative metadata consumed by the workflow editor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockTemplate {
    pub name: String,
    pub description: String,
    pub category: String,
    pub fields: BTreeMap<String, FieldDefinition>,
    /// Outcome sockets keyed by outcome label, in display order.
    pub outs: Vec<(String, OutDefinition)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub desc: String,
    pub default: Option<String>,
    pub init: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub control: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutDefinition {
    pub name: String,
    pub description: String,
    pub style: OutStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutStyle {
    Success,
    Error,
    Dynamic,
}

impl BlockTemplate {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, field: FieldDefinition) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    pub fn with_out(
        mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        style: OutStyle,
    ) -> Self {
        self.outs.push((
            key.into(),
            OutDefinition {
                name: name.into(),
                description: description.into(),
                style,
            },
        ));
        self
    }

    /// The standard success/error socket pair.
    pub fn with_default_outs(self) -> Self {
        self.with_out(
            pullcore::OUTCOME_SUCCESS,
            "Success",
            "The block executed successfully.",
            OutStyle::Success,
        )
        .with_out(
            pullcore::OUTCOME_ERROR,
            "Error",
            "The block wasn't executed successfully.",
            OutStyle::Error,
        )
    }

    pub fn out_labels(&self) -> impl Iterator<Item = &str> {
        self.outs.iter().map(|(key, _)| key.as_str())
    }
}

/// Registry of available block types.
///
/// Built once at startup and handed to the runner; nothing global.
pub struct BlockRegistry {
    factories: BTreeMap<String, Arc<dyn BlockFactory>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a block factory. A later registration for the same type wins.
    pub fn register(&mut self, factory: Arc<dyn BlockFactory>) {
        let block_type = factory.block_type().to_string();
        tracing::debug!("Registering block type: {}", block_type);
        if self.factories.insert(block_type.clone(), factory).is_some() {
            tracing::warn!("Block type {} registered twice, replacing", block_type);
        }
    }

    pub fn resolve(&self, block_type: &str) -> Option<&Arc<dyn BlockFactory>> {
        self.factories.get(block_type)
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.factories.contains_key(block_type)
    }

    /// Create the block bound to `node`
    pub fn create_block(&self, node: &Node) -> Result<Box<dyn Block>, pullcore::FlowError> {
        let factory = self
            .resolve(&node.node_type)
            .ok_or_else(|| GraphError::UnknownBlockType {
                node_id: node.id.clone(),
                block_type: node.node_type.clone(),
            })?;

        factory
            .create(node)
            .map_err(|source| pullcore::FlowError::Block {
                node_id: node.id.clone(),
                source,
            })
    }

    /// Get all registered block types, sorted
    pub fn list_block_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn get_template(&self, block_type: &str) -> Option<BlockTemplate> {
        self.factories.get(block_type).map(|f| f.template())
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
