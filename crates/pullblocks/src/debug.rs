use async_trait::async_trait;
use pullcore::{Block, BlockContext, BlockError, BlockFailure, BlockOutput, Node, OutcomeExt};
use pullruntime::{BlockFactory, BlockTemplate, FieldDefinition};

pub const LOG_MESSAGE_TYPE: &str = "workflows_logmessage";

/// Writes a message to the application log
pub struct LogMessageBlock;

#[async_trait]
impl Block for LogMessageBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        let level = ctx.get_field("type").or_outcome(pullcore::OUTCOME_ERROR)?;
        let message = ctx.get_field("message").or_outcome(pullcore::OUTCOME_ERROR)?;
        let node_id = &ctx.node().id;

        match level.as_str() {
            "error" => tracing::error!(node = %node_id, "{}", message),
            "warning" => tracing::warn!(node = %node_id, "{}", message),
            "debug" => tracing::debug!(node = %node_id, "{}", message),
            _ => tracing::info!(node = %node_id, "{}", message),
        }

        Ok(BlockOutput::success().with_result(message))
    }
}

pub struct LogMessageBlockFactory;

impl BlockFactory for LogMessageBlockFactory {
    fn create(&self, _node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(LogMessageBlock))
    }

    fn block_type(&self) -> &str {
        LOG_MESSAGE_TYPE
    }

    fn template(&self) -> BlockTemplate {
        BlockTemplate::new("Log message", "Other")
            .with_description("Adds a message to the application log.")
            .with_field(
                "type",
                FieldDefinition {
                    name: "Type".to_string(),
                    desc: "One of info, warning, error or debug.".to_string(),
                    default: Some("info".to_string()),
                    field_type: "Text".to_string(),
                    ..FieldDefinition::default()
                },
            )
            .with_field(
                "message",
                FieldDefinition {
                    name: "Message".to_string(),
                    field_type: "Text".to_string(),
                    control: Some("Textarea".to_string()),
                    ..FieldDefinition::default()
                },
            )
            .with_default_outs()
    }
}
