use async_trait::async_trait;
use pullcore::{
    Block, BlockContext, BlockError, BlockFailure, BlockOutput, Node, OutcomeExt, OUTCOME_ERROR,
};
use pullruntime::{BlockFactory, BlockTemplate, FieldDefinition};
use serde_json::Value;

pub const PARSE_JSON_TYPE: &str = "workflows_parsejson";

/// Parse a JSON string into a structured result
pub struct ParseJsonBlock;

#[async_trait]
impl Block for ParseJsonBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        let text = ctx.get_field("plainText").or_outcome(OUTCOME_ERROR)?;

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| BlockError::ExecutionFailed(format!("JSON parse error: {}", e)))
            .or_outcome(OUTCOME_ERROR)?;

        Ok(BlockOutput::success().with_result(parsed))
    }
}

pub struct ParseJsonBlockFactory;

impl BlockFactory for ParseJsonBlockFactory {
    fn create(&self, _node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(ParseJsonBlock))
    }

    fn block_type(&self) -> &str {
        PARSE_JSON_TYPE
    }

    fn template(&self) -> BlockTemplate {
        BlockTemplate::new("Parse JSON", "Other")
            .with_description("Parses a JSON string.")
            .with_field(
                "plainText",
                FieldDefinition {
                    name: "Plain text".to_string(),
                    field_type: "Text".to_string(),
                    control: Some("Textarea".to_string()),
                    ..FieldDefinition::default()
                },
            )
            .with_default_outs()
    }
}
