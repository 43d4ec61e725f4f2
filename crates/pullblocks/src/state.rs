use async_trait::async_trait;
use pullcore::{
    Block, BlockContext, BlockError, BlockFailure, BlockOutput, Node, OutcomeExt, OUTCOME_ERROR,
};
use pullruntime::{BlockFactory, BlockTemplate, FieldDefinition};
use serde_json::Value;

pub const SET_STATE_TYPE: &str = "workflows_setstate";
pub const RETURN_VALUE_TYPE: &str = "workflows_returnvalue";

/// Writes `value` into application state at `element`.
pub struct SetStateBlock;

#[async_trait]
impl Block for SetStateBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        let value = set_state(ctx).or_outcome(OUTCOME_ERROR)?;
        Ok(BlockOutput::success().with_result(value))
    }
}

fn set_state(ctx: &BlockContext<'_>) -> Result<Value, BlockError> {
    let element = ctx.require_field("element")?;
    let value = match ctx.get_field("valueType")?.as_str() {
        "JSON" => ctx.get_field_json("value")?,
        _ => Value::String(ctx.get_field("value")?),
    };
    ctx.set_state(&element, value.clone())?;
    Ok(value)
}

/// Stops the enclosing run and returns `value`.
pub struct ReturnValueBlock;

#[async_trait]
impl Block for ReturnValueBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        // Structured if the field holds JSON, text otherwise.
        let value = match ctx.get_field_or("value", true, "null") {
            Ok(value) => value,
            Err(BlockError::Evaluation { .. }) => {
                Value::String(ctx.get_field("value").or_outcome(OUTCOME_ERROR)?)
            }
            Err(e) => return Err(BlockFailure::new(e).with_outcome(OUTCOME_ERROR)),
        };

        Ok(BlockOutput::success()
            .with_result(value.clone())
            .with_return_value(value))
    }
}

pub struct SetStateBlockFactory;

impl BlockFactory for SetStateBlockFactory {
    fn create(&self, _node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(SetStateBlock))
    }

    fn block_type(&self) -> &str {
        SET_STATE_TYPE
    }

    fn template(&self) -> BlockTemplate {
        BlockTemplate::new("Set state", "Other")
            .with_description("Set the value for a state element.")
            .with_field(
                "element",
                FieldDefinition {
                    name: "State element".to_string(),
                    field_type: "Binding".to_string(),
                    ..FieldDefinition::default()
                },
            )
            .with_field(
                "valueType",
                FieldDefinition {
                    name: "Value type".to_string(),
                    desc: "Either text or JSON.".to_string(),
                    default: Some("text".to_string()),
                    field_type: "Text".to_string(),
                    ..FieldDefinition::default()
                },
            )
            .with_field(
                "value",
                FieldDefinition {
                    name: "Value".to_string(),
                    field_type: "Text".to_string(),
                    control: Some("Textarea".to_string()),
                    ..FieldDefinition::default()
                },
            )
            .with_default_outs()
    }
}

pub struct ReturnValueBlockFactory;

impl BlockFactory for ReturnValueBlockFactory {
    fn create(&self, _node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(ReturnValueBlock))
    }

    fn block_type(&self) -> &str {
        RETURN_VALUE_TYPE
    }

    fn template(&self) -> BlockTemplate {
        BlockTemplate::new("Return value", "Other")
            .with_description("Returns a value from a workflow or sub-workflow.")
            .with_field(
                "value",
                FieldDefinition {
                    name: "Value".to_string(),
                    desc: "The value to return.".to_string(),
                    field_type: "Text".to_string(),
                    control: Some("Textarea".to_string()),
                    ..FieldDefinition::default()
                },
            )
            .with_default_outs()
    }
}
