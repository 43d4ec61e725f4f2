use async_trait::async_trait;
use pullcore::{
    Block, BlockContext, BlockError, BlockFailure, BlockOutput, Node, OutcomeExt, OUTCOME_ERROR,
};
use pullruntime::{BlockFactory, BlockTemplate, FieldDefinition, OutStyle};
use serde_json::Value;

pub const FOREACH_TYPE: &str = "workflows_foreach";

/// Outcome whose branch is replayed once per item.
pub const LOOP_OUTCOME: &str = "loop";

/// Runs the `loop` branch once per element of `items`.
///
/// Each iteration sees `item` and `itemId` (the index for a list, the key
/// for a dictionary). The result has the shape of `items`: a list of
/// per-iteration return values in item order, or a dictionary with the
/// original keys.
pub struct ForEachBlock;

#[async_trait]
impl Block for ForEachBlock {
    async fn run(&self, ctx: &BlockContext<'_>) -> Result<BlockOutput, BlockFailure> {
        let result = run_items(ctx).await.or_outcome(OUTCOME_ERROR)?;
        Ok(BlockOutput::success().with_result(result))
    }
}

async fn run_items(ctx: &BlockContext<'_>) -> Result<Value, BlockError> {
    let items = ctx.get_field_json("items")?;
    let base = ctx.env();

    match items {
        Value::Array(items) => {
            let envs = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    base.extend([
                        ("itemId".to_string(), Value::from(index)),
                        ("item".to_string(), item),
                    ])
                })
                .collect();
            let results = ctx.run_branch_pool(LOOP_OUTCOME, envs).await?;
            Ok(Value::Array(results))
        }
        Value::Object(items) => {
            let (keys, envs): (Vec<String>, Vec<_>) = items
                .into_iter()
                .map(|(key, item)| {
                    let env = base.extend([
                        ("itemId".to_string(), Value::String(key.clone())),
                        ("item".to_string(), item),
                    ]);
                    (key, env)
                })
                .unzip();
            let results = ctx.run_branch_pool(LOOP_OUTCOME, envs).await?;
            Ok(Value::Object(keys.into_iter().zip(results).collect()))
        }
        other => Err(BlockError::Validation(format!(
            "Items must be a list or dictionary, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dictionary",
    }
}

pub struct ForEachBlockFactory;

impl BlockFactory for ForEachBlockFactory {
    fn create(&self, _node: &Node) -> Result<Box<dyn Block>, BlockError> {
        Ok(Box::new(ForEachBlock))
    }

    fn block_type(&self) -> &str {
        FOREACH_TYPE
    }

    fn template(&self) -> BlockTemplate {
        BlockTemplate::new("For-each loop", "Logic")
            .with_description("Executes a workflow repeatedly, based on the items provided.")
            .with_field(
                "items",
                FieldDefinition {
                    name: "Items".to_string(),
                    desc: "The item value will be passed in the execution environment and will be available at @{item}, its id at @{itemId}. You can use either a list or a dictionary.".to_string(),
                    default: Some("[]".to_string()),
                    init: Some(r#"["France", "Poland"]"#.to_string()),
                    field_type: "Object".to_string(),
                    control: Some("Textarea".to_string()),
                },
            )
            .with_out(
                LOOP_OUTCOME,
                "Loop",
                "Connect the branch that you'd like to loop. Whatever's plugged in here will be repeated once per item available.",
                OutStyle::Dynamic,
            )
            .with_default_outs()
    }
}
