// crates/pullcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pullcore::{
    ComponentTree, ExecutionEnvironment, GraphAccessor, LogBus, LogSeverity, Node,
    StateEvaluator, WORKFLOW_TYPE,
};
use pullruntime::{BlockRegistry, RunnerConfig, WorkflowRunner};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pull")]
#[command(about = "Pull-based workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow from a component tree file
    Run {
        /// Path to the workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Id of the workflow component to run
        #[arg(short, long, conflicts_with = "key")]
        workflow: Option<String>,

        /// Key of the workflow component to run
        #[arg(short, long)]
        key: Option<String>,

        /// Execution environment as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Initial application state as a JSON object
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum concurrent for-each iterations
        #[arg(long)]
        workers: Option<usize>,

        /// Do not emit an execution log entry
        #[arg(long)]
        no_log: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to the workflow JSON file
        file: PathBuf,

        /// Id of the workflow component to check (default: every workflow)
        #[arg(short, long)]
        workflow: Option<String>,
    },

    /// List available block types
    Blocks {
        /// Print the editor templates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            workflow,
            key,
            input,
            state,
            workers,
            no_log,
            verbose,
        } => {
            init_tracing(verbose);

            let mut config = RunnerConfig::default().with_execution_log(!no_log);
            if let Some(workers) = workers {
                config = config.with_max_pool_workers(workers);
            }
            let target = match (workflow, key) {
                (Some(id), _) => Target::Id(id),
                (None, Some(key)) => Target::Key(key),
                (None, None) => Target::Key("main".to_string()),
            };

            run_workflow(file, target, input, state, config).await?;
        }

        Commands::Validate { file, workflow } => {
            validate(file, workflow)?;
        }

        Commands::Blocks { json } => {
            list_blocks(json)?;
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

enum Target {
    Id(String),
    Key(String),
}

fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    pullblocks::register_all(&mut registry);
    registry
}

fn load_tree(file: &PathBuf) -> Result<ComponentTree> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    Ok(ComponentTree::from_json(&json)?)
}

fn parse_object(label: &str, json: Option<String>) -> Result<Map<String, Value>> {
    match json {
        None => Ok(Map::new()),
        Some(text) => match serde_json::from_str(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow::anyhow!("{} must be a JSON object", label)),
        },
    }
}

async fn run_workflow(
    file: PathBuf,
    target: Target,
    input: Option<String>,
    state: Option<String>,
    config: RunnerConfig,
) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let tree = Arc::new(load_tree(&file)?);
    tracing::debug!(components = tree.len(), "loaded component tree");
    let env = ExecutionEnvironment::from(parse_object("Input", input)?);
    let evaluator = Arc::new(StateEvaluator::with_state(
        tree.clone(),
        parse_object("State", state)?,
    ));

    let log_bus = Arc::new(LogBus::new(16));
    let mut entries = log_bus.subscribe();

    let runner = WorkflowRunner::new(Arc::new(registry()), tree.clone(), evaluator.clone())
        .with_config(config)
        .with_log_sink(log_bus);

    let result = match &target {
        Target::Id(id) => runner.run_workflow(id, env).await,
        Target::Key(key) => runner.run_workflow_by_key(key, env).await,
    };

    while let Ok(entry) = entries.try_recv() {
        let marker = match entry.severity {
            LogSeverity::Info => "ok",
            LogSeverity::Error => "FAILED",
        };
        println!();
        println!("{} [{}] run {}", entry.title, marker, entry.run_id);
        for item in &entry.summary {
            println!(
                "  {:<20} {:<10} {:.3}s  {}",
                item.component_id,
                item.outcome.as_deref().unwrap_or("-"),
                item.execution_time_in_seconds,
                item.result
            );
        }
    }

    let return_value = result?;
    println!();
    match return_value {
        Some(value) => println!("Return value: {}", serde_json::to_string_pretty(&value)?),
        None => println!("No return value"),
    }
    println!("State: {}", serde_json::to_string_pretty(&evaluator.state())?);

    Ok(())
}

fn validate(file: PathBuf, workflow: Option<String>) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let tree = load_tree(&file)?;
    let registry = registry();

    let roots: Vec<String> = match workflow {
        Some(id) => vec![id],
        None => tree
            .iter()
            .filter(|n| n.node_type == WORKFLOW_TYPE)
            .map(|n| n.id.clone())
            .collect(),
    };
    if roots.is_empty() {
        anyhow::bail!("no workflow components found");
    }

    for root in roots {
        let summary = pullruntime::validate_workflow(&tree, &registry, &root)?;
        let key = tree
            .get_component(&root)
            .and_then(|n| n.content.get("key").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        println!("Workflow {} (key \"{}\") is valid:", root, key);
        println!("   Nodes: {}", summary.nodes);
        println!("   Edges: {}", summary.edges);
        println!("   Order: {}", summary.order.join(" -> "));
    }

    Ok(())
}

fn list_blocks(json: bool) -> Result<()> {
    let registry = registry();

    if json {
        let templates: Map<String, Value> = registry
            .list_block_types()
            .into_iter()
            .filter_map(|t| {
                let template = registry.get_template(&t)?;
                Some(serde_json::to_value(template).map(|v| (t, v)))
            })
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    println!("Available block types:");
    println!();
    for block_type in registry.list_block_types() {
        if let Some(template) = registry.get_template(&block_type) {
            println!("  - {} ({}, {})", block_type, template.name, template.category);
            println!("    {}", template.description);
            let outs: Vec<_> = template.out_labels().collect();
            println!("    outs: {}", outs.join(", "));
        } else {
            println!("  - {}", block_type);
        }
    }

    Ok(())
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut tree = ComponentTree::new();
    tree.add(Node::new("wf", WORKFLOW_TYPE).with_content("key", "main"));
    tree.add(
        Node::new("countries", pullblocks::FOREACH_TYPE)
            .with_parent("wf")
            .with_content("items", r#"["France", "Poland"]"#)
            .with_out(pullblocks::LOOP_OUTCOME, "greet")
            .with_out("success", "done")
            .with_out("error", "report"),
    );
    tree.add(
        Node::new("greet", pullblocks::RETURN_VALUE_TYPE)
            .with_parent("wf")
            .with_content("value", "Hello, @{item}!"),
    );
    tree.add(
        Node::new("done", pullblocks::RETURN_VALUE_TYPE)
            .with_parent("wf")
            .with_content("value", "@{result}"),
    );
    tree.add(
        Node::new("report", pullblocks::LOG_MESSAGE_TYPE)
            .with_parent("wf")
            .with_content("type", "error")
            .with_content("message", "Loop failed: @{result}"),
    );

    let json = serde_json::to_string_pretty(&tree.to_document())?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  pull run --file {} --key main", output.display());

    Ok(())
}
