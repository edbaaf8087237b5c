use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use flowgraph_rs::automation::{
    build_workflow, DispatchEngine, EngineConfig, NodeTypeRegistry, Workflow, WorkflowLoader,
};
use flowgraph_rs::flow::DispatchContext;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the graph of a workflow fixture
    Show {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Print node ids instead of labels
        #[arg(long)]
        raw: bool,
    },
    /// Validate a workflow fixture
    Check {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,
    },
    /// Dispatch a workflow fixture
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Event payload as JSON
        #[arg(short, long)]
        payload: Option<String>,

        /// Stop after the node with this label
        #[arg(short, long)]
        until: Option<String>,
    },
}

async fn load(registry: &NodeTypeRegistry, file: &str) -> anyhow::Result<Workflow> {
    let fixture = WorkflowLoader::new()
        .load_workflow(file)
        .with_context(|| format!("Failed to load {}", file))?;
    Ok(build_workflow(registry, fixture).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = EngineConfig::from_env()?;
    let registry = NodeTypeRegistry::with_builtin_types().await;

    match args.command {
        Commands::Show { file, raw } => {
            let workflow = load(&registry, &file).await?;
            let graph = if raw {
                workflow.graph().to_blob()
            } else {
                workflow.labeled_graph()?
            };
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Check { file } => {
            let workflow = load(&registry, &file).await?;
            config
                .persistence()
                .save_graph(workflow.id(), &workflow.graph().to_blob())?;
            println!(
                "Workflow {} ({}) is valid: {} nodes",
                workflow.id(),
                workflow.name(),
                workflow.node_count()
            );
        }
        Commands::Run {
            file,
            payload,
            until,
        } => {
            let mut workflow = load(&registry, &file).await?;
            if let Some(label) = until {
                let node = workflow
                    .find_by_label(&label)
                    .map(|node| node.id)
                    .with_context(|| format!("No node labeled '{}'", label))?;
                workflow.set_simulate_until_node(Some(node))?;
            }

            let payload: Value = match payload {
                Some(raw) => serde_json::from_str(&raw).context("Invalid payload")?,
                None => Value::Null,
            };

            println!("Running workflow: {}", workflow.name());
            let context = DispatchEngine::new()
                .run_workflow(&workflow, DispatchContext::new(payload))
                .await?;

            for record in context.history() {
                let label = workflow
                    .node(record.node_id)
                    .map(|node| node.display_label().to_string())
                    .unwrap_or_default();
                println!(
                    "{} {:?} -> {} (output '{}')",
                    label, record.iterations, record.result.data, record.result.output_uid
                );
            }
        }
    }

    Ok(())
}
