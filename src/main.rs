//! Thin CLI driver for manual exercise of the three cores (spec.md §1, §12
//! Non-goals: "a thin CLI driver for manual exercise, not a packaged
//! browser extension").

use std::path::PathBuf;
use std::sync::Arc;

use browser_agent::action::{ActionRegistry, Executor, FunctionRegistry};
use browser_agent::builtin_actions::register_builtin_actions;
use browser_agent::llm::{Gateway, ModelCatalog, ModelRegistry};
use browser_agent::trace::{TraceStore, Tracer};
use browser_agent::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "browser-agent", about = "Browser-side autonomous agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the names of the registered built-in actions.
    List,
    /// Run a named action with JSON input read from a file (or stdin if omitted).
    Run {
        action: String,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the resolved trace tree for a prior run.
    Trace { trace_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_agent=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    tracing::info!(db_path = %config.db_path, "starting browser-agent");

    let trace_store = Arc::new(TraceStore::open(&config.db_path, None)?);
    trace_store.sweep_retention()?;
    trace_store.spawn_retention_sweeper();
    let tracer = Tracer::new(trace_store);

    let mut action_registry = ActionRegistry::new();
    register_builtin_actions(&mut action_registry);
    let actions = Arc::new(action_registry);
    let functions = Arc::new(FunctionRegistry::new());

    match cli.command {
        Commands::List => {
            for name in actions.names() {
                println!("{name}");
            }
        }
        Commands::Run { action, input } => {
            let Some(def) = actions.get(&action) else {
                eprintln!("no such action: {action}");
                std::process::exit(1);
            };

            let input_json = match input {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => serde_json::from_reader(std::io::stdin())?,
            };

            let llm_registry = Arc::new(ModelRegistry::new(&config.llm));
            let catalog = ModelCatalog::load_from_file("llm_models.json").unwrap_or_else(|_| ModelCatalog::default_catalog());
            let gateway = Arc::new(Gateway::new(llm_registry, catalog));

            let executor = Executor::new(actions, functions, gateway, tracer.clone());
            let outcome = executor.execute_root(&def, input_json).await;
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
            if let Some(err) = outcome.error {
                eprintln!("action failed: {err}");
                std::process::exit(1);
            }
        }
        Commands::Trace { trace_id } => match tracer.store().tree(&trace_id)? {
            Some(node) => println!("{}", serde_json::to_string_pretty(&node)?),
            None => {
                eprintln!("no trace found for id {trace_id}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
