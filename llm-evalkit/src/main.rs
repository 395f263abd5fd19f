//! llm-evalkit CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use llm_evalkit::{
    benchmarks,
    config::TaskConfig,
    reporting::print_console_report,
    runner::{ConsoleProgress, Runner},
};

#[derive(Parser)]
#[command(name = "llm-evalkit")]
#[command(about = "Evaluate language models against registered benchmarks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Task configuration file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation task
    Run(RunArgs),

    /// List registered benchmarks
    List,

    /// Generate sample task configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "configs/task.yaml")]
        output: PathBuf,
    },
}

/// Flags override values from the config file.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Model id served by the endpoint
    #[arg(short, long)]
    model: Option<String>,

    /// Comma-separated benchmark names
    #[arg(short, long, value_delimiter = ',')]
    datasets: Option<Vec<String>>,

    /// Evaluate at most this many examples per subset
    #[arg(long)]
    limit: Option<usize>,

    /// Per-benchmark overrides as JSON, e.g. '{"gsm8k": {"few_shot_num": 0}}'
    #[arg(long)]
    dataset_args: Option<String>,

    /// Generation overrides, e.g. 'do_sample=true,temperature=0.7'
    #[arg(long)]
    generation_config: Option<String>,

    /// Root directory for outputs
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Resume from an existing work directory
    #[arg(long)]
    use_cache: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Replace the model with a deterministic stub
    #[arg(long)]
    dry_run: bool,

    /// Log per-example predictions
    #[arg(long)]
    debug: bool,

    /// Native, OpenCompass, VLMEvalKit, RAGEval or ThirdParty
    #[arg(long)]
    eval_backend: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let debug = cli.verbose || matches!(&cli.command, Commands::Run(args) if args.debug);
    let filter = if debug {
        EnvFilter::new("llm_evalkit=debug,info")
    } else {
        EnvFilter::new("llm_evalkit=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run(args) => {
            run_eval(cli.config, args).await?;
        }

        Commands::List => {
            list_benchmarks();
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run_eval(
    config_path: Option<PathBuf>,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => TaskConfig::from_file(path)?,
        None => TaskConfig::default(),
    };

    let patch = build_patch(&config, &args)?;
    config.update(Value::Object(patch))?;
    if let Some(url) = args.api_url {
        config.model_args.api_url = Some(url);
    }

    let runner = Runner::new().with_progress(Arc::new(ConsoleProgress));
    let output = runner.run_task(config).await?;

    for results in output.into_vec() {
        print_console_report(&results);
    }

    Ok(())
}

/// Translate flags into a config patch. Nested maps are merged into the
/// current values instead of replacing them.
fn build_patch(
    config: &TaskConfig,
    args: &RunArgs,
) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let current = config.to_dict();
    let mut patch = Map::new();

    if let Some(model) = &args.model {
        patch.insert("model".to_string(), Value::String(model.clone()));
    }
    if let Some(datasets) = &args.datasets {
        patch.insert("datasets".to_string(), serde_json::to_value(datasets)?);
    }
    if let Some(limit) = args.limit {
        patch.insert("limit".to_string(), limit.into());
    }
    if let Some(raw) = &args.dataset_args {
        let overrides: Map<String, Value> = serde_json::from_str(raw)?;
        patch.insert(
            "dataset_args".to_string(),
            merged(&current["dataset_args"], overrides),
        );
    }
    if let Some(raw) = &args.generation_config {
        patch.insert(
            "generation_config".to_string(),
            merged(&current["generation_config"], parse_key_values(raw)?),
        );
    }
    if let Some(work_dir) = &args.work_dir {
        patch.insert("work_dir".to_string(), serde_json::to_value(work_dir)?);
    }
    if let Some(use_cache) = &args.use_cache {
        patch.insert("use_cache".to_string(), serde_json::to_value(use_cache)?);
    }
    if let Some(seed) = args.seed {
        patch.insert("seed".to_string(), seed.into());
    }
    if args.dry_run {
        patch.insert("dry_run".to_string(), Value::Bool(true));
    }
    if args.debug {
        patch.insert("debug".to_string(), Value::Bool(true));
    }
    if let Some(backend) = &args.eval_backend {
        patch.insert("eval_backend".to_string(), Value::String(backend.clone()));
    }

    Ok(patch)
}

fn merged(current: &Value, overrides: Map<String, Value>) -> Value {
    let mut base = current.as_object().cloned().unwrap_or_default();
    base.extend(overrides);
    Value::Object(base)
}

/// Parse `k=v,k2=v2`; values are read as JSON when possible, else as strings.
fn parse_key_values(raw: &str) -> Result<Map<String, Value>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got `{}`", pair))?;
            let value = value.trim();
            let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.trim().to_string(), parsed))
        })
        .collect()
}

fn list_benchmarks() {
    let registry = benchmarks::snapshot();
    let names = registry.list();

    println!("Registered Benchmarks ({}):", names.len());
    println!("{:-<60}", "");

    for name in &names {
        if let Some(entry) = registry.resolve(name) {
            let metrics: Vec<&str> = entry.metric_list.iter().map(|m| m.as_str()).collect();
            println!(
                "  {} | {} | subsets: {} | metrics: {} | few-shot: {}",
                entry.name,
                entry.dataset_id,
                entry.subset_list.join(", "),
                metrics.join(", "),
                entry.few_shot_num
            );
        }
    }
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = TaskConfig::new("qwen/Qwen2-0.5B-Instruct", &["gsm8k", "arc"]).with_limit(10);

    config.dump_yaml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
