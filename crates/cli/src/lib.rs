use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use lazytree_core::{StaticTreeSource, Tree, TreeEngine, TreeSource, TreeState};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod render;
pub mod script;

use config::{FileConfig, Settings};
use render::Payload;
use script::Step;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "lazytree")]
#[command(about = "Drive a lazily loaded tree from a static tree file", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a tree file, apply steps and print the settled tree
    Show(ShowArgs),

    /// Validate a tree file
    Check(CheckArgs),
}

#[derive(Args)]
struct ShowArgs {
    /// JSON file with an array of `{"id": ..., "children": [...]}` nodes
    tree: PathBuf,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delay before slow children loads show as loading (overrides config and env)
    #[arg(long)]
    loading_transition_ms: Option<u64>,

    /// Artificial latency of every source call
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Node to make active before any step runs
    #[arg(short, long)]
    active: Option<String>,

    /// Step to apply, in order: expand:<id>, collapse:<id>, toggle:<id>, activate:<id>,
    /// deactivate, expand-many:<id,..>, collapse-many:<id,..>, retry:<fetch key>
    #[arg(short, long = "step")]
    steps: Vec<Step>,

    /// Output the published tree as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckArgs {
    tree: PathBuf,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Show(args) => run_show(args).await,
        Commands::Check(args) => run_check(&args.tree),
    }
}

pub fn load_tree_file(path: &Path) -> Result<StaticTreeSource<Payload>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree file {}", path.display()))?;
    StaticTreeSource::from_json(&raw)
        .with_context(|| format!("Invalid tree file {}", path.display()))
}

fn run_check(path: &Path) -> Result<()> {
    let source = load_tree_file(path)?;
    print_stdout(&format!("{}: {} nodes", path.display(), source.len()))
}

async fn run_show(args: ShowArgs) -> Result<()> {
    let file = args.config.as_deref().map(FileConfig::from_file).transpose()?;
    let settings = Settings::resolve(file, args.loading_transition_ms)?;
    let source = load_tree_file(&args.tree)?.with_latency(Duration::from_millis(args.latency_ms));
    log::info!(
        "Loaded {} nodes from {}",
        source.len(),
        args.tree.display()
    );

    let state = TreeState {
        active_id: args.active,
        ..TreeState::default()
    };
    let tree = drive(Arc::new(source), state, settings, &args.steps).await?;

    let out = if args.json {
        serde_json::to_string_pretty(tree.as_ref())?
    } else {
        render::render_text(&tree)
    };
    print_stdout(&out)
}

/// Start an engine, apply `steps` one after another and return the settled tree.
pub async fn drive(
    source: Arc<dyn TreeSource<Payload>>,
    state: TreeState,
    settings: Settings,
    steps: &[Step],
) -> Result<Arc<Tree<Payload>>> {
    let engine = TreeEngine::start(source, state, settings.loader)?;
    let controller = engine.controller();

    let settle = async {
        // Settle between steps so toggles see the tree the previous step produced.
        engine.settled().await?;
        for step in steps {
            log::debug!("Applying step {step}");
            step.apply(&controller)?;
            controller.flush().await?;
            engine.settled().await?;
        }
        anyhow::Ok(engine.snapshot())
    };
    tokio::time::timeout(settings.settle_timeout, settle)
        .await
        .with_context(|| {
            format!(
                "Tree did not settle within {} ms",
                settings.settle_timeout.as_millis()
            )
        })?
}
