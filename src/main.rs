//! # SourceDAC CLI (`dac`)
//!
//! The `dac` binary keeps a project's generated documentation and its
//! semantic index synchronized with the source tree, and answers retrieval
//! queries against it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dac init` | Scaffold `.dac/` and create the context store |
//! | `dac generate` | Analyze changed files and update docs and index |
//! | `dac generate --full` | Re-analyze everything, ignoring the snapshot |
//! | `dac query "<text>"` | Semantic search over the generated docs |
//! | `dac optimize "<instruction>"` | Enrich an instruction with retrieved context |
//! | `dac serve` | Start the JSON HTTP retrieval server |
//! | `dac dev` | Watch for changes and serve, in one process |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sourcedac::analysis::{run_full_analysis, run_incremental_analysis, AnalysisReport};
use sourcedac::config::{load_config, CONFIG_RELATIVE_PATH, CONFIG_TEMPLATE};
use sourcedac::context::AppContext;
use sourcedac::models::EnrichedInstruction;
use sourcedac::server::run_server;
use sourcedac::service::{answer_query, answer_optimize};
use sourcedac::watcher::Watcher;
use sourcedac::{db, migrate};

/// SourceDAC — documentation-as-context for source projects.
#[derive(Parser)]
#[command(
    name = "dac",
    about = "Keeps generated documentation and a semantic index synchronized with a source project",
    version
)]
struct Cli {
    /// Project root to operate on.
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold `.dac/` with a default config and create the context store.
    ///
    /// Idempotent: an existing config file is left untouched.
    Init,

    /// Analyze the project and update the docs and index.
    ///
    /// Only files whose content changed since the last run are processed;
    /// failed files are retried on the next run.
    Generate {
        /// Ignore the snapshot and re-analyze every file.
        #[arg(long)]
        full: bool,
    },

    /// Semantic search over the generated documentation.
    Query {
        /// The query text.
        text: String,

        /// Number of results to return (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Enrich an instruction with retrieved project context and print the
    /// resulting prompt.
    Optimize {
        /// The instruction to enrich.
        instruction: String,
    },

    /// Start the JSON HTTP retrieval server.
    Serve,

    /// Development mode: analyze once, then watch for changes and serve.
    Dev,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sourcedac=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            run_init(&cli.project_root).await?;
        }
        Commands::Generate { full } => {
            let ctx = AppContext::initialize(&cli.project_root).await?;
            let report = if full {
                run_full_analysis(&ctx).await?
            } else {
                run_incremental_analysis(&ctx).await?
            };
            print_report(&report);
        }
        Commands::Query { text, k } => {
            let ctx = AppContext::initialize(&cli.project_root).await?;
            let results = answer_query(&ctx, &text, k).await?;
            print_results(&results);
        }
        Commands::Optimize { instruction } => {
            let ctx = AppContext::initialize(&cli.project_root).await?;
            let enriched = answer_optimize(&ctx, &instruction).await?;
            print_enriched(&enriched);
        }
        Commands::Serve => {
            let ctx = Arc::new(AppContext::initialize(&cli.project_root).await?);
            run_server(ctx).await?;
        }
        Commands::Dev => {
            run_dev(&cli.project_root).await?;
        }
    }

    Ok(())
}

/// Create `.dac/`, write the default config if none exists, and initialize
/// the context store.
async fn run_init(project_root: &Path) -> Result<()> {
    let config_path = project_root.join(CONFIG_RELATIVE_PATH);
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, CONFIG_TEMPLATE)?;
        println!("Wrote {}", config_path.display());
    }

    let config = load_config(project_root)?;
    let pool = db::connect(&project_root.join(&config.index.dir)).await?;
    migrate::run_migrations(&pool).await?;
    println!("Context store initialized.");
    println!("Next: run `dac generate` to analyze the project.");
    Ok(())
}

/// Analyze once, then run the watcher and server until Ctrl-C.
async fn run_dev(project_root: &Path) -> Result<()> {
    let ctx = Arc::new(AppContext::initialize(project_root).await?);

    let report = run_incremental_analysis(&ctx).await?;
    print_report(&report);

    let watcher = Watcher::start(ctx.clone())?;

    tokio::select! {
        result = run_server(ctx) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down.");
        }
    }

    watcher.stop().await?;
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    if !report.outcomes.is_empty() {
        println!("{:<50} {:<8} {:>6}", "PATH", "STATUS", "CHUNKS");
        for outcome in &report.outcomes {
            println!(
                "{:<50} {:<8} {:>6}",
                outcome.path,
                outcome.status.as_str(),
                outcome.chunks
            );
            if let Some(error) = &outcome.error {
                println!("    {}", error);
            }
        }
        println!();
    }
    println!(
        "Indexed {}, failed {}, removed {}, unchanged {}.",
        report.indexed(),
        report.failed(),
        report.removed(),
        report.unchanged
    );
    if !report.architecture_updated && !report.outcomes.is_empty() {
        println!("Architecture overview was not updated; see the log for details.");
    }
}

fn print_results(results: &[sourcedac::models::ScoredChunk]) {
    if results.is_empty() {
        println!("No results. Has `dac generate` been run?");
        return;
    }
    for (i, hit) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.artifact_id,
            hit.source_paths.join(", ")
        );
        let snippet: String = hit.text.chars().take(200).collect();
        for line in snippet.lines() {
            println!("   {}", line);
        }
        println!();
    }
}

fn print_enriched(enriched: &EnrichedInstruction) {
    println!("{}", enriched.prompt);
    if enriched.truncated {
        eprintln!("(context truncated to fit the configured budget)");
    }
}
