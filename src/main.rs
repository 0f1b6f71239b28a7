use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glimpse::capture::source::ScreenSource;
use glimpse::capture::{CaptureEngine, CaptureScheduler, CycleOutcome};
use glimpse::context::matcher::MatcherPool;
use glimpse::context::types::TaskStatus;
use glimpse::pipeline::Embedder;
use glimpse::{cli, config};

#[derive(Parser)]
#[command(name = "glimpse", version, about = "Screen context engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the continuous capture loop until interrupted
    Run,
    /// Take a single capture now
    Capture,
    /// Record a description for a capture, embed it, and match it to tasks
    Describe {
        capture_id: String,
        description: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Search captures by text
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Resurface relevant past captures
    Resurface {
        /// Describe what you are working on; omitted = recent captures
        query: Option<String>,
        /// Only consider captures from the last N days
        #[arg(long)]
        window_days: Option<f64>,
    },
    /// Embed the backlog of analyzed-but-unembedded captures
    EmbedPending,
    /// Show capture statistics
    Stats,
    /// Manage tasks used for activity matching
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task and embed it for matching
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List tasks with their tracked activity
    List,
    /// Mark a task done (it stops matching)
    Done { task_id: String },
    /// Archive a task
    Archive { task_id: String },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.glimpse/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = config::GlimpseConfig::load()?;

    // Log to stderr so stdout stays clean for command output
    let filter = EnvFilter::try_new(&config.service.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Run => run_loop(&config).await?,
        Command::Capture => capture_once(&config)?,
        Command::Describe {
            capture_id,
            description,
            tags,
        } => describe(&config, &capture_id, &description, &tags)?,
        Command::Search { query, limit } => cli::search::search(&config, &query, limit)?,
        Command::Resurface { query, window_days } => {
            cli::resurface::resurface(&config, query.as_deref(), window_days)?
        }
        Command::EmbedPending => embed_pending(&config)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Task { action } => match action {
            TaskAction::Add { title, description } => {
                cli::tasks::add(&config, &title, description.as_deref())?
            }
            TaskAction::List => cli::tasks::list(&config)?,
            TaskAction::Done { task_id } => {
                cli::tasks::set_status(&config, &task_id, TaskStatus::Done)?
            }
            TaskAction::Archive { task_id } => {
                cli::tasks::set_status(&config, &task_id, TaskStatus::Archived)?
            }
        },
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}

fn build_engine(
    config: &config::GlimpseConfig,
    matcher: Option<Arc<MatcherPool>>,
) -> Result<CaptureEngine> {
    let conn = glimpse::db::open_database(config.resolved_db_path())?;
    let embedder = Embedder::from_config(&config.embedding);
    CaptureEngine::new(
        conn,
        Box::new(ScreenSource::new()),
        None,
        embedder,
        matcher,
        config.capture.clone(),
        config.storage.clone(),
    )
}

async fn run_loop(config: &config::GlimpseConfig) -> Result<()> {
    let embedder = Embedder::from_config(&config.embedding);
    let matcher = Arc::new(MatcherPool::new(
        config.resolved_db_path(),
        embedder.provider(),
        config.matching.clone(),
    ));

    let engine = build_engine(config, Some(Arc::clone(&matcher)))?;
    let scheduler = CaptureScheduler::start(engine);
    println!("Capturing {} — Ctrl-C to stop.", scheduler.interval_description());

    tokio::signal::ctrl_c().await?;

    let status = scheduler.status();
    if !scheduler.stop() {
        tracing::warn!("capture loop still busy, exiting anyway");
    }
    println!(
        "Stopped after {} cycle(s): {} stored, {} duplicate(s), {} failure(s).",
        status.cycles, status.stored, status.duplicates, status.failures
    );
    Ok(())
}

fn capture_once(config: &config::GlimpseConfig) -> Result<()> {
    let mut engine = build_engine(config, None)?;
    match engine.run_cycle()? {
        CycleOutcome::Stored { capture_id, path } => {
            println!("Captured {} -> {}", capture_id, path.display());
        }
        CycleOutcome::Duplicate { distance } => {
            println!("Frame dropped: near-duplicate ({distance} bit(s) from an existing capture).");
        }
    }
    Ok(())
}

fn describe(
    config: &config::GlimpseConfig,
    capture_id: &str,
    description: &str,
    tags: &str,
) -> Result<()> {
    let mut conn = glimpse::db::open_database(config.resolved_db_path())?;
    let embedder = Embedder::from_config(&config.embedding);

    if !glimpse::context::store::update_analysis(&conn, capture_id, description, tags)? {
        anyhow::bail!("capture not found: {capture_id}");
    }
    let capture = glimpse::context::store::get_capture(&conn, capture_id)?
        .ok_or_else(|| anyhow::anyhow!("capture not found: {capture_id}"))?;

    let embedded = glimpse::pipeline::embed_and_index(&mut conn, &embedder, &capture)?;
    let provider = embedder.provider();
    let links = glimpse::context::matcher::match_capture(
        &mut conn,
        provider.as_deref(),
        capture_id,
        &config.matching,
    )?;

    println!(
        "Description recorded ({}embedded), {} task link(s).",
        if embedded { "" } else { "not " },
        links.len()
    );
    for link in links {
        println!(
            "  -> task {} (confidence {:.3}, {})",
            link.task_id, link.confidence, link.method
        );
    }
    Ok(())
}

fn embed_pending(config: &config::GlimpseConfig) -> Result<()> {
    let mut conn = glimpse::db::open_database(config.resolved_db_path())?;
    let embedder = Embedder::from_config(&config.embedding);

    let stats =
        glimpse::pipeline::embed_pending(&mut conn, &embedder, config.embedding.batch_size)?;
    println!("Embedded {} capture(s), {} failed.", stats.processed, stats.failed);
    Ok(())
}
