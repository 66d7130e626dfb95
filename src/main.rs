//! Pagesweep main entry point
//!
//! This is the command-line interface for the Pagesweep profile harvester.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use pagesweep::config::{load_config_with_hash, Config};
use pagesweep::crawler::{seed_tasks, Coordinator, PhaseContext};
use pagesweep::output::{
    export_dataset, generate_summary, load_statistics, print_statistics, JsonlSink, RunSummary,
};
use pagesweep::storage::{open_storage, share};
use pagesweep::surface::HttpSurfacePool;
use pagesweep::EntityStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pagesweep: an incremental profile harvester
///
/// Pagesweep visits the profile, posts, about, reviews and services views of
/// every entity reachable from the start URLs, merges them into one record per
/// entity, and writes the records to a JSON lines dataset. Progress is
/// checkpointed so an interrupted run resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "pagesweep")]
#[command(version = "1.0.0")]
#[command(about = "An incremental profile harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh run, ignoring the checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the tasks the start URLs expand to
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write the dataset from the checkpoint without harvesting
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export {
        handle_export(&config)
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pagesweep=info,warn"),
            1 => EnvFilter::new("pagesweep=debug,info"),
            2 => EnvFilter::new("pagesweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the seeded tasks
fn handle_dry_run(config: &Config) -> Result<()> {
    let context = PhaseContext::from_config(config)?;

    println!("=== Pagesweep Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrency: {}", config.crawler.max_concurrency);
    println!("  Max request retries: {}", config.crawler.max_request_retries);
    println!("  Idle timeout: {}s", config.crawler.idle_timeout_secs);
    println!("  Persist interval: {}s", config.crawler.persist_interval_secs);

    println!("\nInput:");
    println!("  Max posts: {} (since {:?})", context.posts.cap, context.posts.cutoff.min());
    println!("  Max reviews: {} (since {:?})", context.reviews.cap, context.reviews.cutoff.min());
    println!(
        "  Max comments per post: {} ({})",
        context.comments.cap, context.comments_mode
    );
    println!("  Language: {}", context.language);

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Dataset: {}", config.output.dataset_path);

    let (tasks, skipped) = seed_tasks(&config.input.start_urls, &context.sections);

    println!("\nSeed Tasks ({}):", tasks.len());
    for task in &tasks {
        match task.section {
            Some(section) => println!("  - [{} {}] {}", task.label, section, task.url),
            None => println!("  - [{}] {}", task.label, task.url),
        }
    }

    if !skipped.is_empty() {
        println!("\nSkipped Start URLs ({}):", skipped.len());
        for url in &skipped {
            println!("  - {}", url);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start with {} tasks", tasks.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint
fn handle_stats(config: &Config) -> Result<()> {
    println!("Checkpoint: {}\n", config.output.checkpoint_path);

    let storage = share(open_storage(Path::new(&config.output.checkpoint_path))?);
    let store = EntityStore::open(storage.clone())?;

    let stats = {
        let guard = storage
            .lock()
            .map_err(|_| anyhow::anyhow!("Checkpoint storage lock poisoned"))?;
        load_statistics(&*guard, &store)?
    };

    print_statistics(&stats);
    Ok(())
}

/// Handles the --export mode: sweeps the checkpoint into the dataset
fn handle_export(config: &Config) -> Result<()> {
    println!("=== Exporting Dataset ===\n");
    println!("Checkpoint: {}", config.output.checkpoint_path);
    println!("Dataset: {}\n", config.output.dataset_path);

    let storage = share(open_storage(Path::new(&config.output.checkpoint_path))?);
    let store = EntityStore::open(storage)?;

    let sink = JsonlSink::create(Path::new(&config.output.dataset_path))?;
    let written = export_dataset(&store, &sink, Utc::now())?;

    println!("✓ Exported {} entities to: {}", written, config.output.dataset_path);
    Ok(())
}

/// Handles the main harvesting run
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh run (ignoring checkpoint)");
    } else {
        tracing::info!("Starting run (will resume from checkpoint if present)");
    }

    tracing::info!("Start URLs: {}", config.input.start_urls.len());

    let checkpoint = config.output.checkpoint_path.clone();
    let dataset = config.output.dataset_path.clone();

    let storage = share(open_storage(Path::new(&checkpoint))?);
    let pool = HttpSurfacePool::new(
        config.user_agent.clone(),
        Duration::from_secs(config.crawler.navigation_timeout_secs),
    )?;

    let mut coordinator = Coordinator::new(config, config_hash, storage.clone(), pool, fresh)?;
    let report = match coordinator.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            return Err(e.into());
        }
    };

    let store = coordinator.store();
    let sink = JsonlSink::create(Path::new(&dataset))?;
    export_dataset(&store, &sink, Utc::now())?;

    if report.dropped > 0 {
        tracing::warn!("{} tasks were dropped; rerun to retry them", report.dropped);
    }

    let summary = {
        let guard = storage
            .lock()
            .map_err(|_| anyhow::anyhow!("Checkpoint storage lock poisoned"))?;
        generate_summary(&*guard, &store)?
    };
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Run {} ({}) ===", summary.run_id, summary.status);
    if let Some(seconds) = summary.duration_seconds {
        println!("  Duration: {}s", seconds);
    }
    println!("  Completed: {}", summary.tasks_completed);
    println!("  Soft-failed: {}", summary.tasks_soft_failed);
    println!("  Skipped: {}", summary.tasks_skipped);
    println!("  Not found: {}", summary.tasks_not_found);
    println!("  Dropped: {}", summary.tasks_dropped);
    println!(
        "  Entities: {} ({} exported)",
        summary.entities, summary.exported
    );
    println!("  Success rate: {:.1}%", summary.success_rate());
}
