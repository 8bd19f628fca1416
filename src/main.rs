//! tile-reconciler - Partition reconciliation for tiled token-range replication
//!
//! Keeps a durable per-tile ledger of synchronized partitions in step with
//! a source database, coordinating through a shared discovery cache.

use clap::Parser;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tile_reconciler::cache::{
    read_counter, total_chunks_key, DiscoveryCache, RedisCacheConfig, RedisDiscoveryCache,
};
use tile_reconciler::config::{CliArgs, Command, ReconcilerConfig};
use tile_reconciler::discovery::{PartitionDiscoveryTask, RunProgress};
use tile_reconciler::ledger::{ledger_path, LedgerStore, RocksLedger};
use tile_reconciler::source::load_fixture;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tile_reconciler=info".parse().unwrap()),
        )
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();

    // Handle Ctrl+C
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        if shutdown_clone.load(Ordering::Relaxed) {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        shutdown_clone.store(true, Ordering::SeqCst);
    })?;

    match args.command {
        Command::Run {
            tile,
            tiles,
            keyspace,
            table,
            source,
            batch_size,
            flush_capacity,
            process_name,
            replicate_deletes,
        } => {
            run_discovery(
                &args.redis,
                &args.storage_root,
                tile,
                tiles,
                &keyspace,
                &table,
                &source,
                batch_size,
                flush_capacity,
                &process_name,
                replicate_deletes,
                args.quiet,
                args.verbose,
                shutdown,
            )
            .await?
        }

        Command::Audit {
            tile,
            process_name,
            format,
        } => run_audit(&args.storage_root, tile, &process_name, &format).await?,

        Command::Status {
            tile,
            watch,
            interval,
            format,
        } => run_status(&args.redis, tile, watch, interval, &format).await?,
    }

    Ok(())
}

async fn run_discovery(
    redis_url: &str,
    storage_root: &Path,
    tile: u32,
    tiles: u32,
    keyspace: &str,
    table: &str,
    source_path: &Path,
    batch_size: i64,
    flush_capacity: usize,
    process_name: &str,
    replicate_deletes: bool,
    quiet: bool,
    verbose: bool,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    // Create configuration
    let config = ReconcilerConfig::from_run_args(
        tile,
        tiles,
        keyspace,
        table,
        source_path,
        batch_size,
        flush_capacity,
        process_name,
        replicate_deletes,
        redis_url,
        storage_root,
        quiet,
        verbose,
    )?;

    println!(
        "{} Tile {} of {} scanning {}.{}",
        style("[Discovery]").cyan().bold(),
        style(config.tile).green(),
        style(config.tiles).green(),
        style(&config.keyspace).green(),
        style(&config.table).green()
    );
    println!(
        "  Source: {}",
        style(config.source_path.display()).yellow()
    );
    println!("  Ledger: {}", style(config.ledger_dir().display()).yellow());
    println!("  Redis: {}", style(redis_url).dim());
    if config.replicate_deletes {
        println!("  Deletes: {}", style("reconciled").green());
    }
    println!();

    std::fs::create_dir_all(&config.storage_root)?;

    // Wire up the collaborators
    let source = Arc::new(load_fixture(&config.source_path).await?);
    let cache = Arc::new(RedisDiscoveryCache::new(RedisCacheConfig::with_url(redis_url)).await?);
    let ledger = Arc::new(RocksLedger::open(
        &config.storage_root,
        config.tile,
        &config.process_name,
    )?);

    let show_progress = config.show_progress;
    let task = PartitionDiscoveryTask::new(config, source, cache, ledger).await?;

    // Relay Ctrl+C into the task; checked between sub-batches
    let task_shutdown = task.shutdown_handle();
    let main_shutdown = shutdown.clone();
    tokio::spawn(async move {
        while !main_shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        task_shutdown.store(true, Ordering::SeqCst);
    });

    // Create progress bar
    let pb = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    // Run discovery
    let pb_clone = pb.clone();
    let stats = task
        .run(move |progress: RunProgress| {
            if let Some(ref pb) = pb_clone {
                pb.set_message(format!(
                    "Ranges: {}/{} | Rows: {} | New: {} | Deleted: {}",
                    style(progress.ranges_scanned).cyan(),
                    style(progress.ranges_assigned).dim(),
                    style(progress.rows_scanned).green(),
                    style(progress.new_partitions).yellow(),
                    if progress.deleted_partitions > 0 {
                        style(progress.deleted_partitions).red().to_string()
                    } else {
                        style(progress.deleted_partitions).dim().to_string()
                    },
                ));
            }
        })
        .await?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // Print summary
    println!();
    println!("{}", style("Discovery Complete").green().bold());
    println!("  Ranges scanned: {}", style(stats.ranges_assigned).cyan());
    println!("  Rows scanned: {}", style(stats.rows_scanned).green());
    println!("  New partitions: {}", style(stats.new_partitions).yellow());
    if stats.deleted_partitions > 0 {
        println!(
            "  Deleted partitions: {}",
            style(stats.deleted_partitions).red()
        );
    }
    println!("  Chunks flushed: {}", style(stats.chunks_flushed).yellow());
    println!("  Cache size (tile): {}", style(stats.cache_size).cyan());
    println!("  Duration: {:.1}s", stats.duration.as_secs_f64());

    Ok(())
}

async fn run_audit(
    storage_root: &Path,
    tile: u32,
    process_name: &str,
    format: &str,
) -> anyhow::Result<()> {
    let dir = ledger_path(storage_root, tile, process_name);
    if !dir.exists() {
        anyhow::bail!("No ledger found at {}", dir.display());
    }

    let ledger = RocksLedger::open_at(dir)?;
    let partitions = ledger.read_partitions_metadata()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&partitions)?);
    } else {
        println!("{}", style("Ledger Audit").cyan().bold());
        println!("{}", "=".repeat(50));
        println!();

        if partitions.is_empty() {
            println!("  {}", style("No partitions recorded").dim());
        } else {
            for ident in &partitions {
                println!("  {} {}", style(ident.tile).dim(), ident.partition_key);
            }
        }
        println!();
        println!("Total partitions: {}", style(partitions.len()).green());
    }

    Ok(())
}

async fn run_status(
    redis_url: &str,
    tile: u32,
    watch: bool,
    interval: u64,
    format: &str,
) -> anyhow::Result<()> {
    let cache = RedisDiscoveryCache::new(RedisCacheConfig::with_url(redis_url)).await?;

    loop {
        let discovered = cache.size(tile).await?;
        let counter_key = total_chunks_key(tile);
        let chunks = if cache.contains_key(&counter_key).await? {
            read_counter(&cache, &counter_key).await?
        } else {
            0
        };

        if format == "json" {
            let status = serde_json::json!({
                "tile": tile,
                "discovered_keys": discovered,
                "chunks": chunks,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            // Clear screen in watch mode
            if watch {
                let term = Term::stdout();
                let _ = term.clear_screen();
            }

            println!("{}", style("tile-reconciler Status").cyan().bold());
            println!("{}", "=".repeat(50));
            println!();

            println!("{}", style(format!("Tile {}", tile)).yellow().bold());
            println!("  Discovered keys: {}", style(discovered).cyan());
            println!("  Chunks: {}", style(chunks).green());
            println!();

            println!(
                "Last updated: {}",
                style(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")).dim()
            );
        }

        if !watch {
            break;
        }

        tokio::time::sleep(Duration::from_secs(interval)).await;
    }

    Ok(())
}
