//! Backup Catalog - Main entry point
//!
//! Lists the backup sets stored at a destination and cleans up manifests that
//! only exist in the local cache.

use anyhow::Result;
use backup_catalog::{config::Config, shutdown, utils, Inventory};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Directory holding the manifest caches (overrides config)
    #[arg(short, long, value_name = "DIR", global = true)]
    working_dir: Option<PathBuf>,

    /// Manifests fetched and decoded at once (overrides config)
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the manifest cache and list the backup sets at a destination
    List {
        /// Destination URI (file:///path or a plain path)
        destination: String,
    },
    /// Sync the manifest cache and delete manifests missing from the destination
    Clean {
        /// Destination URI (file:///path or a plain path)
        destination: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(dir) = args.working_dir {
        config.cache.working_dir = dir;
    }
    if let Some(concurrency) = args.concurrency {
        config.sync.max_concurrent_fetches = usize::from(concurrency);
        config.sync.max_concurrent_decodes = usize::from(concurrency);
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "Starting backup-catalog v{} (working dir: {})",
        env!("CARGO_PKG_VERSION"),
        config.cache.working_dir.display()
    );

    let cancel = CancellationToken::new();
    let signal_task = shutdown::cancel_on_signal(cancel.clone());
    let inventory = Inventory::from_config(&config);

    let result = match &args.command {
        Command::List { destination } => inventory
            .list_backup_sets(destination, &cancel)
            .await
            .map(|report| {
                print!("{}", report.summary);
                if let Some(warning) = report.warning {
                    eprint!("\n{}", warning);
                }
            }),
        Command::Clean { destination } => inventory
            .clean_orphans(destination, &cancel)
            .await
            .map(|outcome| {
                println!(
                    "Removed {} local only manifests ({} could not be removed)",
                    outcome.removed.len(),
                    outcome.failed.len()
                );
            }),
    };

    cancel.cancel();
    let _ = signal_task.await;

    result.map_err(Into::into)
}
