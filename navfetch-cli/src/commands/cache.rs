//! Cache management CLI commands.

use clap::Subcommand;
use navfetch::cache::{DiskStore, StoragePolicy};
use navfetch::config::format_size;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear cached resources (both tiers unless one is chosen)
    Clear {
        /// Clear only the memory tier
        #[arg(long, conflicts_with = "disk")]
        memory: bool,

        /// Clear only the disk tier
        #[arg(long)]
        disk: bool,
    },

    /// Show disk cache location and entry count
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, debug: bool) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(debug)?;
    runner.log_startup("cache");

    let mut config = runner.config().clone();
    // Always attach the disk tier so it can be inspected and cleared
    config.cache.persist = true;
    let cache_dir = config.cache.directory.clone();
    let disk = DiskStore::new(cache_dir.clone());

    match action {
        CacheAction::Clear { memory, disk: disk_only } => {
            let policy = match (memory, disk_only) {
                (true, _) => StoragePolicy::MemoryOnly,
                (_, true) => StoragePolicy::DiskOnly,
                _ => StoragePolicy::MemoryAndDisk,
            };
            let context = runner.context_with(config)?;

            let removed = runner.block_on(async {
                let before = disk.entry_count().await?;
                context.cache().clear(policy).wait().await?;
                let after = disk.entry_count().await?;
                Ok::<_, CliError>(before.saturating_sub(after))
            })?;

            println!("Cleared {} cache at: {}", policy, cache_dir.display());
            if policy.includes_disk() {
                println!("Deleted {} files", removed);
            }
            Ok(())
        }
        CacheAction::Stats => {
            let count = runner.block_on(disk.entry_count())?;
            println!("Disk cache: {}", cache_dir.display());
            println!("  Files:        {}", count);
            println!(
                "  Memory limit: {}",
                format_size(runner.config().cache.memory_size)
            );
            println!("  Persist:      {}", runner.config().cache.persist);
            Ok(())
        }
    }
}
