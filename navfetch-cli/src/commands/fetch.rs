//! Single resource fetch.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use navfetch::cache::CacheKey;
use navfetch::config::format_size;
use navfetch::repository::RawDecoder;
use navfetch::transport::ResourceId;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `navfetch fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URL of the resource
    pub url: String,

    /// Cache key to store the resource under
    #[arg(long)]
    pub key: String,

    /// Write the bytes to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Keep the resource in memory only and skip the disk tier
    #[arg(long)]
    pub memory_only: bool,
}

/// Fetch one resource, reporting whether the cache already had it.
pub fn run(args: FetchArgs, debug: bool) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(debug)?;
    runner.log_startup("fetch");

    let mut config = runner.config().clone();
    if args.memory_only {
        config.cache.persist = false;
    }
    let context = runner.context_with(config)?;
    let repository = context.repository(RawDecoder);
    let key = CacheKey::new(args.key.as_str());
    let url = ResourceId::new(&args.url);

    let started = Instant::now();
    let outcome = runner.block_on(async {
        let outcome = match repository.read(&key).await {
            Some(data) => Ok((data, true)),
            None => repository.load(url, key.clone()).await.map(|data| (data, false)),
        };
        context.shutdown().await;
        outcome
    });
    let (data, from_cache) = outcome.map_err(|error| CliError::Fetch {
        url: args.url.clone(),
        error,
    })?;

    println!("Fetched {}", args.url);
    println!("  Key:     {}", key);
    println!("  Size:    {} bytes ({})", data.len(), format_size(data.len()));
    println!(
        "  Source:  {}",
        if from_cache { "cache" } else { "network" }
    );
    println!("  Stored:  {}", context.storage_policy());
    println!("  Elapsed: {:.2?}", started.elapsed());

    if let Some(path) = &args.output {
        runner.write_output(path, &data)?;
        println!("Saved to {}", path.display());
    }

    Ok(())
}
