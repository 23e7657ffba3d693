//! Configuration management CLI commands.

use clap::Subcommand;
use navfetch::config::{config_file_path, format_size, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a default config.ini if none exists
    Init {
        /// Overwrite an existing file with defaults
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(force),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn run_init(force: bool) -> Result<(), CliError> {
    let path = config_file_path();
    if force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let (path, created) = ConfigFile::ensure_exists()?;
    if created {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let path = config_file_path();
    let config = ConfigFile::load()?;

    if path.exists() {
        println!("# {}", path.display());
    } else {
        println!("# {} (not present, showing defaults)", path.display());
    }
    println!();
    println!("[cache]");
    println!("directory      = {}", config.cache.directory.display());
    println!("memory_size    = {}", format_size(config.cache.memory_size));
    println!("persist        = {}", config.cache.persist);
    println!();
    println!("[download]");
    println!("timeout        = {}", config.download.timeout);
    println!("max_concurrent = {}", config.download.max_concurrent);
    println!("user_agent     = {}", config.download.user_agent);
    if !config.download.headers.is_empty() {
        println!();
        println!("[headers]");
        for (name, value) in &config.download.headers {
            println!("{} = {}", name, value);
        }
    }
    println!();
    println!("[sprite]");
    println!("scale          = {}", config.sprite.scale);
    println!();
    println!("[logging]");
    println!("file           = {}", config.logging.file.display());
    Ok(())
}
