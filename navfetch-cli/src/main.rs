//! navfetch CLI - Command-line interface
//!
//! Fetches resources through the navfetch cache, installs style sprite
//! sheets and manages the cache and configuration.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::sprite::SpriteArgs;

#[derive(Parser)]
#[command(name = "navfetch")]
#[command(version = navfetch::VERSION)]
#[command(about = "Fetch and cache navigation UI resources", long_about = None)]
struct Cli {
    /// Log at debug level and mirror logs to stdout
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a resource through the cache
    Fetch(FetchArgs),

    /// Install a style's sprite sheet and extract a sprite or shield
    Sprite(SpriteArgs),

    /// Cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, cli.debug),
        Commands::Sprite(args) => commands::sprite::run(args, cli.debug),
        Commands::Cache { action } => commands::cache::run(action, cli.debug),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
