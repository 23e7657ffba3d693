//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use navfetch::cache::CacheError;
use navfetch::config::ConfigFileError;
use navfetch::context::ContextError;
use navfetch::fetch::FetchError;
use navfetch::sprite::SpriteError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Configuration error
    Config(String),
    /// Failed to build the asset context
    Context(ContextError),
    /// Failed to fetch a resource
    Fetch { url: String, error: FetchError },
    /// Failed to install a sprite generation
    Sprite(SpriteError),
    /// Sprite or shield not present in the installed sheet
    SpriteNotFound(String),
    /// Failed to clear or write the cache
    Cache(CacheError),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Fetch {
                error: FetchError::Server { status: 403 },
                ..
            } => {
                eprintln!();
                eprintln!("The server refused the request. Some tile hosts require");
                eprintln!("a User-Agent or API headers; set them in the [download]");
                eprintln!("and [headers] sections of config.ini.");
            }
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Run 'navfetch config show' to see the effective settings.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Context(e) => write!(f, "Failed to set up resource cache: {}", e),
            CliError::Fetch { url, error } => write!(f, "Failed to fetch '{}': {}", url, error),
            CliError::Sprite(e) => write!(f, "Failed to load sprites: {}", e),
            CliError::SpriteNotFound(name) => {
                write!(f, "No sprite named '{}' in the installed sheet", name)
            }
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Context(e) => Some(e),
            CliError::Fetch { error, .. } => Some(error),
            CliError::Sprite(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ContextError> for CliError {
    fn from(e: ContextError) -> Self {
        CliError::Context(e)
    }
}

impl From<SpriteError> for CliError {
    fn from(e: SpriteError) -> Self {
        CliError::Sprite(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
