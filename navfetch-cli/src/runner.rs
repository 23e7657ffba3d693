//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, the tokio runtime
//! and context creation so command handlers stay short.

use std::future::Future;
use std::path::Path;

use navfetch::config::ConfigFile;
use navfetch::context::AssetContext;
use navfetch::logging::{init_logging, LoggingGuard};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Dropped first so in-flight tasks stop before logging is flushed
    runtime: Runtime,
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Load config, start logging and build the runtime.
    ///
    /// Logs go to the configured file; `debug_mode` also mirrors them to
    /// stdout at debug level.
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let logging_guard = init_logging(&config.logging.file, debug_mode, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("navfetch-worker")
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            runtime,
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("navfetch v{}", navfetch::VERSION);
        info!("navfetch CLI: {} command", command);
    }

    /// Context for the loaded configuration.
    pub fn context(&self) -> Result<AssetContext, CliError> {
        self.context_with(self.config.clone())
    }

    /// Context for an adjusted copy of the configuration.
    pub fn context_with(&self, config: ConfigFile) -> Result<AssetContext, CliError> {
        Ok(AssetContext::builder(config)
            .with_runtime(self.runtime.handle().clone())
            .build()?)
    }

    /// Drive a future to completion on the runner's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Write fetched bytes to `path`.
    pub fn write_output(&self, path: &Path, data: &[u8]) -> Result<(), CliError> {
        std::fs::write(path, data).map_err(|error| CliError::FileWrite {
            path: path.display().to_string(),
            error,
        })?;
        info!(path = %path.display(), bytes = data.len(), "Output written");
        Ok(())
    }
}
