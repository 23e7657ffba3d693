//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! - [`cache`] - Cache management (clear)
//! - [`config`] - Configuration management (init, show, path)
//! - [`fetch`] - Single resource fetch
//! - [`sprite`] - Sprite sheet installation and shield extraction

pub mod cache;
pub mod config;
pub mod fetch;
pub mod sprite;
