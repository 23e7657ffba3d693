//! navfetch - deduplicating fetch-and-cache core for navigation UI resources
//!
//! Road shields, sprite sheets and icons are requested far more often than
//! they change. This crate makes sure each one is downloaded once, however
//! many callers ask for it at the same moment, and then served from a
//! two-tier cache.
//!
//! # High-Level API
//!
//! Build an [`context::AssetContext`] from the user's configuration and use
//! its repositories:
//!
//! ```ignore
//! use navfetch::config::ConfigFile;
//! use navfetch::context::AssetContext;
//! use navfetch::sprite::{Generation, ShieldKey};
//!
//! let context = AssetContext::from_config(ConfigFile::load()?)?;
//! context
//!     .sprites()
//!     .update_style_async(Generation::new("streets-v12", "https://tiles.example.com/streets"))
//!     .await?;
//! let shield = context.sprites().shield(&ShieldKey::for_text("us-interstate", "95"));
//! ```
//!
//! # Layers
//!
//! - [`transport`]: the network boundary
//! - [`fetch`]: in-flight deduplication and the worker pool
//! - [`cache`]: memory and disk tiers
//! - [`repository`]: cache-first access to decoded resources
//! - [`sprite`]: style sprite sheets with atomic generation swaps

pub mod cache;
pub mod config;
pub mod context;
pub mod fetch;
pub mod logging;
pub mod repository;
pub mod sprite;
pub mod transport;

/// Version of the navfetch library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
