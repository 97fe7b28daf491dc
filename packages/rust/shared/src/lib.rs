//! Shared types, error model, and configuration for Harvest.
//!
//! This crate is the foundation depended on by all other Harvest crates.
//! It provides:
//! - [`HarvestError`]: the unified error type and its [`ErrorKind`] taxonomy
//! - [`Value`]: the result type every pipeline operation produces
//! - Configuration ([`AppConfig`], [`ScraperConfiguration`], config loading)

pub mod config;
pub mod error;
pub mod value;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_SCRIPT_LANGUAGE, DefaultsConfig, HttpConfig, PluginsConfig,
    ScraperConfiguration, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{ErrorKind, HarvestError, Result};
pub use value::{DEFAULT_CHARSET, Value, is_truthy};
