//! Configuration management for mangabox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mangabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MANGABOX__<section>__<key>`
//!
//! Examples:
//! - `MANGABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MANGABOX__DOWNLOAD__MAX_PARALLEL_DOWNLOADS=4`
//! - `MANGABOX__DOWNLOAD__MAX_PAGE_BYTES=16MB`
//! - `MANGABOX__NETWORK__METERED=true`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mangabox.toml`.
//! This can be overridden using the `MANGABOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, DownloadConfig, NetworkConfig, NotificationConfig, RetentionConfig, ServerConfig,
    WatchdogConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MANGABOX__*`)
    /// 2. TOML file (default: `config/mangabox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
