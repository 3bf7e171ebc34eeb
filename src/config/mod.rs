//! Configuration management for IngestBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ingestbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Chunk size: {}", config.transfer.chunk_size);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `INGESTBOX__<section>__<key>`
//!
//! Examples:
//! - `INGESTBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `INGESTBOX__TRANSFER__CHUNK_SIZE=32MB`
//! - `INGESTBOX__DRIVER__WORKERS=8`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/ingestbox.toml`.
//! This can be overridden using the `INGESTBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, DriverConfig, RetentionConfig, ServerConfig, SourceConfig, StorageConfig,
    StorageProvider, TransferConfig,
};
pub use validation::{S3_MIN_PART_BYTES, ValidationError};

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
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
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
