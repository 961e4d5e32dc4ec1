//! Configuration management for workledger
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use workledger::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Ledger stored at: {}", config.ledger.path.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `WORKLEDGER__<section>__<key>`
//!
//! Examples:
//! - `WORKLEDGER__LEDGER__PATH=/var/lib/workledger`
//! - `WORKLEDGER__AUDIT__CHAIN_SCOPE=tenant`
//! - `WORKLEDGER__STORAGE__MAX_INLINE_BYTES=512KB`
//!
//! S3 credentials are only read from `S3_ACCESS_KEY`/`S3_SECRET_KEY` (or the
//! AWS names).
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/workledger.toml`.
//! This can be overridden using the `WORKLEDGER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AuditConfig, Config, LedgerConfig, RetentionConfig, RuntimeConfig, StorageConfig,
    StorageProvider, TelemetryConfig,
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
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
