//! CLI error type.

use std::io;

use rangeflow::config::ConfigError;
use rangeflow::{StoreError, TransferError};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad argument or setting combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// The config file could not be loaded.
    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    /// Logging could not be set up.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// The store backend could not be built.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transfer failed or was cancelled.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Local file I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Transfer(TransferError::Cancelled) => 130,
            CliError::Config(_) | CliError::ConfigFile(_) => 2,
            _ => 1,
        }
    }
}
