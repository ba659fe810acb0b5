//! Shared command setup: configuration, logging and the async runtime.

use std::future::Future;
use std::path::{Path, PathBuf};

use rangeflow::config::{default_config_path, ConfigFile};
use rangeflow::logging::{self, WorkerGuard};
use tracing::info;

use crate::error::CliError;

/// Loaded configuration plus the resources that must outlive a command.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration and initialize logging.
    ///
    /// `log_level` overrides the `[logging]` level from the file.
    pub fn new(config_path: Option<&Path>, log_level: Option<&str>) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        let mut config = ConfigFile::load(&config_path)?;

        if let Some(level) = log_level {
            config.logging.level = level.to_string();
        }
        let log_guard =
            logging::init(&config.logging).map_err(|e| CliError::Logging(e.to_string()))?;

        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    /// The effective configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Where the configuration was read from (it may not exist).
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Log the command being run.
    pub fn log_startup(&self, command: &str) {
        info!(
            version = rangeflow::VERSION,
            command,
            config = %self.config_path.display(),
            backend = ?self.config.store.backend,
            "rangeflow starting"
        );
    }

    /// Run an async command to completion on a multi-threaded runtime.
    pub fn block_on<F, T>(&self, future: F) -> Result<T, CliError>
    where
        F: Future<Output = Result<T, CliError>>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;
        runtime.block_on(future)
    }
}
