//! Configuration file handling.
//!
//! Settings live in an INI file, by default `~/.rangeflow/config.ini`:
//!
//! ```ini
//! [transfer]
//! chunk_size = 5MB
//! upload_chunk_size = 10MB
//! concurrency = 5
//! reorder_window = 5
//! retry = linear        ; none | fixed | linear | exponential
//! max_attempts = 3
//! retry_step_secs = 1
//! chunk_timeout_secs = 30
//!
//! [store]
//! backend = fs            ; memory | fs | http
//! root = ~/.rangeflow/objects
//! endpoint = http://localhost:9000/bucket
//! request_timeout_secs = 30
//!
//! [logging]
//! level = info
//! file = ~/.rangeflow/rangeflow.log
//! ```
//!
//! Every key is optional. A missing file yields the defaults; a present but
//! invalid value is an error rather than a silent fallback.

mod size;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::transfer::{RetryPolicy, TransferSettings, DEFAULT_MAX_ATTEMPTS};

pub use size::{format_size, parse_size};

/// Directory name under the home directory for config and data.
pub const CONFIG_DIR_NAME: &str = ".rangeflow";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default per-request timeout for the HTTP backend, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to load config {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// INI syntax error in an in-memory document.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A key has a value of the wrong shape.
    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Values parse individually but do not make a usable combination.
    #[error("invalid transfer settings: {0}")]
    InvalidSettings(String),
}

/// Which object store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process map; contents are lost on exit.
    Memory,
    /// Directory of files under `root`.
    Fs,
    /// HTTP endpoint at `endpoint`.
    Http,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "fs" | "file" | "filesystem" => Ok(Self::Fs),
            "http" | "s3" => Ok(Self::Http),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,
    /// Root directory for the `fs` backend.
    pub root: PathBuf,
    /// Base URL for the `http` backend.
    pub endpoint: String,
    /// Per-request timeout for the `http` backend.
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: config_dir().join("objects"),
            endpoint: "http://localhost:9000".to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Optional log file; console only when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Engine settings from `[transfer]`.
    pub transfer: TransferSettings,
    /// Backend settings from `[store]`.
    pub store: StoreConfig,
    /// Logging settings from `[logging]`.
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load the file at `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Load the default config file location.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_config_path())
    }

    /// Parse configuration from an INI document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("transfer")) {
            apply_transfer(section, &mut config.transfer)?;
        }
        if let Some(section) = ini.section(Some("store")) {
            apply_store(section, &mut config.store)?;
        }
        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level") {
                config.logging.level = level.trim().to_string();
            }
            if let Some(file) = section.get("file") {
                let file = file.trim();
                config.logging.file = (!file.is_empty()).then(|| expand_home(file));
            }
        }

        config
            .transfer
            .validate()
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;

        Ok(config)
    }
}

fn apply_transfer(section: &Properties, settings: &mut TransferSettings) -> Result<(), ConfigError> {
    const SECTION: &str = "transfer";

    if let Some(v) = section.get("chunk_size") {
        settings.chunk_size = size::parse_size_value(SECTION, "chunk_size", v)?;
    }
    if let Some(v) = section.get("upload_chunk_size") {
        settings.upload_chunk_size = size::parse_size_value(SECTION, "upload_chunk_size", v)?;
    }
    if let Some(v) = section.get("concurrency") {
        settings.concurrency = parse_number(SECTION, "concurrency", v)?;
    }
    if let Some(v) = section.get("reorder_window") {
        settings.reorder_window = parse_number(SECTION, "reorder_window", v)?;
    } else {
        settings.reorder_window = settings.concurrency;
    }

    let max_attempts = match section.get("max_attempts") {
        Some(v) => Some(parse_number::<u32>(SECTION, "max_attempts", v)?),
        None => None,
    };
    let step = match section.get("retry_step_secs") {
        Some(v) => Some(Duration::from_secs(parse_number(SECTION, "retry_step_secs", v)?)),
        None => None,
    };
    let kind = section.get("retry");
    if kind.is_some() || max_attempts.is_some() || step.is_some() {
        let kind = kind.unwrap_or("linear");
        let attempts = max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        settings.retry = RetryPolicy::from_kind(kind, attempts, step).ok_or_else(|| {
            ConfigError::InvalidValue {
                section: SECTION.to_string(),
                key: "retry".to_string(),
                value: kind.to_string(),
                reason: "expected none, fixed, linear or exponential".to_string(),
            }
        })?;
    }

    if let Some(v) = section.get("chunk_timeout_secs") {
        settings.chunk_timeout =
            Duration::from_secs(parse_number(SECTION, "chunk_timeout_secs", v)?);
    }

    Ok(())
}

fn apply_store(section: &Properties, store: &mut StoreConfig) -> Result<(), ConfigError> {
    if let Some(v) = section.get("backend") {
        store.backend = v.parse().map_err(|reason| ConfigError::InvalidValue {
            section: "store".to_string(),
            key: "backend".to_string(),
            value: v.to_string(),
            reason,
        })?;
    }
    if let Some(v) = section.get("root") {
        store.root = expand_home(v.trim());
    }
    if let Some(v) = section.get("endpoint") {
        store.endpoint = v.trim().to_string();
    }
    if let Some(v) = section.get("request_timeout_secs") {
        store.request_timeout =
            Duration::from_secs(parse_number("store", "request_timeout_secs", v)?);
    }
    Ok(())
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Directory holding the config file and default data.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
