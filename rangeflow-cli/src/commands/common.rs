//! Common types and utilities shared across CLI commands.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rangeflow::access::{AllowAll, StoreCatalog};
use rangeflow::config::{parse_size, ConfigFile};
use rangeflow::store::{self, StoreClient};
use rangeflow::transfer::{ProgressTracker, TransferCoordinator, TransferSettings};
use rangeflow::FileTransferService;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CliError;

/// Transfer tuning flags shared by `get` and `put`.
#[derive(Debug, Clone, Args)]
pub struct TransferArgs {
    /// Chunk size, e.g. 8MB (overrides config)
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// Chunks in flight at once (overrides config)
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Hide the progress bar
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// Resolve transfer settings from CLI args and config.
pub fn resolve_settings(
    args: &TransferArgs,
    config: &ConfigFile,
) -> Result<TransferSettings, CliError> {
    // CLI takes precedence, then config
    let mut settings = config.transfer.clone();

    if let Some(size) = &args.chunk_size {
        let bytes = parse_size(size)
            .map_err(|e| CliError::Config(format!("invalid --chunk-size '{}': {}", size, e)))?;
        settings = settings
            .with_chunk_size(bytes)
            .with_upload_chunk_size(bytes);
    }
    if let Some(concurrency) = args.concurrency {
        settings = settings.with_concurrency(concurrency);
    }

    settings
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(settings)
}

/// Build the store client selected by `[store]`.
pub fn build_client(config: &ConfigFile) -> Result<StoreClient, CliError> {
    Ok(StoreClient::new(store::from_config(&config.store)?))
}

/// Build a service where keys are file ids and every access is allowed.
pub fn build_service(
    config: &ConfigFile,
    args: &TransferArgs,
) -> Result<FileTransferService, CliError> {
    let client = build_client(config)?;
    let coordinator = TransferCoordinator::new(client.clone(), resolve_settings(args, config)?)?;

    Ok(FileTransferService::new(
        Arc::new(AllowAll),
        Arc::new(StoreCatalog::new(client)),
        coordinator,
    ))
}

/// Principal name for local commands.
pub fn local_principal() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}

/// A token cancelled by Ctrl+C.
pub fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Interrupted, cancelling transfer...");
        handler_token.cancel();
    }) {
        warn!(error = %e, "Could not install Ctrl+C handler");
    }

    cancel
}

/// Progress bar driven by a [`ProgressTracker`].
pub struct ProgressDisplay {
    done: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    /// Start rendering `tracker`, or do nothing when `hidden`.
    pub fn start(tracker: &ProgressTracker, label: &str, hidden: bool) -> Self {
        let done = CancellationToken::new();
        if hidden {
            return Self { done, handle: None };
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(
                "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message(label.to_string());

        let tracker = tracker.clone();
        let stop = done.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                let stopping = tokio::select! {
                    _ = stop.cancelled() => true,
                    _ = ticker.tick() => false,
                };

                let snap = tracker.snapshot();
                bar.set_length(snap.total_bytes);
                bar.set_position(snap.bytes_done);

                if stopping || snap.finished {
                    if snap.failed || snap.bytes_done < snap.total_bytes {
                        bar.abandon();
                    } else {
                        bar.finish();
                    }
                    break;
                }
            }
        });

        Self {
            done,
            handle: Some(handle),
        }
    }

    /// Render the final state and remove the ticker.
    pub async fn finish(self) {
        self.done.cancel();
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(chunk_size: Option<&str>, concurrency: Option<usize>) -> TransferArgs {
        TransferArgs {
            chunk_size: chunk_size.map(str::to_string),
            concurrency,
            quiet: true,
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = ConfigFile::default();
        let settings = resolve_settings(&args(Some("8MB"), Some(12)), &config).unwrap();

        assert_eq!(settings.chunk_size, 8 * 1024 * 1024);
        assert_eq!(settings.upload_chunk_size, 8 * 1024 * 1024);
        assert_eq!(settings.concurrency, 12);
    }

    #[test]
    fn test_config_used_without_overrides() {
        let config = ConfigFile::default();
        let settings = resolve_settings(&args(None, None), &config).unwrap();
        assert_eq!(settings, config.transfer);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let config = ConfigFile::default();
        assert!(matches!(
            resolve_settings(&args(Some("lots"), None), &config),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            resolve_settings(&args(None, Some(0)), &config),
            Err(CliError::Config(_))
        ));
    }
}
