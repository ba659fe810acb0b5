//! Get command - download an object or a byte range of it.

use std::path::PathBuf;

use clap::Args;
use console::style;
use futures::StreamExt;
use rangeflow::config::format_size;
use rangeflow::transfer::ProgressTracker;
use rangeflow::ResponseStatus;
use tokio::fs::File;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tracing::info;

use super::common::{
    build_service, cancel_on_interrupt, local_principal, ProgressDisplay, TransferArgs,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the get command.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Object key to download
    pub key: String,

    /// HTTP Range header value, e.g. "bytes=0-1048575" or "bytes=-500"
    #[arg(long, short = 'r', value_name = "HEADER")]
    pub range: Option<String>,

    /// Output file (default: stdout)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Run the get command.
pub async fn run(args: GetArgs, runner: &CliRunner) -> Result<(), CliError> {
    let service = build_service(runner.config(), &args.transfer)?;
    let cancel = cancel_on_interrupt();
    let tracker = ProgressTracker::new();

    let response = service
        .open_download(
            &local_principal(),
            &args.key,
            args.range.as_deref(),
            &cancel,
            Some(tracker.clone()),
        )
        .await?;

    if let Some(range) = &response.content_range {
        eprintln!("{} {}", style("Range:").bold(), range);
    }

    // Progress on stdout would corrupt piped output; keep it for files only.
    let hidden = args.transfer.quiet || args.output.is_none();
    let display = ProgressDisplay::start(&tracker, &args.key, hidden);

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(File::create(path).await?),
        None => Box::new(io::stdout()),
    };

    let status = response.status;
    let expected = response.content_length;
    let mut stream = response.stream;
    let mut written = 0u64;

    let result: Result<(), CliError> = async {
        while let Some(item) = stream.next().await {
            let bytes = item?;
            out.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        out.flush().await?;
        Ok(())
    }
    .await;

    display.finish().await;

    if let Err(e) = result {
        if let Some(path) = &args.output {
            // A partial file is worse than none.
            let _ = tokio::fs::remove_file(path).await;
        }
        return Err(e);
    }

    info!(key = %args.key, bytes = written, "Download written");
    let kind = match status {
        ResponseStatus::Full => "object",
        ResponseStatus::Partial => "range",
    };
    eprintln!(
        "{} {} {} ({} of {})",
        style("Downloaded").green().bold(),
        kind,
        args.key,
        format_size(written),
        format_size(expected)
    );

    Ok(())
}
