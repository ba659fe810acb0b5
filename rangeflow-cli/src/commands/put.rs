//! Put command - upload a local file as chunk objects.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use rangeflow::config::format_size;
use rangeflow::transfer::{FileSource, ProgressTracker, RandomAccessSource, UploadManifest};

use super::common::{
    build_service, cancel_on_interrupt, local_principal, ProgressDisplay, TransferArgs,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the put command.
#[derive(Debug, Args)]
pub struct PutArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Base key; chunk i is stored at <KEY>/chunk_<i>
    pub key: String,

    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Run the put command.
pub async fn run(args: PutArgs, runner: &CliRunner) -> Result<(), CliError> {
    let service = build_service(runner.config(), &args.transfer)?;
    let source = Arc::new(FileSource::open(&args.file).await?);
    let size = source.size();

    println!(
        "Uploading {} ({}) to {}",
        args.file.display(),
        format_size(size),
        args.key
    );

    let cancel = cancel_on_interrupt();
    let tracker = ProgressTracker::new();
    let display = ProgressDisplay::start(&tracker, &args.key, args.transfer.quiet);

    let result = service
        .upload(
            &local_principal(),
            &args.key,
            &args.key,
            source,
            size,
            &cancel,
            Some(tracker),
        )
        .await;

    display.finish().await;
    let manifest = result?;

    print_manifest(&manifest);
    Ok(())
}

fn print_manifest(manifest: &UploadManifest) {
    println!();
    println!(
        "{} {} in {} chunks",
        style("Uploaded").green().bold(),
        format_size(manifest.total_size),
        manifest.chunks.len()
    );
    for chunk in &manifest.chunks {
        println!(
            "  {:<40} {:>12} {:>10}  {}",
            chunk.key,
            chunk.offset,
            format_size(chunk.size),
            chunk.sha256
        );
    }
}
