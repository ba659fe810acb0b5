//! Configuration inspection commands.

use clap::Subcommand;
use rangeflow::config::{format_size, StoreBackend};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, runner: &CliRunner) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(runner),
        ConfigCommands::Path => {
            println!("{}", runner.config_path().display());
            Ok(())
        }
    }
}

fn run_show(runner: &CliRunner) -> Result<(), CliError> {
    let config = runner.config();
    let transfer = &config.transfer;

    println!("Configuration Settings");
    println!("======================");
    println!();
    if !runner.config_path().exists() {
        println!("(no file at {}, using defaults)", runner.config_path().display());
        println!();
    }

    println!("[transfer]");
    println!("  chunk_size         = {}", format_size(transfer.chunk_size));
    println!("  upload_chunk_size  = {}", format_size(transfer.upload_chunk_size));
    println!("  concurrency        = {}", transfer.concurrency);
    println!("  reorder_window     = {}", transfer.reorder_window);
    println!("  retry              = {}", transfer.retry.kind());
    println!("  max_attempts       = {}", transfer.retry.max_attempts());
    println!("  chunk_timeout_secs = {}", transfer.chunk_timeout.as_secs());
    println!();

    println!("[store]");
    match config.store.backend {
        StoreBackend::Memory => println!("  backend = memory"),
        StoreBackend::Fs => {
            println!("  backend = fs");
            println!("  root    = {}", config.store.root.display());
        }
        StoreBackend::Http => {
            println!("  backend              = http");
            println!("  endpoint             = {}", config.store.endpoint);
            println!(
                "  request_timeout_secs = {}",
                config.store.request_timeout.as_secs()
            );
        }
    }
    println!();

    println!("[logging]");
    println!("  level = {}", config.logging.level);
    match &config.logging.file {
        Some(file) => println!("  file  = {}", file.display()),
        None => println!("  file  = (not set)"),
    }

    Ok(())
}
