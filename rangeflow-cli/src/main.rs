//! rangeflow CLI - parallel transfers between an object store and local files.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::get::GetArgs;
use commands::plan::PlanArgs;
use commands::put::PutArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "rangeflow", version, about, long_about = None)]
struct Cli {
    /// Path to the config file (default: ~/.rangeflow/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show how an object or byte range splits into chunks
    Plan(PlanArgs),

    /// Download an object, or a byte range of it
    Get(GetArgs),

    /// Upload a local file as chunk objects
    Put(PutArgs),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let Cli {
        config,
        log_level,
        command,
    } = cli;
    let runner = || CliRunner::new(config.as_deref(), log_level.as_deref());

    match command {
        // Planning needs neither config nor logging.
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Get(args) => {
            let runner = runner()?;
            runner.log_startup("get");
            runner.block_on(commands::get::run(args, &runner))
        }
        Commands::Put(args) => {
            let runner = runner()?;
            runner.log_startup("put");
            runner.block_on(commands::put::run(args, &runner))
        }
        Commands::Config { command } => commands::config::run(command, &runner()?),
    }
}
