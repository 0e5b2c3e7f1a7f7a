//! # fm-cli
//!
//! Operator command line for upload workspaces.
//!
//! - `fm upload create/list/show/lock/unlock/release/unrelease/delete/pack/log`
//! - `fm file add/ls/check/remove/delete/rename/persist`
//! - `fm checkpoint create/list/delete/delete-all/restore/export`
//! - `fm config` prints the effective configuration

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fm_workspace::WorkspaceConfig;
use tracing_subscriber::EnvFilter;

use commands::Context;

/// Manage upload workspaces: files, checks, locks and checkpoints.
#[derive(Parser)]
#[command(name = "fm", version, about)]
struct Cli {
    /// Path to the TOML config (defaults apply when it does not exist).
    #[arg(long, default_value = "fm.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines instead of text.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and change the state of upload workspaces.
    Upload {
        #[command(subcommand)]
        command: commands::upload::UploadCommands,
    },
    /// Add, list, check and remove files in a workspace.
    File {
        #[command(subcommand)]
        command: commands::file::FileCommands,
    },
    /// Capture and restore snapshots of a workspace.
    Checkpoint {
        #[command(subcommand)]
        command: commands::checkpoint::CheckpointCommands,
    },
    /// Print the effective configuration.
    Config,
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("fm_workspace=info".parse()?)
        .add_directive("fm_checks=info".parse()?)
        .add_directive("fm_cli=info".parse()?);
    // Logs go to stderr; stdout carries command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    let config = WorkspaceConfig::load_or_default(&cli.config)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut ctx = Context::new(config)?;
    match &cli.command {
        Commands::Upload { command } => commands::upload::execute(command, &mut ctx),
        Commands::File { command } => commands::file::execute(command, &mut ctx),
        Commands::Checkpoint { command } => commands::checkpoint::execute(command, &mut ctx),
        Commands::Config => Ok(()),
    }
}
