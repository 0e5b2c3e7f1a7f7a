// checkpoint.rs — Checkpoint subcommands: create, list, delete, restore, export.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;

use super::{ensure_editable, Context};

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Snapshot the current source tree.
    Create {
        upload_id: u64,
        /// User the checkpoint is recorded for.
        #[arg(long)]
        user: Option<String>,
    },
    /// List checkpoints, oldest first.
    List { upload_id: u64 },
    /// Delete one checkpoint by checksum.
    Delete {
        upload_id: u64,
        checksum: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete every checkpoint.
    DeleteAll {
        upload_id: u64,
        #[arg(long)]
        user: Option<String>,
    },
    /// Replace the source tree with a checkpoint.
    Restore {
        upload_id: u64,
        checksum: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Copy a checkpoint tarball out of the workspace.
    Export {
        upload_id: u64,
        checksum: String,
        output: PathBuf,
    },
}

pub fn execute(cmd: &CheckpointCommands, ctx: &mut Context) -> anyhow::Result<()> {
    match cmd {
        CheckpointCommands::Create { upload_id, user } => {
            let mut ws = ctx.open(*upload_id)?;
            let result = ws.create_checkpoint(user.as_deref());
            // The attempt is logged either way.
            ctx.save(&ws)?;
            let checksum = result?;
            println!("Created checkpoint: {}", checksum);
            Ok(())
        }
        CheckpointCommands::List { upload_id } => {
            let ws = ctx.open(*upload_id)?;
            let checkpoints = ws.list_checkpoints();
            if checkpoints.is_empty() {
                println!("No checkpoints.");
                return Ok(());
            }
            println!("{:<36} {:<26} {:>10} {:<20}", "NAME", "CHECKSUM", "SIZE", "CREATED");
            println!("{}", "-".repeat(95));
            for f in &checkpoints {
                println!(
                    "{:<36} {:<26} {:>10} {:<20}",
                    f.name(),
                    ws.checksum(&f.key())?,
                    f.size_bytes,
                    f.last_modified.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            println!("\n{} of {} checkpoint(s).", checkpoints.len(), ws.max_checkpoints());
            Ok(())
        }
        CheckpointCommands::Delete {
            upload_id,
            checksum,
            user,
        } => {
            let mut ws = ctx.open(*upload_id)?;
            let result = ws.delete_checkpoint(checksum, user.as_deref());
            ctx.save(&ws)?;
            result?;
            println!("Deleted checkpoint {}", checksum);
            Ok(())
        }
        CheckpointCommands::DeleteAll { upload_id, user } => {
            let mut ws = ctx.open(*upload_id)?;
            ws.delete_all_checkpoints(user.as_deref())?;
            ctx.save(&ws)?;
            println!("Deleted all checkpoints of upload {}", upload_id);
            Ok(())
        }
        CheckpointCommands::Restore {
            upload_id,
            checksum,
            user,
        } => {
            let mut ws = ctx.open(*upload_id)?;
            ensure_editable(&ws)?;
            let result = ws.restore_checkpoint(checksum, user.as_deref());
            // A failed restore leaves a workspace error that should be kept.
            ctx.save(&ws)?;
            result?;
            println!("Restored checkpoint {} ({})", checksum, ws.readiness());
            Ok(())
        }
        CheckpointCommands::Export {
            upload_id,
            checksum,
            output,
        } => {
            let ws = ctx.open(*upload_id)?;
            let mut source = ws.open_checkpoint_file(checksum)?;
            let mut out = File::create(output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            let bytes = io::copy(&mut source, &mut out)?;
            println!("Wrote {} bytes to {}", bytes, output.display());
            Ok(())
        }
    }
}
