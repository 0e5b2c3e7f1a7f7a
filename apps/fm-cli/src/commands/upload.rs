// upload.rs — Upload subcommands: workspace creation, state changes, deletion.

use clap::Subcommand;
use fm_workspace::{Workspace, WorkspaceStore};

use super::{truncate, Context};

#[derive(Subcommand)]
pub enum UploadCommands {
    /// Create an empty upload workspace.
    Create {
        /// Id of the user who owns the upload.
        #[arg(long)]
        owner: String,
    },
    /// List every stored upload workspace.
    List,
    /// Show state, readiness and messages for one workspace.
    Show { upload_id: u64 },
    /// Refuse further changes to the files.
    Lock { upload_id: u64 },
    Unlock { upload_id: u64 },
    /// Mark the workspace as released.
    Release { upload_id: u64 },
    /// Return a released workspace to active.
    Unrelease { upload_id: u64 },
    /// Delete every file of the workspace. The record is kept unless `--purge`.
    Delete {
        upload_id: u64,
        /// Also drop the stored record.
        #[arg(long)]
        purge: bool,
    },
    /// Build (or reuse) the compressed source package.
    Pack {
        upload_id: u64,
        /// Rebuild even when the package is current.
        #[arg(long)]
        force: bool,
    },
    /// Print the workspace's source log.
    Log { upload_id: u64 },
}

pub fn execute(cmd: &UploadCommands, ctx: &mut Context) -> anyhow::Result<()> {
    match cmd {
        UploadCommands::Create { owner } => {
            let ws = ctx.create(owner)?;
            println!("Created upload workspace: {}", ws.upload_id());
            Ok(())
        }
        UploadCommands::List => list_uploads(ctx),
        UploadCommands::Show { upload_id } => show_upload(&ctx.open(*upload_id)?),
        UploadCommands::Lock { upload_id } => update(ctx, *upload_id, |ws| {
            ws.lock();
            Ok(())
        }),
        UploadCommands::Unlock { upload_id } => update(ctx, *upload_id, |ws| {
            ws.unlock();
            Ok(())
        }),
        UploadCommands::Release { upload_id } => update(ctx, *upload_id, |ws| Ok(ws.release()?)),
        UploadCommands::Unrelease { upload_id } => {
            update(ctx, *upload_id, |ws| Ok(ws.unrelease()?))
        }
        UploadCommands::Delete { upload_id, purge } => delete_upload(ctx, *upload_id, *purge),
        UploadCommands::Pack { upload_id, force } => pack_upload(ctx, *upload_id, *force),
        UploadCommands::Log { upload_id } => {
            print!("{}", ctx.open(*upload_id)?.read_source_log()?);
            Ok(())
        }
    }
}

/// Load, change, save, then report the new state.
fn update(
    ctx: &mut Context,
    upload_id: u64,
    change: impl FnOnce(&mut Workspace) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut ws = ctx.open(upload_id)?;
    change(&mut ws)?;
    ctx.save(&ws)?;
    println!(
        "Upload {}: {} / {}",
        ws.upload_id(),
        ws.status(),
        ws.lock_state()
    );
    Ok(())
}

fn list_uploads(ctx: &Context) -> anyhow::Result<()> {
    let ids = ctx.store.list_ids()?;
    if ids.is_empty() {
        println!("No upload workspaces found.");
        return Ok(());
    }

    println!(
        "{:<10} {:<20} {:<10} {:<10} {:<7} {:<20}",
        "ID", "OWNER", "STATUS", "LOCK", "FILES", "MODIFIED"
    );
    println!("{}", "-".repeat(82));
    for id in &ids {
        let ws = ctx.open(*id)?;
        println!(
            "{:<10} {:<20} {:<10} {:<10} {:<7} {:<20}",
            ws.upload_id(),
            truncate(ws.owner_user_id(), 18),
            ws.status().to_string(),
            ws.lock_state().to_string(),
            ws.file_count(),
            ws.modified_datetime().format("%Y-%m-%d %H:%M:%S"),
        );
    }
    println!("\n{} upload(s) total.", ids.len());
    Ok(())
}

fn show_upload(ws: &Workspace) -> anyhow::Result<()> {
    println!("Upload:      {}", ws.upload_id());
    println!("Owner:       {}", ws.owner_user_id());
    println!("Status:      {}", ws.status());
    println!("Lock:        {}", ws.lock_state());
    println!("Source type: {}", ws.source_type());
    println!("Readiness:   {}", ws.readiness());
    println!("Files:       {} (+{} ancillary)", ws.file_count(), ws.ancillary_file_count());
    println!("Size:        {} bytes", ws.size_bytes());
    println!("Created:     {}", ws.created_datetime().to_rfc3339());
    println!("Modified:    {}", ws.modified_datetime().to_rfc3339());
    if let Some(last) = ws.last_modified() {
        println!("Content:     {}", last.to_rfc3339());
    }
    if let Some(done) = ws.last_upload().completion_datetime {
        println!("Last check:  {} ({})", done.to_rfc3339(), ws.last_upload().readiness);
    }
    if let Some(single) = ws.get_single_file() {
        println!("Single file: {}", single.path);
    }

    let messages = ws.errors();
    if !messages.is_empty() {
        println!();
        for entry in messages {
            match &entry.path {
                Some(path) => println!("  [{}] {}: {}", entry.severity, path, entry.message),
                None => println!("  [{}] {}", entry.severity, entry.message),
            }
        }
    }
    Ok(())
}

fn delete_upload(ctx: &mut Context, upload_id: u64, purge: bool) -> anyhow::Result<()> {
    let mut ws = ctx.open(upload_id)?;
    ws.delete_workspace()?;
    if purge {
        ctx.store.delete(upload_id)?;
        println!("Deleted upload {} and its record.", upload_id);
    } else {
        ctx.save(&ws)?;
        println!("Deleted upload {}.", upload_id);
    }
    Ok(())
}

fn pack_upload(ctx: &mut Context, upload_id: u64, force: bool) -> anyhow::Result<()> {
    let mut ws = ctx.open(upload_id)?;
    let key = if force {
        ws.pack_source_package()?
    } else {
        ws.ensure_source_package()?
    };
    ctx.save(&ws)?;
    println!("Package:  {}", ws.get_full_path(&key)?.display());
    println!("Checksum: {}", ws.source_package_checksum()?);
    Ok(())
}
