// file.rs — File subcommands: add local files, list, re-check, remove and delete.
//
// Every command that changes files refuses locked or deleted workspaces and
// saves the record back to the store when it is done.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Subcommand;
use fm_workspace::{CreateOptions, FileFilter, FileKey, Workspace};

use super::{ensure_editable, truncate, Context};

#[derive(Subcommand)]
pub enum FileCommands {
    /// Copy local files into a workspace and run the checks.
    Add {
        upload_id: u64,
        /// Local files to add.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory inside the workspace (e.g. "figs/").
        #[arg(long, default_value = "")]
        dir: String,
        /// Add as ancillary files.
        #[arg(long)]
        ancillary: bool,
        /// Overwrite files that already exist.
        #[arg(long)]
        replace: bool,
    },
    /// List files.
    Ls {
        upload_id: u64,
        /// Include removed files.
        #[arg(long)]
        removed: bool,
        /// Include directories.
        #[arg(long)]
        dirs: bool,
    },
    /// Run every check again over every file.
    Check { upload_id: u64 },
    /// Move a file out of the source tree, keeping its content.
    Remove {
        upload_id: u64,
        path: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Delete a file (or directory) outright.
    Delete { upload_id: u64, path: String },
    /// Rename (move) a file or directory.
    Rename {
        upload_id: u64,
        from: String,
        to: String,
    },
    /// Move all quarantined content to permanent storage.
    Persist { upload_id: u64 },
}

pub fn execute(cmd: &FileCommands, ctx: &mut Context) -> anyhow::Result<()> {
    match cmd {
        FileCommands::Add {
            upload_id,
            files,
            dir,
            ancillary,
            replace,
        } => modify(ctx, *upload_id, |ws| {
            add_files(ws, files, dir, *ancillary, *replace)?;
            print_check_summary(ws)
        }),
        FileCommands::Ls {
            upload_id,
            removed,
            dirs,
        } => list_files(&ctx.open(*upload_id)?, *removed, *dirs),
        FileCommands::Check { upload_id } => modify(ctx, *upload_id, |ws| {
            recheck_all(ws)?;
            print_check_summary(ws)
        }),
        FileCommands::Remove {
            upload_id,
            path,
            reason,
        } => modify(ctx, *upload_id, |ws| {
            let key = existing_key(ws, path)?;
            ws.remove(&key, reason.as_deref())?;
            println!("Removed {}", path);
            Ok(())
        }),
        FileCommands::Delete { upload_id, path } => modify(ctx, *upload_id, |ws| {
            let key = existing_key(ws, path)?;
            ws.delete(&key)?;
            println!("Deleted {}", path);
            Ok(())
        }),
        FileCommands::Rename {
            upload_id,
            from,
            to,
        } => modify(ctx, *upload_id, |ws| {
            let key = existing_key(ws, from)?;
            let target = ws.resolve_public_path(to)?;
            if target.partition != key.partition {
                anyhow::bail!("cannot move '{}' between source and ancillary files", from);
            }
            ws.rename(&key, &target.path)?;
            println!("Renamed {} -> {}", from, to);
            Ok(())
        }),
        FileCommands::Persist { upload_id } => modify(ctx, *upload_id, |ws| {
            ws.persist_all()?;
            println!("Persisted upload {}", ws.upload_id());
            Ok(())
        }),
    }
}

fn modify(
    ctx: &mut Context,
    upload_id: u64,
    change: impl FnOnce(&mut Workspace) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut ws = ctx.open(upload_id)?;
    ensure_editable(&ws)?;
    change(&mut ws)?;
    ctx.save(&ws)
}

fn existing_key(ws: &Workspace, public_path: &str) -> anyhow::Result<FileKey> {
    let key = ws.resolve_public_path(public_path)?;
    ws.file(&key)?;
    Ok(key)
}

/// Public path for a local file dropped into `dir`.
fn target_path(local: &Path, dir: &str, ancillary: bool) -> anyhow::Result<String> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a file name: {}", local.display()))?;
    let dir = dir.trim_matches('/');
    let mut path = String::new();
    if ancillary {
        path.push_str("anc/");
    }
    if !dir.is_empty() {
        path.push_str(dir);
        path.push('/');
    }
    path.push_str(name);
    Ok(path)
}

fn add_files(
    ws: &mut Workspace,
    files: &[PathBuf],
    dir: &str,
    ancillary: bool,
    replace: bool,
) -> anyhow::Result<()> {
    for local in files {
        let public = target_path(local, dir, ancillary)?;
        let key = ws.resolve_public_path(&public)?;
        if ws.files().contains_key(&key) {
            if !replace {
                anyhow::bail!("'{}' already exists (use --replace)", public);
            }
            ws.set_checked(&key, false)?;
        } else {
            ws.create(&public, CreateOptions::default())?;
        }
        let mut source =
            File::open(local).with_context(|| format!("failed to open {}", local.display()))?;
        let bytes = ws.with_writer(&key, false, |out| io::copy(&mut source, out))?;
        tracing::info!(upload_id = ws.upload_id(), path = %public, bytes, "added file");
    }
    ws.perform_checks()?;
    Ok(())
}

fn recheck_all(ws: &mut Workspace) -> anyhow::Result<()> {
    let keys: Vec<FileKey> = ws
        .iter_files(FileFilter::default().directories(true))
        .into_iter()
        .map(|f| f.key())
        .collect();
    for key in &keys {
        ws.set_checked(key, false)?;
    }
    ws.perform_checks()?;
    Ok(())
}

fn print_check_summary(ws: &Workspace) -> anyhow::Result<()> {
    let last = ws.last_upload();
    for entry in &last.file_summary {
        println!(
            "  {:<40} {:<12} {:>10}",
            truncate(&entry.path, 40),
            entry.file_type.to_string(),
            entry.size_bytes
        );
    }
    for entry in &last.logs {
        match &entry.path {
            Some(path) => println!("  [{}] {}: {}", entry.severity, path, entry.message),
            None => println!("  [{}] {}", entry.severity, entry.message),
        }
    }
    println!("Readiness: {}", last.readiness);
    Ok(())
}

fn list_files(ws: &Workspace, removed: bool, dirs: bool) -> anyhow::Result<()> {
    let filter = FileFilter::default().removed(removed).directories(dirs);
    let files = ws.iter_files(filter);
    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }

    println!(
        "{:<40} {:<12} {:>10} {:<20} {:<8}",
        "PATH", "TYPE", "SIZE", "MODIFIED", "STATE"
    );
    println!("{}", "-".repeat(94));
    for f in &files {
        let path = if f.is_removed {
            f.path.clone()
        } else {
            ws.get_public_path(f)?
        };
        let state = if f.is_removed {
            "removed"
        } else if f.has_errors() {
            "errors"
        } else if f.has_warnings() {
            "warnings"
        } else {
            "ok"
        };
        println!(
            "{:<40} {:<12} {:>10} {:<20} {:<8}",
            truncate(&path, 40),
            f.file_type.to_string(),
            f.size_bytes,
            f.last_modified.format("%Y-%m-%d %H:%M:%S"),
            state
        );
    }
    println!("\n{} file(s), {} bytes.", files.len(), ws.size_bytes());
    Ok(())
}
