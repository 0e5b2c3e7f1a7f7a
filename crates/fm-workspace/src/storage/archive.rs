// archive.rs — In-process tar/gzip packing and guarded unpacking.
//
// Archives are packed as gzip. Unpacking also accepts plain and bzip2 tars,
// chosen by magic bytes rather than by name.
//
// Packing walks partition roots in sorted order so the same tree always
// produces the same member order. Unpacking reads one member at a time:
// members that would land outside the destination are skipped, links and
// device nodes are skipped, and member count and total size are capped.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, EntryType};
use walkdir::WalkDir;

use super::safety::is_contained;
use crate::error::WorkspaceError;

/// Caps applied while unpacking an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_unpacked_bytes")]
    pub max_unpacked_bytes: u64,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_unpacked_bytes() -> u64 {
    1024 * 1024 * 1024
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_unpacked_bytes: default_max_unpacked_bytes(),
        }
    }
}

/// Why a member was not extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EscapesRoot,
    SymbolicLink,
    HardLink,
    CharacterDevice,
    BlockDevice,
    Fifo,
    Unsupported,
}

impl SkipReason {
    /// Plural noun used in submitter-facing warnings.
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::EscapesRoot => "Members outside the workspace",
            SkipReason::SymbolicLink => "Symbolic links",
            SkipReason::HardLink => "Hard links",
            SkipReason::CharacterDevice => "Character devices",
            SkipReason::BlockDevice => "Block devices",
            SkipReason::Fifo => "FIFO devices",
            SkipReason::Unsupported => "Special entries",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMember {
    pub name: String,
    pub reason: SkipReason,
}

/// What an unpack produced. Paths are relative to the destination;
/// directories end with `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    pub extracted: Vec<String>,
    pub skipped: Vec<SkippedMember>,
}

fn archive_error(path: &Path, reason: impl ToString) -> WorkspaceError {
    WorkspaceError::ArchiveError {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Open an archive, decompressing gzip or bzip2 when the magic bytes say so.
fn open_reader(path: &Path) -> Result<Box<dyn Read>, WorkspaceError> {
    let file = File::open(path).map_err(|source| WorkspaceError::io(path, source))?;
    let mut reader = BufReader::new(file);
    let (is_gzip, is_bzip2) = {
        let head = reader
            .fill_buf()
            .map_err(|source| WorkspaceError::io(path, source))?;
        (head.starts_with(GZIP_MAGIC), head.starts_with(BZIP2_MAGIC))
    };
    if is_gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else if is_bzip2 {
        Ok(Box::new(MultiBzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// True if the file reads as a (possibly compressed) tar with at least one
/// valid member.
pub fn is_tarfile(path: &Path) -> bool {
    let reader = match open_reader(path) {
        Ok(reader) => reader,
        Err(_) => return false,
    };
    let mut archive = Archive::new(reader);
    let valid = match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    };
    valid
}

/// Write a gzipped tar of every entry under each root to `target`.
///
/// Member names are relative to their root. When two roots hold the same
/// relative path, the first root wins. Symlinks are not followed or stored.
/// Returns the number of members written.
pub fn pack_dirs(roots: &[PathBuf], target: &Path) -> Result<usize, WorkspaceError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
    }
    let file = File::create(target).map_err(|source| WorkspaceError::io(target, source))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut count = 0;
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| archive_error(root, e))?;
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            if !seen.insert(rel.clone()) {
                continue;
            }
            let file_type = entry.file_type();
            let appended = if file_type.is_dir() {
                builder.append_dir(&rel, entry.path())
            } else if file_type.is_file() {
                builder.append_path_with_name(entry.path(), &rel)
            } else {
                tracing::debug!(path = %entry.path().display(), "not packing special file");
                continue;
            };
            appended.map_err(|source| WorkspaceError::io(entry.path(), source))?;
            count += 1;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|source| WorkspaceError::io(target, source))?;
    encoder
        .finish()
        .map_err(|source| WorkspaceError::io(target, source))?;
    tracing::debug!(target = %target.display(), members = count, "packed archive");
    Ok(count)
}

/// Extract `archive_path` into `dest`, one member at a time.
///
/// Exceeding `limits` aborts with `ArchiveError`; members already written
/// stay on disk. A corrupt archive is also an `ArchiveError`.
pub fn unpack(
    archive_path: &Path,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<UnpackReport, WorkspaceError> {
    fs::create_dir_all(dest).map_err(|source| WorkspaceError::io(dest, source))?;
    let reader = open_reader(archive_path)?;
    let mut archive = Archive::new(reader);
    let mut report = UnpackReport::default();
    let mut members = 0usize;
    let mut total_bytes = 0u64;

    let entries = archive
        .entries()
        .map_err(|e| archive_error(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(archive_path, e))?;
        members += 1;
        if members > limits.max_entries {
            return Err(archive_error(
                archive_path,
                format!("more than {} members", limits.max_entries),
            ));
        }

        let raw = entry
            .path()
            .map_err(|e| archive_error(archive_path, e))?
            .into_owned();
        let name = raw.to_string_lossy().into_owned();
        let rel = raw.clean();
        if rel.as_os_str().is_empty() || rel == Path::new(".") {
            continue;
        }
        let escapes = raw.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        let target = dest.join(&rel);
        if escapes || !is_contained(&target, dest) {
            tracing::warn!(archive = %archive_path.display(), member = %name, "member escapes extraction root");
            report.skipped.push(SkippedMember {
                name,
                reason: SkipReason::EscapesRoot,
            });
            continue;
        }
        let rel_name = rel.to_string_lossy().into_owned();

        let kind = entry.header().entry_type();
        let reason = match kind {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|source| WorkspaceError::io(&target, source))?;
                report.extracted.push(format!("{}/", rel_name));
                continue;
            }
            EntryType::Regular | EntryType::Continuous => {
                total_bytes = total_bytes.saturating_add(entry.size());
                if total_bytes > limits.max_unpacked_bytes {
                    return Err(archive_error(
                        archive_path,
                        format!("unpacked size exceeds {} bytes", limits.max_unpacked_bytes),
                    ));
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|source| WorkspaceError::io(parent, source))?;
                }
                let mut out =
                    File::create(&target).map_err(|source| WorkspaceError::io(&target, source))?;
                io::copy(&mut entry, &mut out)
                    .map_err(|source| WorkspaceError::io(&target, source))?;
                report.extracted.push(rel_name);
                continue;
            }
            EntryType::Symlink => SkipReason::SymbolicLink,
            EntryType::Link => SkipReason::HardLink,
            EntryType::Char => SkipReason::CharacterDevice,
            EntryType::Block => SkipReason::BlockDevice,
            EntryType::Fifo => SkipReason::Fifo,
            _ => SkipReason::Unsupported,
        };
        tracing::debug!(member = %name, ?reason, "skipping tar member");
        report.skipped.push(SkippedMember { name, reason });
    }
    Ok(report)
}
