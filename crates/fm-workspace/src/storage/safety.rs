// safety.rs — Containment checks for paths about to touch the disk.

use std::env;
use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

/// Make a configured root absolute and free of `.`/`..` components.
pub fn normalize_root(root: impl AsRef<Path>) -> PathBuf {
    let root = root.as_ref();
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(root),
            Err(_) => root.to_path_buf(),
        }
    };
    absolute.clean()
}

/// True if `candidate` stays inside `root`.
///
/// The check is lexical first. If part of the candidate already exists
/// inside the root, its canonical form must also stay inside the root's
/// canonical form, so a planted symlink cannot redirect writes. Any
/// failure to canonicalize counts as unsafe.
pub fn is_contained(candidate: &Path, root: &Path) -> bool {
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    let root = root.clean();
    let candidate = candidate.clean();
    if !candidate.starts_with(&root) {
        return false;
    }

    let existing = match candidate
        .ancestors()
        .find(|p| p.symlink_metadata().is_ok())
    {
        Some(p) => p,
        None => return true,
    };
    if !existing.starts_with(&root) {
        // Nothing inside the root exists yet.
        return true;
    }
    match (existing.canonicalize(), root.canonicalize()) {
        (Ok(existing), Ok(root)) => existing.starts_with(root),
        _ => false,
    }
}
