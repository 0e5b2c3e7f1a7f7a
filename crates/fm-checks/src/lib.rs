//! # fm-checks
//!
//! Checkers for upload workspaces. Each implements
//! [`fm_workspace::Checker`]; [`default_checkers`] returns them in the
//! order uploads are normally run through.
//!
//! - [`RemoveMacOsxHiddenFiles`] — drops `__MACOSX` directories.
//! - [`RemoveFilesWithLeadingDot`] — drops dotfiles and dot-directories.
//! - [`ZeroLengthFileChecker`] — drops empty files.
//! - [`InferFileType`] — classifies files by name.
//! - [`UnpackCompressedTarFiles`] — extracts tarballs in place.

pub mod cleanup;
pub mod file_type;
pub mod unpack;

use std::sync::Arc;

use fm_workspace::Checker;

pub use cleanup::{RemoveFilesWithLeadingDot, RemoveMacOsxHiddenFiles, ZeroLengthFileChecker};
pub use file_type::{infer_from_name, InferFileType};
pub use unpack::UnpackCompressedTarFiles;

/// The standard checker chain.
pub fn default_checkers() -> Vec<Arc<dyn Checker>> {
    vec![
        Arc::new(RemoveMacOsxHiddenFiles),
        Arc::new(RemoveFilesWithLeadingDot),
        Arc::new(ZeroLengthFileChecker),
        Arc::new(InferFileType),
        Arc::new(UnpackCompressedTarFiles),
    ]
}
