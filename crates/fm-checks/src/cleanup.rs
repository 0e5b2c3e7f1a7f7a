// cleanup.rs — Checkers that move unwanted files out of the source tree.
//
// Each one leaves a warning on the file and then removes it, so the
// warning travels with the file into the removed partition and does not
// count against readiness.

use fm_workspace::{CheckError, Checker, FileKey, Workspace};

/// Removes `__MACOSX` directories (resource forks from macOS archives).
#[derive(Debug, Default)]
pub struct RemoveMacOsxHiddenFiles;

impl Checker for RemoveMacOsxHiddenFiles {
    fn name(&self) -> &str {
        "RemoveMacOSXHiddenFiles"
    }

    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError> {
        let record = workspace.file(&file)?;
        if !(record.is_directory && record.name() == "__MACOSX") {
            return Ok(file);
        }
        workspace.add_warning(&file, "Removed '__MACOSX' directory.", true)?;
        Ok(workspace.remove(&file, None)?)
    }
}

/// Removes files and directories whose name starts with a dot.
#[derive(Debug, Default)]
pub struct RemoveFilesWithLeadingDot;

impl Checker for RemoveFilesWithLeadingDot {
    fn name(&self) -> &str {
        "RemoveFilesWithLeadingDot"
    }

    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError> {
        let record = workspace.file(&file)?;
        if !(record.name().starts_with('.') || record.path.starts_with('.')) {
            return Ok(file);
        }
        let reason = format!("Removed file '{}' [File not allowed].", record.name());
        workspace.add_warning(&file, "Hidden file are not allowed.", true)?;
        Ok(workspace.remove(&file, Some(&reason))?)
    }
}

/// Removes empty files.
#[derive(Debug, Default)]
pub struct ZeroLengthFileChecker;

impl Checker for ZeroLengthFileChecker {
    fn name(&self) -> &str {
        "ZeroLengthFileChecker"
    }

    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError> {
        let record = workspace.file(&file)?;
        if record.is_directory || !record.is_empty() {
            return Ok(file);
        }
        let name = record.name().to_string();
        workspace.add_warning(&file, format!("File '{}' is empty (size is zero).", name), true)?;
        let reason = format!("Removed file '{}' [file is empty].", name);
        Ok(workspace.remove(&file, Some(&reason))?)
    }
}
