// unpack.rs — UnpackCompressedTarFiles: extract uploaded tarballs in place.
//
// Extracted files are registered unchecked, so the checking strategy picks
// them up on its next pass; nested archives unpack the same way. A tarball
// that unpacked cleanly is moved to the removed partition. One that failed
// stays where it is with warnings explaining why.

use fm_workspace::{CheckError, Checker, FileKey, FileType, Severity, SkipReason, Workspace};

/// Extracts TAR, GZIPPED and BZIP2 files next to themselves.
#[derive(Debug, Default)]
pub struct UnpackCompressedTarFiles;

fn is_packed(file_type: FileType) -> bool {
    matches!(file_type, FileType::Tar | FileType::Gzipped | FileType::Bzip2)
}

impl Checker for UnpackCompressedTarFiles {
    fn name(&self) -> &str {
        "UnpackCompressedTarFiles"
    }

    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError> {
        let record = workspace.file(&file)?;
        if record.is_directory || !is_packed(record.file_type) {
            return Ok(file);
        }
        let name = record.name().to_string();
        let file_type = record.file_type;
        let dir = record.dir().to_string();
        let is_persisted = record.is_persisted;

        if !workspace.is_tarfile(&file) {
            workspace.add_error(&file, format!("Unable to read tar {}", name), Severity::Fatal, true)?;
            return Ok(file);
        }

        let target = workspace
            .storage()
            .partition_root(workspace.paths(), file.partition, is_persisted)
            .join(dir);
        workspace.log_info(&format!(
            "***** unpack {} {} to dir: {}",
            file_type,
            file.path,
            target.display()
        ));

        let report = match workspace.unpack_tarball(&file) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(file = %file, error = %err, "unpack failed");
                workspace.add_warning(
                    &file,
                    format!(
                        "There were problems unpacking '{}'. Please try again and confirm your files.",
                        name
                    ),
                    true,
                )?;
                workspace.add_warning(&file, format!("Tar error message: {}", err), true)?;
                return Ok(file);
            }
        };

        for skipped in &report.skipped {
            match skipped.reason {
                SkipReason::EscapesRoot => {
                    workspace.log_info(&format!("Member of file {} tried to escape workspace.", name));
                    workspace.add_warning(
                        &file,
                        format!("Member of file {} tried to escape workspace.", name),
                        true,
                    )?;
                }
                reason => {
                    workspace.add_warning(
                        &file,
                        format!("{} are not allowed. Removing {}", reason.describe(), skipped.name),
                        true,
                    )?;
                }
            }
        }

        let removed = workspace.remove(&file, Some(&format!("Removed packed file '{}'.", name)))?;
        workspace.log_info(&format!("Removed packed file {}", name));
        Ok(removed)
    }
}
