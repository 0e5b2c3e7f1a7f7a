// checking.rs — Checker and CheckingStrategy traits, plus the synchronous
// fixed-point strategy.
//
// Checkers may create, rename, or remove files, so a strategy keeps running
// passes until no unchecked files remain. A checker that removes or renames
// the file it was handed returns the file's new key; the strategy also
// notices a removal on its own if a checker forgets to.

use std::fmt;

use crate::error::WorkspaceError;
use crate::file::FileKey;
use crate::index::Partition;
use crate::workspace::Workspace;

/// Outcome of a checker that did not hand back a (possibly new) key.
#[derive(Debug)]
pub enum CheckError {
    /// Skip the remaining checkers for this file. Not a failure.
    Stop(String),
    /// Something went wrong; aborts the whole run.
    Failed(WorkspaceError),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::Stop(reason) => write!(f, "stop check: {}", reason),
            CheckError::Failed(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CheckError {}

impl From<WorkspaceError> for CheckError {
    fn from(err: WorkspaceError) -> Self {
        CheckError::Failed(err)
    }
}

/// A pluggable validation or transformation step.
///
/// Implementations must be `Send + Sync` because the workspace holds them
/// behind `Arc` and may be moved across threads.
pub trait Checker: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Check one file. Returns the key the file has afterwards.
    fn check(&self, workspace: &mut Workspace, file: FileKey) -> Result<FileKey, CheckError>;

    /// Runs once per pass after every file has been through `check`.
    fn check_workspace(&self, _workspace: &mut Workspace) -> Result<(), WorkspaceError> {
        Ok(())
    }
}

/// Decides how checkers are applied to a workspace.
pub trait CheckingStrategy: Send + Sync {
    fn check(
        &self,
        workspace: &mut Workspace,
        checkers: &[std::sync::Arc<dyn Checker>],
    ) -> Result<(), WorkspaceError>;
}

/// Runs checkers one file at a time, in order, until nothing is unchecked.
#[derive(Debug, Clone, Default)]
pub struct SynchronousCheckingStrategy {
    /// Give up with `CheckingDidNotConverge` after this many passes.
    /// `None` runs until convergence.
    pub max_passes: Option<usize>,
}

impl SynchronousCheckingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_passes(max_passes: usize) -> Self {
        Self {
            max_passes: Some(max_passes),
        }
    }
}

/// Where a file ended up after a checker ran. `None` if it disappeared.
fn locate(workspace: &Workspace, key: &FileKey) -> Option<FileKey> {
    if workspace.files().contains_key(key) {
        return Some(key.clone());
    }
    if key.partition != Partition::Removed
        && workspace.files().contains(&key.path, Partition::Removed)
    {
        return Some(FileKey::new(key.path.clone(), Partition::Removed));
    }
    None
}

impl CheckingStrategy for SynchronousCheckingStrategy {
    fn check(
        &self,
        workspace: &mut Workspace,
        checkers: &[std::sync::Arc<dyn Checker>],
    ) -> Result<(), WorkspaceError> {
        let mut passes = 0;
        while workspace.has_unchecked_files() {
            if let Some(max) = self.max_passes {
                if passes >= max {
                    tracing::warn!(
                        upload_id = workspace.upload_id(),
                        passes,
                        "checks did not converge"
                    );
                    return Err(WorkspaceError::CheckingDidNotConverge { passes });
                }
            }
            passes += 1;
            tracing::debug!(upload_id = workspace.upload_id(), pass = passes, "checking pass");

            let keys: Vec<FileKey> = workspace
                .unchecked_files()
                .into_iter()
                .map(|f| f.key())
                .collect();
            for key in keys {
                // An earlier file's checks may have moved or dropped this one.
                match workspace.files().get_key(&key) {
                    Ok(file) if !file.is_checked => {}
                    _ => continue,
                }

                let mut current = key;
                for checker in checkers {
                    match checker.check(workspace, current.clone()) {
                        Ok(next) => current = next,
                        Err(CheckError::Stop(reason)) => {
                            tracing::debug!(
                                checker = checker.name(),
                                file = %current,
                                %reason,
                                "stop check"
                            );
                            if let Some(found) = locate(workspace, &current) {
                                current = found;
                            }
                            break;
                        }
                        Err(CheckError::Failed(err)) => return Err(err),
                    }
                    match locate(workspace, &current) {
                        Some(found) if found.partition == Partition::Removed => {
                            current = found;
                            break;
                        }
                        Some(found) => current = found,
                        None => break,
                    }
                }
                if workspace.files().contains_key(&current) {
                    workspace.set_checked(&current, true)?;
                }
            }

            for checker in checkers {
                checker.check_workspace(workspace)?;
            }
        }
        tracing::debug!(upload_id = workspace.upload_id(), passes, "checks converged");
        Ok(())
    }
}
