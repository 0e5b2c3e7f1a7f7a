// mod.rs — Shared state for every subcommand: config, storage and the record store.

pub mod checkpoint;
pub mod file;
pub mod upload;

use std::sync::Arc;

use fm_checks::default_checkers;
use fm_workspace::{JsonFileStore, StorageAdapter, Workspace, WorkspaceConfig, WorkspaceStore};

pub struct Context {
    pub config: WorkspaceConfig,
    pub storage: Arc<dyn StorageAdapter>,
    pub store: JsonFileStore,
}

impl Context {
    pub fn new(config: WorkspaceConfig) -> anyhow::Result<Self> {
        let storage = config.build_storage();
        let store = JsonFileStore::new(config.store_path())?;
        Ok(Self {
            config,
            storage,
            store,
        })
    }

    /// A fresh workspace with the next free upload id, already stored.
    pub fn create(&mut self, owner: &str) -> anyhow::Result<Workspace> {
        let upload_id = self.store.next_id()?;
        let mut ws = self.attach(Workspace::new(upload_id, owner, Arc::clone(&self.storage)));
        ws.initialize()?;
        self.store.store(&ws.to_record())?;
        Ok(ws)
    }

    pub fn open(&self, upload_id: u64) -> anyhow::Result<Workspace> {
        let record = self.store.retrieve(upload_id)?;
        Ok(self.attach(Workspace::from_record(record, Arc::clone(&self.storage))))
    }

    pub fn save(&mut self, ws: &Workspace) -> anyhow::Result<()> {
        self.store.update(&ws.to_record())?;
        Ok(())
    }

    fn attach(&self, ws: Workspace) -> Workspace {
        ws.with_config(&self.config).with_checkers(default_checkers())
    }
}

/// Fails when the workspace refuses changes to its files.
pub fn ensure_editable(ws: &Workspace) -> anyhow::Result<()> {
    if ws.is_deleted() {
        anyhow::bail!("upload {} has been deleted", ws.upload_id());
    }
    if ws.is_locked() {
        anyhow::bail!("upload {} is locked", ws.upload_id());
    }
    Ok(())
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
pub(crate) fn test_context(root: &std::path::Path) -> Context {
    let mut config = WorkspaceConfig::default();
    config.storage.base_path = root.join("uploads");
    Context::new(config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn created_workspaces_can_be_reopened() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());

        let first = ctx.create("alice").unwrap();
        let second = ctx.create("bob").unwrap();
        assert_eq!(second.upload_id(), first.upload_id() + 1);

        let reopened = ctx.open(first.upload_id()).unwrap();
        assert_eq!(reopened.owner_user_id(), "alice");
        assert_eq!(reopened.checkers().len(), default_checkers().len());
        assert!(ctx.open(99).is_err());
    }

    #[test]
    fn locked_workspaces_are_not_editable() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path());
        let mut ws = ctx.create("alice").unwrap();
        assert!(ensure_editable(&ws).is_ok());
        ws.lock();
        assert!(ensure_editable(&ws).is_err());
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("main.tex", 20), "main.tex");
        assert_eq!(truncate("a-very-long-file-name.tex", 10), "a-very-...");
    }
}
