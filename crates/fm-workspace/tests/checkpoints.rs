//! Checkpoint lifecycle against real storage.

use std::io::Read;
use std::sync::Arc;

use fm_workspace::{
    CreateOptions, FileFilter, FileKey, Partition, Readiness, SimpleStorageAdapter, Workspace,
    WorkspaceError,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn workspace(dir: &std::path::Path) -> Workspace {
    let mut ws = Workspace::new(1234, "98765", Arc::new(SimpleStorageAdapter::new(dir)));
    ws.initialize().unwrap();
    ws
}

fn write(ws: &mut Workspace, path: &str, content: &str) -> FileKey {
    let key = match ws.resolve_public_path(path) {
        Ok(key) if ws.files().contains_key(&key) => key,
        _ => ws.create(path, CreateOptions::default()).unwrap(),
    };
    ws.write_file(&key, content.as_bytes()).unwrap();
    key
}

fn read(ws: &Workspace, path: &str) -> String {
    let key = ws.resolve_public_path(path).unwrap();
    String::from_utf8(ws.read_file(&key).unwrap()).unwrap()
}

#[test]
fn create_list_and_inspect() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "v1");
    let first = ws.create_checkpoint(Some("jdoe")).unwrap();
    write(&mut ws, "main.tex", "second version");
    let second = ws.create_checkpoint(None).unwrap();
    assert_ne!(first, second);

    let listed: Vec<(String, String, u64)> = ws
        .list_checkpoints()
        .into_iter()
        .map(|f| (f.path.clone(), ws.checksum(&f.key()).unwrap(), f.size_bytes))
        .collect();
    assert_eq!(
        listed,
        vec![
            (
                "checkpoint/checkpoint_1_jdoe.tar.gz".to_string(),
                first.clone(),
                ws.get_checkpoint_file_size(&first).unwrap()
            ),
            (
                "checkpoint/checkpoint_2.tar.gz".to_string(),
                second.clone(),
                ws.get_checkpoint_file_size(&second).unwrap()
            ),
        ]
    );
    assert!(ws.exists("checkpoint/checkpoint_1_jdoe.json", Partition::System));
    assert!(ws.checkpoint_file_exists(&first));

    let mut bytes = Vec::new();
    ws.open_checkpoint_file(&second)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    assert_eq!(bytes.len() as u64, ws.get_checkpoint_file_size(&second).unwrap());
    assert!(ws.get_checkpoint_file_last_modified(&second).is_ok());

    let log = ws.read_source_log().unwrap();
    assert!(log.contains("Creating checkpoint. ['jdoe']"));
}

#[test]
fn checkpoints_are_not_public_files() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "v1");
    ws.create_checkpoint(None).unwrap();
    assert_eq!(ws.file_count(), 1);
    assert!(ws.get_public_path(ws.list_checkpoints()[0]).is_err());
}

#[test]
fn empty_workspace_cannot_be_checkpointed() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    let err = ws.create_checkpoint(None).unwrap_err();
    assert!(matches!(err, WorkspaceError::NoSourceFilesToCheckpoint));
    assert!(ws.list_checkpoints().is_empty());
}

#[test]
fn checkpoint_cap_is_enforced() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path()).with_max_checkpoints(2);
    write(&mut ws, "main.tex", "a");
    ws.create_checkpoint(None).unwrap();
    write(&mut ws, "main.tex", "bb");
    ws.create_checkpoint(None).unwrap();
    write(&mut ws, "main.tex", "ccc");

    let err = ws.create_checkpoint(None).unwrap_err();
    assert!(matches!(err, WorkspaceError::CheckpointLimitExceeded { max: 2 }));
    assert_eq!(ws.list_checkpoints().len(), 2);
    assert!(ws
        .read_source_log()
        .unwrap()
        .contains("ERROR: Checkpoint limit of 2 reached."));
}

#[test]
fn failed_checkpoint_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "v1");
    // A directory where the sidecar should go makes the second write fail.
    let blocker = dir.path().join("1234/checkpoint/checkpoint_1.json");
    std::fs::create_dir_all(&blocker).unwrap();

    assert!(ws.create_checkpoint(None).is_err());
    assert!(ws.list_checkpoints().is_empty());
    assert!(!ws.exists("checkpoint/checkpoint_1.tar.gz", Partition::System));
    assert!(!ws.exists("checkpoint/checkpoint_1.json", Partition::System));
    assert!(!dir.path().join("1234/checkpoint/checkpoint_1.tar.gz").exists());
    assert!(ws
        .read_source_log()
        .unwrap()
        .contains("ERROR: Checkpoint checkpoint/checkpoint_1.tar.gz failed:"));

    std::fs::remove_dir(&blocker).unwrap();
    let checksum = ws.create_checkpoint(None).unwrap();
    let names: Vec<&str> = ws.list_checkpoints().iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, vec!["checkpoint/checkpoint_1.tar.gz"]);
    assert!(ws.checkpoint_file_exists(&checksum));
}

#[test]
fn user_name_with_a_slash_stays_flat() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "v1");
    let checksum = ws.create_checkpoint(Some("a/b")).unwrap();

    let names: Vec<&str> = ws.list_checkpoints().iter().map(|f| f.path.as_str()).collect();
    assert_eq!(names, vec!["checkpoint/checkpoint_1_a_b.tar.gz"]);
    assert!(dir.path().join("1234/checkpoint/checkpoint_1_a_b.json").is_file());
    assert!(!dir.path().join("1234/checkpoint/checkpoint_1_a").exists());
    ws.delete_checkpoint(&checksum, None).unwrap();
    assert!(ws.list_checkpoints().is_empty());
}

#[test]
fn numbering_continues_after_a_delete() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "a");
    let first = ws.create_checkpoint(None).unwrap();
    write(&mut ws, "main.tex", "bb");
    ws.create_checkpoint(None).unwrap();

    ws.delete_checkpoint(&first, Some("admin")).unwrap();
    assert!(!ws.exists("checkpoint/checkpoint_1.tar.gz", Partition::System));
    assert!(!ws.exists("checkpoint/checkpoint_1.json", Partition::System));
    assert!(!dir.path().join("1234/checkpoint/checkpoint_1.json").exists());

    write(&mut ws, "main.tex", "ccc");
    ws.create_checkpoint(None).unwrap();
    let names: Vec<&str> = ws.list_checkpoints().iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        names,
        vec!["checkpoint/checkpoint_2.tar.gz", "checkpoint/checkpoint_3.tar.gz"]
    );
    assert!(ws
        .read_source_log()
        .unwrap()
        .contains("Deleted checkpoint: checkpoint/checkpoint_1.tar.gz ['admin']"));
}

#[test]
fn delete_all_checkpoints_forgets_every_checksum() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "a");
    let first = ws.create_checkpoint(None).unwrap();
    write(&mut ws, "main.tex", "bb");
    let second = ws.create_checkpoint(None).unwrap();

    ws.delete_all_checkpoints(None).unwrap();
    assert!(ws.list_checkpoints().is_empty());
    for checksum in [&first, &second] {
        assert!(!ws.checkpoint_file_exists(checksum));
        assert!(ws.get_checkpoint_file(checksum).unwrap_err().is_not_found());
    }
    assert!(ws.delete_checkpoint(&first, None).unwrap_err().is_not_found());
    assert!(ws.read_source_log().unwrap().contains("Deleted ALL checkpoints"));
}

#[test]
fn restore_brings_back_tree_and_warnings() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    let main = write(&mut ws, "main.tex", "original");
    write(&mut ws, "anc/notes.txt", "notes");
    ws.add_warning(&main, "check the preamble", true).unwrap();
    ws.add_non_file_warning("workspace note", true);
    let checksum = ws.create_checkpoint(Some("jdoe")).unwrap();

    write(&mut ws, "main.tex", "rewritten");
    write(&mut ws, "extra.tex", "new");
    let anc = ws.resolve_public_path("anc/notes.txt").unwrap();
    ws.delete(&anc).unwrap();
    ws.add_non_file_warning("later note", true);

    ws.restore_checkpoint(&checksum, Some("admin")).unwrap();

    assert_eq!(read(&ws, "main.tex"), "original");
    assert_eq!(read(&ws, "anc/notes.txt"), "notes");
    assert!(!ws.exists("extra.tex", Partition::Source));
    assert!(!dir.path().join("1234/src/extra.tex").exists());

    let main = ws.get("main.tex", Partition::Source).unwrap();
    assert!(main.is_persisted);
    assert_eq!(main.errors[0].message, "check the preamble");
    let messages: Vec<&str> = ws.warnings().iter().map(|w| w.message.as_str()).collect();
    assert!(messages.contains(&"workspace note"));
    assert!(!messages.contains(&"later note"));

    // The checkpoint itself survives the restore.
    assert!(ws.checkpoint_file_exists(&checksum));
    assert!(ws
        .read_source_log()
        .unwrap()
        .contains("Restored checkpoint: checkpoint/checkpoint_1_jdoe.tar.gz ['admin']"));
}

fn triples(ws: &Workspace) -> Vec<(String, String, u64)> {
    ws.iter_files(FileFilter::default())
        .into_iter()
        .map(|f| (ws.get_public_path(f).unwrap(), ws.checksum(&f.key()).unwrap(), f.size_bytes))
        .collect()
}

#[test]
fn restore_round_trips_names_checksums_and_sizes() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "\\documentclass{article}");
    write(&mut ws, "sec/intro.tex", "Intro");
    write(&mut ws, "figs/plot.eps", "%!PS");
    write(&mut ws, "anc/data.csv", "1,2,3");
    let captured = triples(&ws);
    let checksum = ws.create_checkpoint(None).unwrap();

    write(&mut ws, "sec/intro.tex", "Rewritten intro");
    let plot = ws.resolve_public_path("figs/plot.eps").unwrap();
    ws.remove(&plot, None).unwrap();
    write(&mut ws, "sec/extra.tex", "extra");

    ws.restore_checkpoint(&checksum, None).unwrap();
    assert_eq!(triples(&ws), captured);
}

#[test]
fn restore_of_unknown_checksum_is_a_workspace_error() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    write(&mut ws, "main.tex", "original");

    let err = ws.restore_checkpoint("no-such-checksum", None).unwrap_err();
    assert!(err.is_not_found());
    let fatal: Vec<&str> = ws.fatal_errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(fatal, vec!["Unable to restore checkpoint. Not found."]);
    assert_eq!(ws.readiness(), Readiness::Errors);
    assert_eq!(read(&ws, "main.tex"), "original");
}
