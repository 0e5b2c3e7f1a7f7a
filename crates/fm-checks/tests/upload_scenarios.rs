//! Uploads run through the default checker chain.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use fm_checks::default_checkers;
use fm_workspace::{
    CreateOptions, FileFilter, FileKey, FileType, Partition, Readiness, SimpleStorageAdapter,
    Workspace,
};
use pretty_assertions::assert_eq;
use tar::{Builder, EntryType, Header};
use tempfile::tempdir;

fn workspace(dir: &Path) -> Workspace {
    let mut ws = Workspace::new(1234, "98765", Arc::new(SimpleStorageAdapter::new(dir)))
        .with_checkers(default_checkers());
    ws.initialize().unwrap();
    ws
}

fn add_member<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(EntryType::Regular);
    builder.append_data(&mut header, name, data).unwrap();
}

fn add_text_members<W: Write>(builder: &mut Builder<W>, members: &[(&str, &str)]) {
    for (name, text) in members {
        add_member(builder, name, text.as_bytes());
    }
}

/// Writes a member whose name goes straight into the header bytes.
fn append_raw_name<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) {
    let mut header = Header::new_old();
    {
        let bytes = &mut header.as_old_mut().name;
        bytes[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

/// Upload raw bytes as a new source file.
fn upload(ws: &mut Workspace, path: &str, content: &[u8]) -> FileKey {
    let key = ws.create(path, CreateOptions::default()).unwrap();
    ws.write_file(&key, content).unwrap();
    key
}

fn gz_archive(build: impl FnOnce(&mut Builder<GzEncoder<Vec<u8>>>)) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    build(&mut builder);
    builder.into_inner().unwrap().finish().unwrap()
}

#[test]
fn tarball_with_escaping_member_unpacks_the_rest() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(&dir.path().join("storage"));
    let archive = gz_archive(|builder| {
        for i in 0..100 {
            let name = format!("sec/part{:03}.tex", i);
            add_member(builder, &name, format!("part {}", i).as_bytes());
        }
        append_raw_name(builder, "../evil", b"pwned");
    });
    upload(&mut ws, "a.tar.gz", &archive);
    ws.perform_checks().unwrap();

    let files = ws.iter_files(FileFilter::default());
    assert_eq!(files.len(), 100);
    assert!(files.iter().all(|f| f.file_type == FileType::Tex));
    assert!(!dir.path().join("storage/1234/evil").exists());
    assert!(dir.path().join("storage/1234/src/sec/part000.tex").exists());

    let packed = ws.get("a.tar.gz", Partition::Removed).unwrap();
    assert_eq!(packed.reason_for_removal.as_deref(), Some("Removed packed file 'a.tar.gz'."));
    assert!(packed
        .errors
        .iter()
        .any(|e| e.message == "Member of file a.tar.gz tried to escape workspace."));
    assert_eq!(ws.readiness(), Readiness::Ready);
    assert!(!ws.has_unchecked_files());

    let log = ws.read_source_log().unwrap();
    assert!(log.contains("***** unpack GZIPPED a.tar.gz to dir:"));
    assert!(log.contains("Removed packed file a.tar.gz"));
}

#[test]
fn nested_archives_unpack_on_later_passes() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());

    let mut inner = Builder::new(Vec::new());
    add_text_members(&mut inner, &[("deep/main.tex", "\\documentclass{article}")]);
    let inner = inner.into_inner().unwrap();
    let outer = gz_archive(|builder| {
        add_member(builder, "inner.tar", &inner);
        add_text_members(builder, &[("refs.bib", "@book{x}")]);
    });
    upload(&mut ws, "upload/outer.tgz", &outer);
    ws.perform_checks().unwrap();

    assert!(ws.exists("upload/deep/main.tex", Partition::Source));
    assert!(ws.exists("upload/refs.bib", Partition::Source));
    assert!(ws.exists("upload/inner.tar", Partition::Removed));
    assert!(ws.exists("upload/outer.tgz", Partition::Removed));
    assert_eq!(
        ws.get("upload/refs.bib", Partition::Source).unwrap().file_type,
        FileType::Bibtex
    );
    assert_eq!(ws.file_count(), 2);
    assert!(!ws.has_unchecked_files());
}

#[test]
fn cleanup_checks_run_on_unpacked_content() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    let archive = gz_archive(|builder| {
        add_text_members(
            builder,
            &[
                ("main.tex", "tex"),
                ("__MACOSX/._main.tex", "fork"),
                (".DS_Store", "junk"),
                ("empty.txt", ""),
            ],
        );
    });
    upload(&mut ws, "bundle.tar.gz", &archive);
    ws.perform_checks().unwrap();

    let active: Vec<&str> = ws
        .iter_files(FileFilter::default())
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(active, vec!["main.tex"]);
    assert!(ws.exists("__MACOSX/", Partition::Removed));
    assert!(ws.exists(".DS_Store", Partition::Removed));
    assert!(ws.exists("empty.txt", Partition::Removed));
    assert_eq!(ws.readiness(), Readiness::Ready);
}

#[test]
fn symlink_member_leaves_a_warning() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    let archive = gz_archive(|builder| {
        add_member(builder, "main.tex", b"tex");
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, "passwd", "/etc/passwd").unwrap();
    });
    upload(&mut ws, "links.tar.gz", &archive);
    ws.perform_checks().unwrap();

    let packed = ws.get("links.tar.gz", Partition::Removed).unwrap();
    assert!(packed
        .errors
        .iter()
        .any(|e| e.message == "Symbolic links are not allowed. Removing passwd"));
    assert!(!ws.exists("passwd", Partition::Source));
    assert!(!dir.path().join("1234/src/passwd").exists());
}

#[test]
fn bzip2_tarball_is_unpacked() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    let mut builder = Builder::new(BzEncoder::new(Vec::new(), bzip2::Compression::fast()));
    add_text_members(
        &mut builder,
        &[("main.tex", "\\documentclass{article}"), ("figs/plot.eps", "%!PS")],
    );
    let archive = builder.into_inner().unwrap().finish().unwrap();
    upload(&mut ws, "src.tar.bz2", &archive);
    ws.perform_checks().unwrap();

    assert!(ws.exists("main.tex", Partition::Source));
    assert!(ws.exists("figs/plot.eps", Partition::Source));
    let packed = ws.get("src.tar.bz2", Partition::Removed).unwrap();
    assert_eq!(packed.file_type, FileType::Bzip2);
    assert!(packed.errors.iter().all(|e| !e.is_fatal()));
    assert_eq!(ws.readiness(), Readiness::Ready);
    assert!(ws.read_source_log().unwrap().contains("***** unpack BZIP2 src.tar.bz2 to dir:"));
}

#[test]
fn unreadable_tarball_is_a_fatal_error() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    upload(&mut ws, "broken.tar.gz", b"definitely not a tarball");
    ws.perform_checks().unwrap();

    let file = ws.get("broken.tar.gz", Partition::Source).unwrap();
    assert_eq!(file.errors[0].message, "Unable to read tar broken.tar.gz");
    assert_eq!(ws.readiness(), Readiness::Errors);
    assert_eq!(ws.last_upload().readiness, Readiness::Errors);
}

#[test]
fn unknown_names_fail_type_inference() {
    let dir = tempdir().unwrap();
    let mut ws = workspace(dir.path());
    upload(&mut ws, "Makefile", b"all:");
    upload(&mut ws, "anc/notes.txt", b"notes");
    ws.perform_checks().unwrap();

    assert_eq!(ws.get("Makefile", Partition::Source).unwrap().file_type, FileType::Failed);
    assert_eq!(ws.ancillary_file_count(), 1);

    let summary: Vec<&str> = ws
        .last_upload()
        .file_summary
        .iter()
        .map(|s| s.path.as_str())
        .collect();
    assert_eq!(summary, vec!["Makefile", "anc/notes.txt"]);
}
