#![cfg(unix)]

use rerename_core::{
    ErrorKind, Filesystem, OsFilesystem, Platform, Rule, Session, SessionConfig, UndoOutcome,
};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const EXDEV: i32 = 18;

/// Every rename fails as if source and target sat on different devices.
struct CrossDevice {
    copy_fails: bool,
}

impl Filesystem for CrossDevice {
    fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(EXDEV))
    }

    fn exists(&self, path: &Path) -> bool {
        OsFilesystem.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        OsFilesystem.is_dir(path)
    }

    fn list_directory(&self, dir: &Path) -> io::Result<BTreeSet<String>> {
        OsFilesystem.list_directory(dir)
    }

    fn copy_verified(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.copy_fails {
            fs::write(to, "partial")?;
            return Err(io::Error::other("device full"));
        }
        OsFilesystem.copy_verified(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.remove(path)
    }
}

fn session(copy_fails: bool) -> Session {
    Session::with_filesystem(
        SessionConfig::default().with_platform(Platform::Linux),
        Arc::new(CrossDevice { copy_fails }),
    )
}

#[test]
fn test_file_moves_by_copy_and_undoes() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("old.txt");
    fs::write(&source, "payload").unwrap();

    let mut session = session(false);
    session.add_paths([&source]);
    session.set_rule(Rule::literal("old", "new")).unwrap();
    let report = session.apply().unwrap();
    assert_eq!(report.renamed(), 1);

    let target = temp.path().join("new.txt");
    assert!(!source.exists());
    assert_eq!(fs::read_to_string(&target).unwrap(), "payload");

    let UndoOutcome::Renames(undo) = session.undo().unwrap() else {
        panic!("expected a rename undo");
    };
    assert!(undo.is_complete());
    assert_eq!(fs::read_to_string(&source).unwrap(), "payload");
    assert!(!target.exists());
}

#[test]
fn test_folder_moves_by_recursive_copy() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("old_dir");
    fs::create_dir_all(source.join("nested")).unwrap();
    fs::write(source.join("nested/a.txt"), "a").unwrap();
    fs::write(source.join("b.txt"), "b").unwrap();

    let mut session = session(false);
    session.add_paths([&source]);
    session.set_rule(Rule::literal("old", "new")).unwrap();
    session.apply().unwrap();

    let target = temp.path().join("new_dir");
    assert!(!source.exists());
    assert_eq!(fs::read_to_string(target.join("nested/a.txt")).unwrap(), "a");
    assert_eq!(fs::read_to_string(target.join("b.txt")).unwrap(), "b");
}

#[test]
fn test_failed_copy_leaves_source_intact() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("old.txt");
    fs::write(&source, "payload").unwrap();

    let mut session = session(true);
    session.add_paths([&source]);
    session.set_rule(Rule::literal("old", "new")).unwrap();
    let report = session.apply().unwrap();

    assert_eq!(report.renamed(), 0);
    let failures: Vec<_> = report.execution.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1.kind(), ErrorKind::CrossVolumeFailure);

    assert_eq!(fs::read_to_string(&source).unwrap(), "payload");
    assert!(!temp.path().join("new.txt").exists());
    // Only the add is left to undo
    assert_eq!(session.undo_depth(), 1);
}
