use rerename_core::{
    compute_preview, CasePolicy, ConflictReason, EntryKind, ErrorKind, FileName, Item, ItemId,
    OsFilesystem, Platform, PreviewInput, Rule, Scope, Session, SessionConfig, Status,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn touch(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, name).unwrap();
            path
        })
        .collect()
}

fn session(platform: Platform) -> Session {
    Session::new(SessionConfig::default().with_platform(platform))
}

fn proposed(session: &Session) -> Vec<String> {
    session
        .preview()
        .rows
        .iter()
        .map(|r| r.proposed_name.as_ref().map_or_else(String::new, FileName::full))
        .collect()
}

#[test]
fn test_literal_prefix_removal() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["prefix_report.txt"]);
    let mut session = session(Platform::Linux);
    session.add_paths(&files);
    session.set_rule(Rule::literal("prefix_", "")).unwrap();

    assert_eq!(proposed(&session), vec!["report.txt"]);
    assert_eq!(session.preview().rows[0].status, Status::Ok);

    let report = session.apply().unwrap();
    assert_eq!(report.renamed(), 1);
    assert!(temp.path().join("report.txt").exists());
}

#[test]
fn test_regex_date_reorder() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["14-07-2023_notes.txt", "readme.txt"]);
    let mut session = session(Platform::Linux);
    session.add_paths(&files);
    session
        .set_rule(Rule::regex(r"(\d{2})-(\d{2})-(\d{4})", r"\3-\2-\1"))
        .unwrap();

    assert_eq!(proposed(&session), vec!["2023-07-14_notes.txt", "readme.txt"]);
    let summary = session.summary();
    assert_eq!((summary.ok, summary.unchanged, summary.conflict), (1, 1, 0));
}

#[test]
fn test_regex_iso_date_to_day_first() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["2023-07-14_notes.txt"]);
    let mut session = session(Platform::Linux);
    session.add_paths(&files);
    session
        .set_rule(Rule::regex(r"(\d{4})-(\d{2})-(\d{2})", r"\3-\2-\1"))
        .unwrap();

    assert_eq!(proposed(&session), vec!["14-07-2023_notes.txt"]);
    assert_eq!(session.preview().rows[0].status, Status::Ok);

    session.apply().unwrap();
    assert!(temp.path().join("14-07-2023_notes.txt").exists());
}

#[test]
fn test_case_variants_collide_on_insensitive_profile() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["a.txt", "A.txt"]);
    // Both names only coexist on a case-sensitive volume
    if fs::read_dir(temp.path()).unwrap().count() < 2 {
        return;
    }

    let items = files
        .iter()
        .enumerate()
        .map(|(i, path)| Item::new(ItemId(i as u64), path.clone(), EntryKind::File).unwrap())
        .collect();
    let preview = compute_preview(&PreviewInput {
        generation: 1,
        items,
        rule: Rule::regex("^a$", "x").case_insensitive(),
        platform: Platform::Windows,
        case_policy: CasePolicy::Insensitive,
        fs: Arc::new(OsFilesystem),
    })
    .unwrap();

    for row in &preview.rows {
        assert_eq!(row.proposed_name.as_ref().unwrap().full(), "x.txt");
        assert_eq!(row.status, Status::Conflict(ConflictReason::DuplicateInBatch));
    }
}

#[test]
fn test_insensitive_session_dedupes_added_paths() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["a.txt", "A.txt"]);
    if fs::read_dir(temp.path()).unwrap().count() < 2 {
        return;
    }

    let mut insensitive = session(Platform::Windows);
    let report = insensitive.add_paths(&files);
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.duplicates.len(), 1);

    let mut sensitive = session(Platform::Linux);
    sensitive.add_paths(&files);
    sensitive
        .set_rule(Rule::regex("^a$", "x").case_insensitive())
        .unwrap();
    assert_eq!(sensitive.summary().conflict, 2);
}

#[test]
fn test_numbering_with_parent_name() {
    let temp = TempDir::new().unwrap();
    let album = temp.path().join("Album");
    fs::create_dir(&album).unwrap();
    let files = touch(&album, &["track_a.mp3", "track_b.mp3"]);

    let mut session = session(Platform::Linux);
    session.add_paths(&files);
    session.set_rule(Rule::regex(".+", "<###:1:1>_<p:1>")).unwrap();

    assert_eq!(proposed(&session), vec!["001_Album.mp3", "002_Album.mp3"]);

    session.apply().unwrap();
    assert!(album.join("001_Album.mp3").exists());
    assert!(album.join("002_Album.mp3").exists());
}

#[test]
fn test_unmatched_item_does_not_take_a_number() {
    let temp = TempDir::new().unwrap();
    let album = temp.path().join("Album");
    fs::create_dir(&album).unwrap();
    let files = touch(&album, &["track_a.mp3", "notes.txt", "track_b.mp3"]);

    let mut session = session(Platform::Linux);
    session.set_autosort(false);
    session.add_paths(&files);
    session
        .set_rule(Rule::regex("^track_.+", "<###:1:1>_<p:1>"))
        .unwrap();

    assert_eq!(
        proposed(&session),
        vec!["001_Album.mp3", "notes.txt", "002_Album.mp3"]
    );
    let summary = session.summary();
    assert_eq!((summary.ok, summary.unchanged, summary.conflict), (2, 1, 0));

    session.apply().unwrap();
    let mut on_disk: Vec<String> = fs::read_dir(&album)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    on_disk.sort();
    assert_eq!(on_disk, vec!["001_Album.mp3", "002_Album.mp3", "notes.txt"]);
}

#[test]
fn test_illegal_windows_name_blocks_apply() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["draft.txt"]);
    let mut session = session(Platform::Windows);
    session.add_paths(&files);
    session.set_rule(Rule::literal("draft", "con")).unwrap();

    let preview = session.preview();
    let Status::Conflict(reason) = &preview.rows[0].status else {
        panic!("expected a conflict");
    };
    assert_eq!(reason.kind(), ErrorKind::IllegalName);
    assert!(session.apply().is_err());
    assert!(files[0].exists());
}

#[test]
fn test_existing_entry_outside_batch_conflicts() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["a.txt", "taken.txt"]);
    let mut session = session(Platform::Linux);
    session.add_paths(&files[..1]);
    session.set_rule(Rule::literal("a", "taken")).unwrap();

    assert_eq!(
        session.preview().rows[0].status,
        Status::Conflict(ConflictReason::ExistingTarget(temp.path().join("taken.txt")))
    );
}

#[test]
fn test_extension_scope_rename() {
    let temp = TempDir::new().unwrap();
    let files = touch(temp.path(), &["photo.jpeg", "jpeg_notes.txt"]);
    let mut session = session(Platform::Linux);
    session.add_paths(&files);
    session
        .set_rule(Rule::literal("jpeg", "jpg").with_scope(Scope::Extension))
        .unwrap();

    assert_eq!(proposed(&session), vec!["jpeg_notes.txt", "photo.jpg"]);
}
