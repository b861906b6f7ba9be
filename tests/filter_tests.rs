use dirsync_lib::core::{ensure_filter_file, prune_ignored, FilterRule, RuleKind};
use dirsync_lib::{ComparisonRecord, Error, FileStatus, IgnoreFilterStore};
use std::fs;
use tempfile::tempdir;

const SAMPLES: &[&str] = &[
    "src/main.rs",
    "target/debug/app",
    "node_modules/lib/index.js",
    "docs/Thumbs.db",
    "build.log",
    "nested/build.log.txt",
    "my folder (1)/a+b.txt",
    "TEMP/cache.bin",
];

fn verdicts(store: &IgnoreFilterStore) -> Vec<bool> {
    let snapshot = store.snapshot();
    SAMPLES.iter().map(|p| snapshot.is_excluded(p)).collect()
}

#[test]
fn test_save_and_reload_gives_same_verdicts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "f: \\.log\nd: target\nd: temp$\n").unwrap();

    let mut store = IgnoreFilterStore::load(&path).unwrap();
    assert!(store.add_directory_rule("node_modules").unwrap());
    assert!(store.add_file_name_rule("Thumbs.db").unwrap());
    assert!(store.add_file_rule("my folder (1)/a+b.txt").unwrap());

    let before = verdicts(&store);
    assert_eq!(before, vec![false, true, true, true, true, false, true, true]);

    assert_eq!(store.save().unwrap(), 6);
    let reloaded = IgnoreFilterStore::load(&path).unwrap();
    assert_eq!(verdicts(&reloaded), before);
    assert_eq!(reloaded.render(), store.render());
}

#[test]
fn test_saved_file_is_sorted_directories_first() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "f: zeta\nd: beta\nf: alpha\nd: alpha\n").unwrap();

    let store = IgnoreFilterStore::load(&path).unwrap();
    store.save().unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "d: alpha\nd: beta\nf: alpha\nf: zeta\n"
    );
}

#[test]
fn test_duplicate_rule_is_not_added() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "").unwrap();

    let mut store = IgnoreFilterStore::load(&path).unwrap();
    assert!(store.add_directory_rule("cache").unwrap());
    assert!(!store.add_directory_rule("cache").unwrap());
    assert_eq!(store.rules(), vec![FilterRule::new(RuleKind::Directory, "cache")]);
}

#[test]
fn test_reset_discards_unsaved_rules() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "d: keep\n").unwrap();

    let mut store = IgnoreFilterStore::load(&path).unwrap();
    store.add_file_rule("scratch.txt").unwrap();
    assert!(store.matches_file("scratch.txt"));

    store.reset().unwrap();
    assert!(!store.matches_file("scratch.txt"));
    assert!(store.matches_directory("keep"));
}

#[test]
fn test_invalid_file_reports_line() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "d: ok\n\nf: (unclosed\n").unwrap();

    match IgnoreFilterStore::load(&path) {
        Err(Error::FilterParse { line, .. }) => assert_eq!(line, 3),
        other => panic!("unexpected result: {:?}", other.map(|s| s.rules())),
    }
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempdir().unwrap();
    let result = IgnoreFilterStore::load(dir.path().join("absent.ignores"));
    assert!(matches!(result, Err(Error::FilterRead { .. })));
}

#[test]
fn test_ensure_filter_file_creates_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ignores").join("default.ignores");

    assert!(ensure_filter_file(&path).unwrap());
    assert!(!ensure_filter_file(&path).unwrap());

    let store = IgnoreFilterStore::load(&path).unwrap();
    assert!(store.rules().is_empty());
    assert!(!store.snapshot().is_excluded("anything/at/all.txt"));
}

#[test]
fn test_new_rule_prunes_existing_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "").unwrap();

    let record = |key: &str| ComparisonRecord::new(key, None, None, FileStatus::RightUnique);
    let mut records = vec![record("logs/a.txt"), record("logs/b/c.txt"), record("src/lib.rs")];

    let mut store = IgnoreFilterStore::load(&path).unwrap();
    store.add_directory_rule("logs").unwrap();

    assert_eq!(prune_ignored(&mut records, &store.snapshot()), 2);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "src/lib.rs");
}

#[test]
fn test_failed_save_keeps_rules_in_memory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rules.ignores");
    fs::write(&path, "d: keep\n").unwrap();

    let mut store = IgnoreFilterStore::load(&path).unwrap();
    assert!(store.add_file_rule("new.txt").unwrap());

    // 规则文件被替换成目录，写入必然失败
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    assert!(matches!(store.save(), Err(Error::Io(_))));
    assert_eq!(
        store.rules(),
        vec![
            FilterRule::new(RuleKind::Directory, "keep"),
            FilterRule::new(RuleKind::File, "new\\.txt"),
        ]
    );
    assert!(store.matches_file("new.txt"));
}
