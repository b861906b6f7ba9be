use dirsync_lib::core::{load_text_pair, FilterSnapshot, Side};
use dirsync_lib::{CompareEngine, ComparisonRecord, FileStatus, Resolution, ResolutionExecutor};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::tempdir;

// ── Helpers ──────────────────────────────────────────────────────────────────

const BASE: u64 = 1_700_000_000;

fn write_file(root: &Path, relative: &str, content: &str, mtime_secs: u64) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .unwrap();
}

fn mtime(path: &Path) -> u64 {
    fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

async fn compare(left: &Path, right: &Path) -> Vec<ComparisonRecord> {
    CompareEngine::new()
        .run(left, right, FilterSnapshot::empty(), None)
        .await
        .unwrap()
        .records
}

fn choose(records: &mut [ComparisonRecord], key: &str, resolution: Resolution) {
    records
        .iter_mut()
        .find(|r| r.key == key)
        .unwrap()
        .resolution = resolution;
}

// ── Copy ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_copy_left_to_right_creates_parents_and_keeps_mtime() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "deep/nested/report.txt", "left version", BASE + 50);

    let mut records = compare(left.path(), right.path()).await;
    assert_eq!(records[0].status, FileStatus::LeftUnique);
    choose(&mut records, "deep/nested/report.txt", Resolution::CopyLeftToRight);

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert!(report.is_success());
    assert_eq!(report.copied, 1);

    let copied = right.path().join("deep/nested/report.txt");
    assert_eq!(fs::read_to_string(&copied).unwrap(), "left version");
    assert_eq!(mtime(&copied), BASE + 50);

    let record = &records[0];
    assert_eq!(record.status, FileStatus::Same);
    assert_eq!(record.resolution, Resolution::None);
    assert_eq!(record.left, record.right);

    // 再次比较两侧一致
    let again = compare(left.path(), right.path()).await;
    assert_eq!(again[0].status, FileStatus::Same);
}

#[tokio::test]
async fn test_copy_right_to_left_overwrites_newer_file() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "a.txt", "newer on the left", BASE + 100);
    write_file(right.path(), "a.txt", "older", BASE);

    let mut records = compare(left.path(), right.path()).await;
    assert_eq!(records[0].status, FileStatus::LeftNewer);
    choose(&mut records, "a.txt", Resolution::CopyRightToLeft);

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert!(report.is_success());
    assert_eq!(fs::read_to_string(left.path().join("a.txt")).unwrap(), "older");
    assert_eq!(mtime(&left.path().join("a.txt")), BASE);
    assert_eq!(records[0].left.unwrap().size, 5);
    assert_eq!(records[0].status, FileStatus::Same);
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_both_removes_record_and_tolerates_absent_side() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "gone.txt", "x", BASE);
    write_file(left.path(), "stays.txt", "y", BASE);
    write_file(right.path(), "stays.txt", "y", BASE);

    let mut records = compare(left.path(), right.path()).await;
    assert_eq!(records.len(), 2);
    choose(&mut records, "gone.txt", Resolution::DeleteBoth);

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert!(report.is_success());
    assert_eq!(report.deleted, 1);
    assert!(!left.path().join("gone.txt").exists());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "stays.txt");
}

// ── Case differences between sides ───────────────────────────────────────────

fn mixed_case_trees(left: &Path, right: &Path) {
    write_file(left, "Docs/Readme.md", "left text", BASE + 100);
    write_file(right, "docs/README.md", "right", BASE);
}

#[tokio::test]
async fn test_delete_both_uses_each_sides_spelling() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    mixed_case_trees(left.path(), right.path());

    let mut records = compare(left.path(), right.path()).await;
    assert_eq!(records.len(), 1);
    records[0].resolution = Resolution::DeleteBoth;

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert!(report.is_success());
    assert!(records.is_empty());
    assert!(!left.path().join("Docs/Readme.md").exists());
    assert!(!right.path().join("docs/README.md").exists());
}

#[tokio::test]
async fn test_copy_overwrites_destination_spelling() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    mixed_case_trees(left.path(), right.path());

    let mut records = compare(left.path(), right.path()).await;
    assert_eq!(records[0].status, FileStatus::LeftNewer);
    records[0].resolution = Resolution::CopyLeftToRight;

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert!(report.is_success(), "{:?}", report.failures);
    let target = right.path().join("docs/README.md");
    assert_eq!(fs::read_to_string(&target).unwrap(), "left text");
    assert_eq!(mtime(&target), BASE + 100);
    assert_eq!(fs::read_dir(right.path()).unwrap().count(), 1);
    assert_eq!(fs::read_dir(right.path().join("docs")).unwrap().count(), 1);
    assert_eq!(records[0].path(Side::Right), "docs/README.md");
    assert_eq!(records[0].status, FileStatus::Same);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_does_not_stop_other_records() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "ok.txt", "fine", BASE);
    write_file(left.path(), "blocked.txt", "x", BASE);
    // 目标位置是一个非空目录，无法覆盖
    write_file(right.path(), "blocked.txt/inner.txt", "dir", BASE);

    let mut records = compare(left.path(), right.path()).await;
    choose(&mut records, "ok.txt", Resolution::CopyLeftToRight);
    choose(&mut records, "blocked.txt", Resolution::CopyLeftToRight);

    let report = ResolutionExecutor::new(left.path(), right.path())
        .with_concurrency(2)
        .apply(&mut records)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.copied, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "blocked.txt");

    let blocked = records.iter().find(|r| r.key == "blocked.txt").unwrap();
    assert_eq!(blocked.resolution, Resolution::CopyLeftToRight);
    assert_eq!(blocked.status, FileStatus::LeftUnique);
    assert!(right.path().join("ok.txt").exists());
}

#[tokio::test]
async fn test_escaping_key_is_rejected() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();

    let mut record = ComparisonRecord::new("../outside.txt", None, None, FileStatus::LeftUnique);
    record.resolution = Resolution::DeleteBoth;
    let mut records = vec![record];

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_records_without_resolution_are_untouched() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "a.txt", "a", BASE);

    let mut records = compare(left.path(), right.path()).await;
    let before = records.clone();

    let report = ResolutionExecutor::new(left.path(), right.path())
        .apply(&mut records)
        .await;

    assert_eq!(report.copied + report.deleted, 0);
    assert_eq!(records, before);
    assert!(!right.path().join("a.txt").exists());
}

// ── Text ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_load_text_pair_with_missing_side() {
    let left = tempdir().unwrap();
    let right = tempdir().unwrap();
    write_file(left.path(), "notes/todo.md", "- item\n", BASE);

    let pair = load_text_pair(left.path(), right.path(), "notes/todo.md")
        .await
        .unwrap();

    assert_eq!(pair.left.as_deref(), Some("- item\n"));
    assert_eq!(pair.right, None);
}
