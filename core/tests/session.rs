//! End-to-end counting through `LapSession` against real files.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lapcounter_core::{LapSession, SessionError};
use lapcounter_types::AppConfig;
use tempfile::TempDir;

const LOG: &str = "punches.txt";

fn setup(registry: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cardName.txt"), registry).unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn changed(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn select_requires_registry() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = LapSession::new(AppConfig::default());

    let err = session.select_directory(dir.path()).unwrap_err();
    assert!(matches!(err, SessionError::RegistryMissing(_)));
    assert!(session.directory().is_none());
}

#[test]
fn select_rejects_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = LapSession::new(AppConfig::default());

    let err = session.select_directory(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, SessionError::NotADirectory(_)));
}

#[test]
fn select_shows_registry_defaults() {
    let (_guard, root) = setup("CardID:7, Name:Alice\nCardID:8, Name:Bob\n");
    let mut session = LapSession::new(AppConfig::default());

    let snapshot = session.select_directory(&root).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 0, 0)));
    assert_eq!(snapshot.tuple("8"), Some(("Bob", 0, 0)));
    assert_eq!(snapshot.changed, changed(&["7", "8"]));
    assert_eq!(
        session.app_config().log_directory.as_deref(),
        Some(root.to_string_lossy().as_ref())
    );
}

#[test]
fn select_reads_existing_log() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    fs::write(root.join(LOG), "a;7;31;b;c;d;e;12:00:00\na;7;31;b;c;d;e;12:00:05\n").unwrap();
    let mut session = LapSession::new(AppConfig::default());

    let snapshot = session.select_directory(&root).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 2)));
    assert_eq!(session.status().files, vec![(root.join(LOG), 48)]);
}

#[test]
fn incremental_batches_match_scenario() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    append(&log, "a;7;31;b;c;d;e;12:00:00\n");
    let snapshot = session.on_file_changed(&log).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 1)));
    assert_eq!(snapshot.changed, changed(&["7"]));

    append(&log, "a;7;31;b;c;d;e;12:00:05\n");
    let snapshot = session.on_file_changed(&log).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 2)));
    assert_eq!(snapshot.changed, changed(&["7"]));

    let snapshot = session.set_stage_divisor(2).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 2)));
    assert_eq!(session.app_config().stage_divisor, 2);
}

#[test]
fn rereading_unchanged_file_is_idempotent() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    append(&log, "a;7;31;b;c;d;e;12:00:00\n");
    session.on_file_changed(&log).unwrap();
    let snapshot = session.on_file_changed(&log).unwrap();

    assert!(snapshot.changed.is_empty());
    assert_eq!(session.engine().record("7").unwrap().punch_count, 1);
}

#[test]
fn unknown_card_is_appended_to_registry() {
    let (_guard, root) = setup("CardID:7, Name:Alice");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    append(&log, "a;99;31;b;c;d;e;12:00:00\n");
    let snapshot = session.on_file_changed(&log).unwrap();

    assert_eq!(snapshot.tuple("99"), Some(("Unknown 99", 1, 1)));
    let registry = fs::read_to_string(root.join("cardName.txt")).unwrap();
    assert_eq!(registry, "CardID:7, Name:Alice\nCardID:99, Name:Unknown 99\n");

    // A replay must not register the card a second time.
    session.set_filter_code("31").unwrap();
    let registry = fs::read_to_string(root.join("cardName.txt")).unwrap();
    assert_eq!(registry.matches("CardID:99").count(), 1);
}

#[test]
fn filter_change_replays_history() {
    let (_guard, root) = setup("CardID:7, Name:Alice\nCardID:8, Name:Bob\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    append(
        &log,
        "a;7;31;b;c;d;e;12:00:00\na;8;40;b;c;d;e;12:00:01\na;8;40;b;c;d;e;12:00:02\n",
    );
    session.on_file_changed(&log).unwrap();

    let snapshot = session.set_filter_code("40").unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 0, 0)));
    assert_eq!(snapshot.tuple("8"), Some(("Bob", 1, 2)));
    assert_eq!(snapshot.changed, changed(&["7", "8"]));
    assert_eq!(session.status().filter_code, "40");
}

#[test]
fn invalid_divisor_leaves_state() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();
    append(&log, "a;7;31;b;c;d;e;12:00:00\n");
    session.on_file_changed(&log).unwrap();

    assert!(session.set_stage_divisor(0).is_err());
    assert_eq!(session.status().stage_divisor, 3);
    assert_eq!(session.snapshot().tuple("7"), Some(("Alice", 1, 1)));
}

#[test]
fn truncated_log_is_recounted_without_duplicates() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    append(&log, "a;7;31;b;c;d;e;12:00:00\na;7;31;b;c;d;e;12:00:05\n");
    session.on_file_changed(&log).unwrap();

    fs::write(&log, "a;7;31;b;c;d;e;13:00:00\n").unwrap();
    let snapshot = session.on_file_changed(&log).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 1)));
    assert_eq!(session.engine().record("7").unwrap().punch_count, 1);
}

#[test]
fn byte_offsets_track_appends() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    for chunk in ["a;7;31;b;c;d;e;1\n", "x\n", "a;7;31;b;c;d;e;2\na;7;31;b;c;d;e;3\n"] {
        append(&log, chunk);
        session.on_file_changed(&log).unwrap();
    }

    let len = fs::metadata(&log).unwrap().len();
    assert_eq!(session.tailer().state(&log).unwrap().byte_offset, len);
    assert_eq!(session.engine().record("7").unwrap().punch_count, 3);
}

#[test]
fn registry_and_foreign_paths_are_ignored() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    assert!(session.on_file_changed(&root.join("cardName.txt")).is_none());
    let other = tempfile::tempdir().unwrap();
    let foreign = other.path().join(LOG);
    fs::write(&foreign, "a;7;31;b;c;d;e;12:00:00\n").unwrap();
    assert!(session.on_file_changed(&foreign).is_none());
}

#[test]
fn configured_log_name_limits_tailing() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    fs::write(root.join("other.txt"), "a;7;31;b;c;d;e;12:00:00\n").unwrap();
    fs::write(root.join("reader.log"), "a;7;31;b;c;d;e;12:00:01\n").unwrap();

    let config = AppConfig {
        log_file_name: Some("reader.log".to_string()),
        ..AppConfig::default()
    };
    let mut session = LapSession::new(config);
    let snapshot = session.select_directory(&root).unwrap();

    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 1)));
    assert!(session.on_file_changed(&root.join("other.txt")).is_none());
}

#[test]
fn reset_zeroes_counts_but_keeps_offsets() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();
    append(&log, "a;7;31;b;c;d;e;12:00:00\n");
    session.on_file_changed(&log).unwrap();

    let snapshot = session.reset();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 0, 0)));
    assert_eq!(session.tailer().state(&log).unwrap().byte_offset, 24);
}

#[test]
fn unterminated_last_punch_is_counted() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    fs::write(&log, "a;7;31;b;c;d;e;12:00:00").unwrap();
    let mut session = LapSession::new(AppConfig::default());

    let snapshot = session.select_directory(&root).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 1)));
    assert_eq!(session.tailer().state(&log).unwrap().byte_offset, 23);

    // Terminating the line later must not count it again.
    append(&log, "\na;7;31;b;c;d;e;12:00:05\n");
    let snapshot = session.on_file_changed(&log).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 2)));
}

#[test]
fn reselect_starts_from_new_directory() {
    let (_first_guard, first) = setup("CardID:7, Name:Alice\n");
    fs::write(first.join(LOG), "a;7;31;b;c;d;e;12:00:00\n").unwrap();
    let (_second_guard, second) = setup("CardID:7, Name:Alice\nCardID:8, Name:Bob\n");
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&first).unwrap();

    let snapshot = session.select_directory(&second).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 0, 0)));
    assert_eq!(snapshot.tuple("8"), Some(("Bob", 0, 0)));
    assert_eq!(session.directory(), Some(second.as_path()));
    assert!(session.status().files.is_empty());
    assert!(session.tailer().state(&first.join(LOG)).is_none());

    // The old directory is no longer tracked.
    append(&first.join(LOG), "a;7;31;b;c;d;e;12:00:05\n");
    assert!(session.on_file_changed(&first.join(LOG)).is_none());
}

#[test]
fn failed_reselect_keeps_current_session() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let log = root.join(LOG);
    fs::write(&log, "a;7;31;b;c;d;e;12:00:00\n").unwrap();
    let empty = tempfile::tempdir().unwrap();
    let mut session = LapSession::new(AppConfig::default());
    session.select_directory(&root).unwrap();

    let err = session.select_directory(empty.path()).unwrap_err();
    assert!(matches!(err, SessionError::RegistryMissing(_)));
    assert_eq!(session.directory(), Some(root.as_path()));
    assert_eq!(session.engine().record("7").unwrap().punch_count, 1);
    assert_eq!(session.status().files, vec![(log.clone(), 24)]);

    append(&log, "a;7;31;b;c;d;e;12:00:05\n");
    let snapshot = session.on_file_changed(&log).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 1, 2)));
}

#[test]
fn excluded_file_is_not_tailed() {
    let (_guard, root) = setup("CardID:7, Name:Alice\n");
    let own_log = root.join("lapcounter.log");
    fs::write(&own_log, "x;7;31;b;c;d;e;12:00:00\n").unwrap();
    let mut session = LapSession::new(AppConfig::default());
    session.exclude_path(&own_log);

    let snapshot = session.select_directory(&root).unwrap();
    assert_eq!(snapshot.tuple("7"), Some(("Alice", 0, 0)));
    assert!(session.status().files.is_empty());

    append(&own_log, "x;7;31;b;c;d;e;12:00:05\n");
    assert!(session.on_file_changed(&own_log).is_none());
}
