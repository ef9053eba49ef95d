//! End-to-end behavior of the backup service against real stores

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{truncate_in_half, user_count, write_store, Fixture};
use streakvault::backup::{ArchiveStore, SnapshotBuilder};
use streakvault::config::Settings;
use streakvault::integrity::check_integrity;
use streakvault::{BackupType, LogNotifier, Scheduler};

#[test]
fn manual_backup_reports_counts_and_lists_with_size() {
    let fixture = Fixture::new(3, 5);
    let service = fixture.service();

    let outcome = service.create_backup(BackupType::Manual).unwrap();
    let manifest = outcome.snapshot.manifest.clone().unwrap();
    assert_eq!(manifest.user_count, 3);
    assert_eq!(manifest.entry_count, 5);
    assert!(manifest.integrity_verified);

    let listed = service.archives().list(Some(BackupType::Manual)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, outcome.snapshot.path);
    assert_eq!(
        listed[0].size_bytes,
        fs::metadata(&outcome.snapshot.path).unwrap().len()
    );
}

#[test]
fn truncated_store_is_diagnosed_as_corrupt() {
    let fixture = Fixture::new(3, 5);
    truncate_in_half(&fixture.store());
    let service = fixture.service();

    assert!(!check_integrity(&fixture.store()));
    let report = service.diagnose();
    assert!(!report.integrity_ok);
    assert!(!report.corruption_indicators.is_empty());
    assert!(!report.repair_recommendations.is_empty());

    // restore ranks first, then engine repair, then a manual rebuild
    let recs = &report.repair_recommendations;
    assert!(report.accessible);
    assert!(recs[0].starts_with("Restore"));
    assert!(recs.iter().position(|r| r.contains("(repair)")).unwrap() > 0);
    assert!(recs.iter().any(|r| r.contains("(rebuild")));
}

#[test]
fn latest_skips_emergency_capture_of_corrupt_store() {
    let fixture = Fixture::new(3, 5);
    let service = Arc::new(fixture.service());
    let manual = service.create_backup(BackupType::Manual).unwrap().snapshot;
    thread::sleep(Duration::from_millis(5));

    truncate_in_half(&fixture.store());
    let scheduler = Scheduler::new(service.clone(), Arc::new(LogNotifier)).unwrap();
    scheduler.health_check().unwrap();
    let emergency = service.archives().list(Some(BackupType::Emergency)).unwrap();
    assert_eq!(emergency.len(), 1);
    assert!(!emergency[0].integrity_verified());

    let operation = service.restore("latest", true).unwrap();
    assert_eq!(operation.target.path, manual.path);
    assert!(check_integrity(&fixture.store()));
    assert_eq!(user_count(&fixture.store()), 3);
}

#[test]
fn failed_pre_restore_snapshot_leaves_store_untouched() {
    let fixture = Fixture::new(2, 2);
    let service = fixture.service();
    let manual = service.create_backup(BackupType::Manual).unwrap().snapshot;

    truncate_in_half(&fixture.store());
    let damaged = fs::read(fixture.store()).unwrap();
    // a directory where a bundled data file should be makes every build fail
    fs::create_dir_all(fixture.base().join("data/tips.json")).unwrap();

    let err = service
        .restore(&manual.path.to_string_lossy(), true)
        .unwrap_err();

    assert!(err.is_precondition());
    assert!(err.to_string().contains("pre-restore emergency snapshot failed"));
    assert_eq!(fs::read(fixture.store()).unwrap(), damaged);
    assert!(service
        .archives()
        .list(Some(BackupType::Emergency))
        .unwrap()
        .is_empty());
    let side_copies = fs::read_dir(fixture.store().parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".pre_restore_"))
        .count();
    assert_eq!(side_copies, 0);
}

#[test]
fn restore_over_corrupt_store_takes_emergency_snapshot_first() {
    let fixture = Fixture::new(3, 5);
    let service = fixture.service();
    let manual = service.create_backup(BackupType::Manual).unwrap().snapshot;

    truncate_in_half(&fixture.store());
    let damaged = fs::read(fixture.store()).unwrap();

    let operation = service
        .restore(&manual.path.to_string_lossy(), true)
        .unwrap();

    assert_eq!(operation.pre_restore_snapshot.backup_type, BackupType::Emergency);
    assert!(operation.pre_restore_snapshot.path.exists());
    assert!(check_integrity(&fixture.store()));
    assert_eq!(user_count(&fixture.store()), 3);

    // the damaged bytes survive beside the restored store
    let side_copy = operation.side_copy.unwrap();
    assert_eq!(fs::read(side_copy).unwrap(), damaged);
}

#[test]
fn unconfirmed_restore_changes_nothing() {
    let fixture = Fixture::new(2, 2);
    let service = fixture.service();
    let manual = service.create_backup(BackupType::Manual).unwrap().snapshot;
    let before = fs::read(fixture.store()).unwrap();

    let err = service
        .restore(&manual.path.to_string_lossy(), false)
        .unwrap_err();

    assert!(err.is_precondition());
    assert!(err.to_string().contains("confirmation required"));
    assert_eq!(fs::read(fixture.store()).unwrap(), before);
    assert!(service
        .archives()
        .list(Some(BackupType::Emergency))
        .unwrap()
        .is_empty());
}

#[test]
fn retention_keeps_the_newest_seven_daily_archives() {
    let fixture = Fixture::new(1, 1);
    let settings = Settings::default();
    let builder = SnapshotBuilder::new(fixture.paths.clone(), &settings);

    let mut built = Vec::new();
    for _ in 0..10 {
        built.push(builder.build(BackupType::Daily).unwrap());
        thread::sleep(Duration::from_millis(5));
    }

    let store = ArchiveStore::new(fixture.paths.clone(), settings.retention.clone());
    let report = store.enforce_retention(BackupType::Daily, &[]).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.removed.len(), 3);

    let remaining = store.list(Some(BackupType::Daily)).unwrap();
    assert_eq!(remaining.len(), 7);
    assert_eq!(remaining[0].path, built[9].path);
    for old in &built[..3] {
        assert!(!old.path.exists());
    }
}

#[test]
fn retention_runs_after_each_backup_and_spares_other_types() {
    let fixture = Fixture::new(1, 1);
    let service = fixture.service();

    service.create_backup(BackupType::Weekly).unwrap();
    for _ in 0..9 {
        service.create_backup(BackupType::Daily).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let grouped = service.list_backups().unwrap();
    assert_eq!(grouped[&BackupType::Daily].len(), 7);
    assert_eq!(grouped[&BackupType::Weekly].len(), 1);
}

#[test]
fn failed_build_publishes_nothing() {
    let fixture = Fixture::new(2, 2);
    // a directory where a bundled data file should be cannot be copied
    fs::create_dir_all(fixture.base().join("data/tips.json")).unwrap();
    let service = fixture.service();

    assert!(service.create_backup(BackupType::Manual).is_err());
    assert!(service.archives().list(None).unwrap().is_empty());
    let leftovers: Vec<_> = fs::read_dir(fixture.paths.type_dir(BackupType::Manual))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn restored_store_matches_backup_contents() {
    let fixture = Fixture::new(4, 8);
    let service = fixture.service();
    let snapshot = service.create_backup(BackupType::Manual).unwrap().snapshot;

    fs::remove_file(fixture.store()).unwrap();
    write_store(&fixture.store(), 1, 0);
    assert_eq!(user_count(&fixture.store()), 1);

    service.restore(&snapshot.filename, true).unwrap();
    assert_eq!(user_count(&fixture.store()), 4);
}

#[test]
fn repair_leaves_live_store_untouched() {
    let fixture = Fixture::new(3, 3);
    let service = fixture.service();
    let before = fs::read(fixture.store()).unwrap();

    let outcome = service.attempt_repair(true).unwrap();
    assert!(outcome.output.exists());
    assert!(outcome.safety_copy.unwrap().exists());
    assert_eq!(fs::read(fixture.store()).unwrap(), before);
}

#[test]
fn rebuild_replaces_corrupt_store_from_latest() {
    let fixture = Fixture::new(3, 2);
    let service = fixture.service();
    service.create_backup(BackupType::Daily).unwrap();
    truncate_in_half(&fixture.store());

    let outcome = service.rebuild_from_backup("latest").unwrap();
    assert_eq!(outcome.source.backup_type, BackupType::Daily);
    assert!(check_integrity(&fixture.store()));
    assert_eq!(outcome.table_counts["users"], 3);
}

#[test]
fn recovery_report_recommends_fresh_backup() {
    let fixture = Fixture::new(1, 1);
    let service = fixture.service();
    service.create_backup(BackupType::Manual).unwrap();

    let path = service.write_report().unwrap();
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let options = report["recovery_options"].as_array().unwrap();
    let manual = options
        .iter()
        .find(|o| o["type"] == "restore_from_manual")
        .unwrap();
    assert_eq!(manual["recommended"], true);
}
