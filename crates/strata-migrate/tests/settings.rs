//! Upgrade and downgrade of the Setting/Todo store.

mod common;

use std::path::Path;

use common::*;
use strata_migrate::{
    AppliedStage, MigrationEngine, MigrationError, SchemaVersion, StoreAdapter, StoreHandle,
};
use strata_store::{MemoryStore, SqliteStore};

#[test]
fn empty_store_migrates_both_ways() {
    let engine = MigrationEngine::new(MemoryStore::new(), registry());
    let location = Path::new("empty");

    drop(engine.open_store(location, V1, None).unwrap());
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V1));

    let (handle, report) = engine
        .open_store_with_report(location, V2, Some(&upgrade_plan()))
        .unwrap();
    assert_eq!(report.stages, vec![AppliedStage { index: 0, from: V1, to: V2 }]);
    assert!(all(&handle, "Setting").is_empty());
    assert!(all(&handle, "Todo").is_empty());
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V2));
    drop(handle);

    let handle = engine.open_store(location, V1, Some(&downgrade_plan())).unwrap();
    assert!(all(&handle, "Setting").is_empty());
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V1));
}

#[test]
fn fresh_location_is_created_at_target() {
    let engine = MigrationEngine::new(MemoryStore::new(), registry());
    let (handle, report) = engine
        .open_store_with_report("fresh", V2, Some(&upgrade_plan()))
        .unwrap();
    assert!(!report.migrated());
    assert_eq!(handle.descriptor().version(), V2);
    assert_eq!(engine.recorded_version("fresh").unwrap(), Some(V2));
}

#[test]
fn upgrade_renames_and_defaults() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    let setting = setting_v1(true);
    seed_v1(&store, location, &[setting.clone()]);

    let engine = MigrationEngine::new(store, registry());
    let handle = engine.open_store(location, V2, Some(&upgrade_plan())).unwrap();

    let settings = all(&handle, "Setting");
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].id, setting.id);
    assert_eq!(settings[0].get_bool("pushNotificationEnabled"), Some(true));
    assert_eq!(settings[0].get_bool("syncCalendarEnabled"), Some(false));
    assert_eq!(settings[0].get("notificationEnabled"), None);
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V2));
}

#[test]
fn downgrade_restores_renamed_field() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    let setting = setting_v1(true);
    seed_v1(&store, location, &[setting.clone()]);

    let engine = MigrationEngine::new(store, registry());
    drop(engine.open_store(location, V2, Some(&upgrade_plan())).unwrap());

    let handle = engine
        .open_store(location, V1, Some(&downgrade_plan()))
        .unwrap();
    let settings = all(&handle, "Setting");
    assert_eq!(settings, vec![setting]);
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V1));
}

#[test]
fn round_trip_preserves_identity_and_untouched_types() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    let settings: Vec<_> = (0..4).map(|i| setting_v1(i % 2 == 0)).collect();
    let todos = vec![todo("milk"), todo("eggs")];
    let mut seeded = settings.clone();
    seeded.extend(todos.iter().cloned());
    seed_v1(&store, location, &seeded);

    let engine = MigrationEngine::new(store, registry());
    let upgraded = engine.open_store(location, V2, Some(&upgrade_plan())).unwrap();
    let mut expected_todos = todos.clone();
    expected_todos.sort_by_key(|r| r.id);
    assert_eq!(all(&upgraded, "Todo"), expected_todos);
    drop(upgraded);

    let downgraded = engine
        .open_store(location, V1, Some(&downgrade_plan()))
        .unwrap();
    let mut expected_settings = settings;
    expected_settings.sort_by_key(|r| r.id);
    assert_eq!(all(&downgraded, "Setting"), expected_settings);
    assert_eq!(all(&downgraded, "Todo"), expected_todos);
}

#[test]
fn open_at_current_version_runs_nothing() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    seed_v1(&store, location, &[setting_v1(false)]);
    let engine = MigrationEngine::new(store, registry());

    assert!(engine
        .pending_stages(location, V1, Some(&upgrade_plan()))
        .unwrap()
        .is_empty());
    let (handle, report) = engine
        .open_store_with_report(location, V1, Some(&upgrade_plan()))
        .unwrap();
    assert!(!report.migrated());
    assert_eq!(report.retries_used, 0);
    assert!(!handle.has_changes());
    assert_eq!(engine.adapter().record_count(location).unwrap(), 1);
}

#[test]
fn dry_run_lists_stages_without_side_effects() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    seed_v1(&store, location, &[setting_v1(true)]);
    let engine = MigrationEngine::new(store, registry());

    let pending = engine
        .pending_stages(location, V2, Some(&upgrade_plan()))
        .unwrap();
    assert_eq!(pending, vec![AppliedStage { index: 0, from: V1, to: V2 }]);
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V1));
}

#[test]
fn wrong_direction_has_no_path() {
    let store = MemoryStore::new();
    let location = Path::new("app");
    seed_v1(&store, location, &[]);
    let engine = MigrationEngine::new(store, registry());

    let err = engine
        .open_store(location, V2, Some(&downgrade_plan()))
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::NoPathFound { from, to, .. } if from == V1 && to == V2));
    assert_eq!(engine.recorded_version(location).unwrap(), Some(V1));
}

#[test]
fn unregistered_versions_are_rejected_up_front() {
    let engine = MigrationEngine::new(MemoryStore::new(), registry());
    let v9 = SchemaVersion::major(9);

    let err = engine.open_store("app", v9, None).err().unwrap();
    assert!(matches!(err, MigrationError::UnknownVersion(v) if v == v9));

    let foreign = strata_migrate::MigrationPlan::upgrade(
        "foreign",
        vec![V2, v9],
        vec![strata_migrate::MigrationStage::lightweight(V2, v9)],
    )
    .unwrap();
    let err = engine.open_store("app", V2, Some(&foreign)).err().unwrap();
    assert!(matches!(err, MigrationError::UnknownVersion(v) if v == v9));
    assert_eq!(engine.recorded_version("app").unwrap(), None);
}

#[test]
fn sqlite_upgrade_and_downgrade_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let setting = setting_v1(true);
    let milk = todo("milk");
    seed_v1(&SqliteStore::new(), &path, &[setting.clone(), milk.clone()]);

    {
        let engine = MigrationEngine::new(SqliteStore::new(), registry());
        drop(engine.open_store(&path, V2, Some(&upgrade_plan())).unwrap());
    }

    let adapter = SqliteStore::new();
    assert_eq!(adapter.recorded_version(&path).unwrap(), Some(V2));
    let handle = adapter.open_under_schema(&path, &schema_v2()).unwrap();
    let upgraded = handle.get("Setting", setting.id).unwrap().unwrap();
    assert_eq!(upgraded.get_bool("pushNotificationEnabled"), Some(true));
    assert_eq!(upgraded.get_bool("syncCalendarEnabled"), Some(false));
    drop(handle);

    let engine = MigrationEngine::new(adapter, registry());
    let handle = engine
        .open_store(&path, V1, Some(&downgrade_plan()))
        .unwrap();
    assert_eq!(handle.get("Setting", setting.id).unwrap(), Some(setting));
    assert_eq!(handle.get("Todo", milk.id).unwrap(), Some(milk));
}

#[test]
fn sqlite_dry_run_of_missing_file_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo.db");
    let engine = MigrationEngine::new(SqliteStore::new(), registry());

    assert_eq!(engine.recorded_version(&path).unwrap(), None);
    assert!(engine
        .pending_stages(&path, V2, Some(&upgrade_plan()))
        .unwrap()
        .is_empty());
    assert!(!path.exists());
}
