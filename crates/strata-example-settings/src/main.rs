//! # Settings Store Example
//!
//! Walks an app's settings store through a schema change and back:
//!
//! 1. **Version 1**: `Setting { notificationEnabled }` alongside `Todo`.
//! 2. **Upgrade**: `notificationEnabled` is renamed to
//!    `pushNotificationEnabled`, `syncCalendarEnabled` is added with a
//!    default, and a custom hook turns calendar sync on for the first
//!    setting.
//! 3. **Reopen**: opening at the current version runs nothing.
//! 4. **Downgrade**: a separate plan renames the field back.
//!
//! `Todo` records are identical in both versions and pass every stage
//! untouched.
//!
//! Run: `cargo run -p strata-example-settings [path/to/store.db]`

use std::error::Error;
use std::path::{Path, PathBuf};

use strata_migrate::{
    FieldDef, FieldType, MigrationEngine, MigrationPlan, MigrationStage, Record, RecordId,
    RecordType, SchemaDescriptor, SchemaRegistry, SchemaVersion, StoreAdapter, StoreHandle,
};
use strata_store::SqliteStore;

const V1: SchemaVersion = SchemaVersion::major(1);
const V2: SchemaVersion = SchemaVersion::major(2);

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("strata-settings-demo.db"));
    if path.exists() {
        std::fs::remove_file(&path)?;
    }

    println!("=== Settings Store Example ({}) ===\n", path.display());

    let engine = MigrationEngine::new(SqliteStore::new(), registry()?);

    let (setting, todo) = create_v1_store(&engine, &path)?;
    upgrade(&engine, &path, setting, todo)?;
    reopen(&engine, &path)?;
    downgrade(&engine, &path, setting, todo)?;

    println!("\n=== Done! ===");
    Ok(())
}

fn todo_type() -> RecordType {
    RecordType::new("Todo")
        .field(FieldDef::new("title", FieldType::Text))
        .field(FieldDef::new("done", FieldType::Bool).default_value(false))
}

fn registry() -> Result<SchemaRegistry> {
    let v1 = SchemaDescriptor::new(
        V1,
        vec![
            todo_type(),
            RecordType::new("Setting").field(FieldDef::new("notificationEnabled", FieldType::Bool)),
        ],
    )?;
    let v2 = SchemaDescriptor::new(
        V2,
        vec![
            todo_type(),
            RecordType::new("Setting")
                .field(FieldDef::new("pushNotificationEnabled", FieldType::Bool))
                .field(FieldDef::new("syncCalendarEnabled", FieldType::Bool).default_value(false)),
        ],
    )?;
    Ok(SchemaRegistry::new(vec![v1, v2])?)
}

fn upgrade_plan() -> Result<MigrationPlan> {
    let stage = MigrationStage::custom(V1, V2)
        .rename_field("Setting", "notificationEnabled", "pushNotificationEnabled")
        .did_migrate(|ctx, _backup| {
            // Absent settings make this a no-op.
            if let Some(mut first) = ctx.first("Setting")? {
                first.set("syncCalendarEnabled", true);
                ctx.update(first)?;
            }
            Ok(())
        })
        .build();
    Ok(MigrationPlan::upgrade("upgrade", vec![V1, V2], vec![stage])?)
}

fn downgrade_plan() -> Result<MigrationPlan> {
    let stage = MigrationStage::custom(V2, V1)
        .rename_field("Setting", "pushNotificationEnabled", "notificationEnabled")
        .build();
    Ok(MigrationPlan::downgrade("downgrade", vec![V1, V2], vec![stage])?)
}

// ── Section 1: Version 1 store ───────────────────────────────────

fn create_v1_store(
    engine: &MigrationEngine<SqliteStore>,
    path: &Path,
) -> Result<(RecordId, RecordId)> {
    println!("1. Creating a version 1 store...\n");

    let mut handle = engine.open_store(path, V1, None)?;
    let setting = Record::new("Setting", RecordId::new_v4()).with("notificationEnabled", true);
    let todo = Record::new("Todo", RecordId::new_v4())
        .with("title", "Buy milk")
        .with("done", false);
    handle.insert(setting.clone())?;
    handle.insert(todo.clone())?;
    handle.save()?;

    println!("   Setting {}: notificationEnabled = true", setting.id);
    println!("   Todo {}: \"Buy milk\"", todo.id);
    println!("   Recorded version: {}", describe(engine.recorded_version(path)?));
    Ok((setting.id, todo.id))
}

// ── Section 2: Upgrade ───────────────────────────────────────────

fn upgrade(
    engine: &MigrationEngine<SqliteStore>,
    path: &Path,
    setting: RecordId,
    todo: RecordId,
) -> Result<()> {
    println!("\n2. Upgrading to {V2}...\n");

    let plan = upgrade_plan()?;
    let (handle, report) = engine.open_store_with_report(path, V2, Some(&plan))?;
    for stage in &report.stages {
        println!("   Applied stage [{}] {} -> {}", stage.index, stage.from, stage.to);
    }

    let migrated = handle
        .get("Setting", setting)?
        .ok_or("setting lost during upgrade")?;
    println!(
        "   Setting {}: pushNotificationEnabled = {:?}, syncCalendarEnabled = {:?}",
        migrated.id,
        migrated.get_bool("pushNotificationEnabled"),
        migrated.get_bool("syncCalendarEnabled"),
    );
    let unchanged = handle.get("Todo", todo)?.ok_or("todo lost during upgrade")?;
    println!("   Todo {}: {:?}", unchanged.id, unchanged.get_text("title"));
    println!("   Recorded version: {}", describe(engine.recorded_version(path)?));
    Ok(())
}

// ── Section 3: Reopen at the current version ─────────────────────

fn reopen(engine: &MigrationEngine<SqliteStore>, path: &Path) -> Result<()> {
    println!("\n3. Reopening at {V2}...\n");

    let plan = upgrade_plan()?;
    let (handle, report) = engine.open_store_with_report(path, V2, Some(&plan))?;
    println!(
        "   Stages run: {}, pending changes: {}",
        report.stages.len(),
        handle.has_changes()
    );

    let direct = engine.adapter().recorded_version(path)?;
    println!("   Adapter reports: {}", describe(direct));
    Ok(())
}

// ── Section 4: Downgrade ─────────────────────────────────────────

fn downgrade(
    engine: &MigrationEngine<SqliteStore>,
    path: &Path,
    setting: RecordId,
    todo: RecordId,
) -> Result<()> {
    println!("\n4. Downgrading to {V1}...\n");

    let plan = downgrade_plan()?;
    let pending = engine.pending_stages(path, V1, Some(&plan))?;
    println!("   Pending stages: {}", pending.len());

    let handle = engine.open_store(path, V1, Some(&plan))?;
    let restored = handle
        .get("Setting", setting)?
        .ok_or("setting lost during downgrade")?;
    println!(
        "   Setting {}: notificationEnabled = {:?}",
        restored.id,
        restored.get_bool("notificationEnabled"),
    );
    let unchanged = handle.get("Todo", todo)?.ok_or("todo lost during downgrade")?;
    println!("   Todo {}: {:?}", unchanged.id, unchanged.get_text("title"));
    println!("   Recorded version: {}", describe(engine.recorded_version(path)?));
    Ok(())
}

fn describe(version: Option<SchemaVersion>) -> String {
    version.map_or_else(|| "(none)".to_string(), |v| v.to_string())
}
