#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use strata_migrate::{
    FieldDef, FieldType, MigrationPlan, MigrationStage, Record, RecordId, RecordType,
    SchemaDescriptor, SchemaRegistry, SchemaVersion, StoreAdapter, StoreHandle,
};

pub const V1: SchemaVersion = SchemaVersion::major(1);
pub const V2: SchemaVersion = SchemaVersion::major(2);

pub fn todo_type() -> RecordType {
    RecordType::new("Todo")
        .field(FieldDef::new("title", FieldType::Text))
        .field(FieldDef::new("done", FieldType::Bool).default_value(false))
}

pub fn schema_v1() -> SchemaDescriptor {
    SchemaDescriptor::new(
        V1,
        vec![
            todo_type(),
            RecordType::new("Setting").field(FieldDef::new("notificationEnabled", FieldType::Bool)),
        ],
    )
    .unwrap()
}

pub fn schema_v2() -> SchemaDescriptor {
    SchemaDescriptor::new(
        V2,
        vec![
            todo_type(),
            RecordType::new("Setting")
                .field(FieldDef::new("pushNotificationEnabled", FieldType::Bool))
                .field(FieldDef::new("syncCalendarEnabled", FieldType::Bool).default_value(false)),
        ],
    )
    .unwrap()
}

pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(vec![schema_v1(), schema_v2()]).unwrap())
}

pub fn upgrade_plan() -> MigrationPlan {
    MigrationPlan::upgrade(
        "upgrade",
        vec![V1, V2],
        vec![MigrationStage::custom(V1, V2)
            .rename_field("Setting", "notificationEnabled", "pushNotificationEnabled")
            .build()],
    )
    .unwrap()
}

pub fn downgrade_plan() -> MigrationPlan {
    MigrationPlan::downgrade(
        "downgrade",
        vec![V1, V2],
        vec![MigrationStage::custom(V2, V1)
            .rename_field("Setting", "pushNotificationEnabled", "notificationEnabled")
            .build()],
    )
    .unwrap()
}

pub fn setting_v1(enabled: bool) -> Record {
    Record::new("Setting", RecordId::new_v4()).with("notificationEnabled", enabled)
}

pub fn todo(title: &str) -> Record {
    Record::new("Todo", RecordId::new_v4())
        .with("title", title)
        .with("done", false)
}

/// Create `location` at V1 holding `records`.
pub fn seed_v1<A: StoreAdapter>(adapter: &A, location: &Path, records: &[Record]) {
    let mut handle = adapter.open_under_schema(location, &schema_v1()).unwrap();
    for record in records {
        handle.insert(record.clone()).unwrap();
    }
    handle.save().unwrap();
}

pub fn all<H: StoreHandle>(handle: &H, record_type: &str) -> Vec<Record> {
    handle.fetch(record_type, None).unwrap()
}
