use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use strata_migrate::{
    FieldDef, FieldType, MigrationEngine, MigrationPlan, MigrationStage, Record, RecordId,
    RecordType, SchemaDescriptor, SchemaRegistry, SchemaVersion, StoreAdapter, StoreHandle,
};
use strata_store::{MemoryStore, SqliteStore};

const RECORDS: usize = 1000;

fn registry() -> SchemaRegistry {
    SchemaRegistry::new(vec![
        SchemaDescriptor::new(
            SchemaVersion::major(1),
            vec![RecordType::new("Setting").field(FieldDef::new("notificationEnabled", FieldType::Bool))],
        )
        .unwrap(),
        SchemaDescriptor::new(
            SchemaVersion::major(2),
            vec![RecordType::new("Setting")
                .field(FieldDef::new("pushNotificationEnabled", FieldType::Bool))
                .field(FieldDef::new("syncCalendarEnabled", FieldType::Bool).default_value(false))],
        )
        .unwrap(),
    ])
    .unwrap()
}

fn upgrade() -> MigrationPlan {
    let (v1, v2) = (SchemaVersion::major(1), SchemaVersion::major(2));
    MigrationPlan::upgrade(
        "upgrade",
        vec![v1, v2],
        vec![MigrationStage::custom(v1, v2)
            .rename_field("Setting", "notificationEnabled", "pushNotificationEnabled")
            .build()],
    )
    .unwrap()
}

fn populate<A: StoreAdapter>(adapter: &A, location: &Path, registry: &SchemaRegistry) {
    let v1 = registry.oldest();
    let mut handle = adapter.open_under_schema(location, v1).unwrap();
    for i in 0..RECORDS {
        let record = Record::new("Setting", RecordId::new_v4()).with("notificationEnabled", i % 2 == 0);
        handle.insert(record).unwrap();
    }
    handle.save().unwrap();
}

fn bench_memory_upgrade(c: &mut Criterion) {
    let plan = upgrade();
    c.bench_function("MemoryStore upgrade 1000 records", |b| {
        b.iter_batched(
            || {
                let store = MemoryStore::new();
                let registry = registry();
                populate(&store, Path::new("bench"), &registry);
                MigrationEngine::new(store, registry)
            },
            |engine| {
                let handle = engine
                    .open_store("bench", SchemaVersion::major(2), Some(&plan))
                    .unwrap();
                black_box(handle.has_changes())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_sqlite_upgrade(c: &mut Criterion) {
    let plan = upgrade();
    c.bench_function("SqliteStore upgrade 1000 records", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("bench.db");
                let registry = registry();
                populate(&SqliteStore::new(), &path, &registry);
                (dir, path, MigrationEngine::new(SqliteStore::new(), registry))
            },
            |(_dir, path, engine)| {
                let handle = engine
                    .open_store(&path, SchemaVersion::major(2), Some(&plan))
                    .unwrap();
                black_box(handle.has_changes())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_idempotent_open(c: &mut Criterion) {
    let store = MemoryStore::new();
    let registry = registry();
    populate(&store, Path::new("bench"), &registry);
    let engine = MigrationEngine::new(store, registry);

    c.bench_function("MemoryStore open at current version", |b| {
        b.iter(|| {
            let handle = engine
                .open_store("bench", SchemaVersion::major(1), None)
                .unwrap();
            black_box(handle.has_changes())
        })
    });
}

criterion_group!(
    benches,
    bench_memory_upgrade,
    bench_sqlite_upgrade,
    bench_idempotent_open
);
criterion_main!(benches);
