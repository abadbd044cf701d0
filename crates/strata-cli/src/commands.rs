use std::path::Path;

use serde_json::json;
use strata_manifest::Manifest;
use strata_migrate::{EngineConfig, MigrationEngine, Record, SchemaVersion, Value};
use strata_store::{inspect, SqliteBackend, SqliteStore};

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

/// Open the raw backend of an existing store file, read-only.
fn open_backend(db_path: &str) -> std::result::Result<SqliteBackend, Box<dyn std::error::Error>> {
    let path = Path::new(db_path);
    if !path.exists() {
        return Err(format!("Store file not found: {db_path}").into());
    }
    Ok(SqliteStore::new().read_only_backend(path)?)
}

/// `strata status <db>`: recorded version and record counts.
pub fn status(db_path: &str, manifest_path: Option<&str>) -> Result {
    let backend = open_backend(db_path)?;
    let summary = inspect::summarize(&backend)?;
    let journal = backend.journal_mode()?;

    println!("Store: {db_path} (SQLite, {journal} mode)");
    match summary.version {
        Some(version) => println!("Schema version: {version}"),
        None => println!("Schema version: (unversioned)"),
    }

    if let (Some(path), Some(version)) = (manifest_path, summary.version) {
        let manifest = Manifest::load(path)?;
        if manifest.registry().contains(version) {
            println!("Registered in {path}: yes");
        } else {
            println!(
                "Registered in {path}: no (known: {})",
                join_versions(&manifest.registry().all_versions())
            );
        }
    }
    println!();

    if summary.record_counts.is_empty() {
        println!("  (empty store)");
        return Ok(());
    }

    println!("  {:<24} {:>10}", "Record type", "Records");
    println!("  {}", "-".repeat(35));
    for (record_type, count) in &summary.record_counts {
        println!("  {:<24} {:>10}", record_type, format_num(*count as u64));
    }
    println!("  {}", "-".repeat(35));
    println!(
        "  {:<24} {:>10}",
        "Total",
        format_num(summary.total_records() as u64)
    );
    println!();

    Ok(())
}

/// `strata inspect <db> [record_type]`
pub fn inspect(db_path: &str, record_type: Option<&str>) -> Result {
    let backend = open_backend(db_path)?;

    match record_type {
        Some(record_type) => inspect_type(&backend, record_type),
        None => inspect_list(&backend),
    }
}

fn inspect_type(backend: &SqliteBackend, record_type: &str) -> Result {
    let records = inspect::dump(backend, Some(record_type))?;
    if records.is_empty() {
        eprintln!("No '{record_type}' records");
        return Ok(());
    }

    println!("{record_type} ({} records)", records.len());
    for record in &records {
        println!("  {}", record.id);
        for (name, value) in &record.fields {
            println!("    {name:<28} {}", format_value(value));
        }
    }
    println!();
    Ok(())
}

fn inspect_list(backend: &SqliteBackend) -> Result {
    let summary = inspect::summarize(backend)?;

    if summary.record_counts.is_empty() {
        println!("  (empty store)");
        return Ok(());
    }

    for (record_type, count) in &summary.record_counts {
        println!("Record type: {record_type} ({count} records)");
        for record in inspect::dump(backend, Some(record_type))? {
            println!("  {}", record.id);
        }
        println!();
    }

    Ok(())
}

/// `strata export <db>`: records as JSON.
pub fn export(db_path: &str, record_type: Option<&str>) -> Result {
    let backend = open_backend(db_path)?;
    let summary = inspect::summarize(&backend)?;
    let records: Vec<_> = inspect::dump(&backend, record_type)?
        .iter()
        .map(record_json)
        .collect();

    let output = json!({
        "store": {
            "location": db_path,
            "version": summary.version.map(|v| v.to_string()),
            "total_records": summary.total_records(),
        },
        "records": records,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// `strata migrate <db> --to <version> --plan <name>`
pub fn migrate(
    db_path: &str,
    to: &str,
    plan_name: &str,
    manifest_path: &str,
    retries: Option<u32>,
    dry_run: bool,
) -> Result {
    let target: SchemaVersion = to.parse()?;
    let manifest = Manifest::load(manifest_path)?;
    let plan = manifest.plan(plan_name)?;

    let mut config = EngineConfig::default();
    if let Some(retries) = retries {
        config.retry_budget = retries;
    }
    let engine =
        MigrationEngine::new(SqliteStore::new(), manifest.shared_registry()).with_config(config);

    if dry_run {
        let current = engine.recorded_version(db_path)?;
        let pending = engine.pending_stages(db_path, target, Some(plan))?;
        match current {
            Some(version) => println!("Store at {version}, target {target}"),
            None => println!("Store unversioned, target {target}"),
        }
        if pending.is_empty() {
            println!("Dry run: no stages to apply");
        } else {
            println!("Dry run: would apply {} stage(s):", pending.len());
            for stage in &pending {
                println!("  [{}] {} -> {}", stage.index, stage.from, stage.to);
            }
        }
        return Ok(());
    }

    let (_handle, report) = engine.open_store_with_report(db_path, target, Some(plan))?;
    for stage in &report.stages {
        println!("  Applied [{}] {} -> {}", stage.index, stage.from, stage.to);
    }
    if report.retries_used > 0 {
        println!("  Recovered from a format mismatch ({} retries)", report.retries_used);
    }
    if report.migrated() {
        println!(
            "\nMigrated {db_path} to {target} ({} stages)",
            report.stages.len()
        );
    } else {
        println!("{db_path} is at {target}, nothing to migrate");
    }
    Ok(())
}

/// `strata validate`: check a manifest.
pub fn validate(manifest_path: &str) -> Result {
    let manifest = Manifest::load(manifest_path)?;
    let registry = manifest.registry();

    println!("Manifest: {manifest_path}");
    println!("Schemas: {}", join_versions(&registry.all_versions()));
    for descriptor in registry.iter() {
        let names: Vec<&str> = descriptor
            .record_types()
            .iter()
            .map(|rt| rt.name.as_str())
            .collect();
        println!("  {}: {}", descriptor.version(), names.join(", "));
    }

    println!("Plans:");
    for name in manifest.plan_names() {
        let plan = manifest.plan(name)?;
        println!(
            "  {name} ({}, {} stages): {}",
            plan.direction(),
            plan.stages().len(),
            join_versions(plan.schemas())
        );
    }
    println!("\nManifest is valid");
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn record_json(record: &Record) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = record
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), value_json(value)))
        .collect();
    json!({
        "type": record.record_type,
        "id": record.id.to_string(),
        "fields": fields,
    })
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Text(s) => json!(s),
        Value::Bytes(bytes) => json!(bytes),
        Value::Id(id) => json!(id.to_string()),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        other => value_json(other).to_string(),
    }
}

fn join_versions(versions: &[SchemaVersion]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_num(n: u64) -> String {
    if n < 1000 {
        return n.to_string();
    }
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}
