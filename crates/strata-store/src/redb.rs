//! Pure-Rust store adapter using [`redb`](https://docs.rs/redb).
//!
//! No C dependencies, for targets where bundling SQLite is inconvenient.
//!
//! Enable with `features = ["redb"]`.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use strata_migrate::StoreAdapter;
//! use strata_store::RedbStore;
//!
//! let store = RedbStore::new();
//! let version = store.recorded_version(Path::new("/tmp/app.redb")).unwrap();
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, TableError};
use strata_migrate::{Record, RecordId, SchemaDescriptor, SchemaVersion, StoreAdapter};

use crate::codec::{self, VERSION_KEY};
use crate::error::StoreError;
use crate::session::{Backend, ChangeSet, Session};

// ── Table definitions ───────────────────────────────────────────────

const RECORD_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("strata_records");
const META_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("strata_meta");

fn err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb(e.to_string())
}

/// Open a table for reading. A table no commit has created yet reads as
/// absent.
fn read_table(
    txn: &ReadTransaction,
    table: TableDefinition<&'static [u8], &'static [u8]>,
) -> Result<Option<ReadOnlyTable<&'static [u8], &'static [u8]>>, StoreError> {
    match txn.open_table(table) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(err(e)),
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// A pure-Rust store adapter built on [`redb`].
///
/// redb allows one open `Database` per file and process, so opened files
/// are cached and shared by every handle this adapter creates.
#[derive(Default)]
pub struct RedbStore {
    databases: Mutex<HashMap<PathBuf, Arc<Database>>>,
}

impl RedbStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) the database file at `location`.
    pub fn backend(&self, location: &Path) -> Result<RedbBackend, StoreError> {
        let mut databases = self.databases.lock().map_err(|_| StoreError::LockPoisoned)?;
        let db = match databases.get(location) {
            Some(db) => Arc::clone(db),
            None => {
                let db = Arc::new(Database::create(location).map_err(err)?);
                databases.insert(location.to_path_buf(), Arc::clone(&db));
                db
            }
        };
        Ok(RedbBackend {
            db,
            location: location.to_path_buf(),
        })
    }

    /// Backend for an existing file, opened without creating anything.
    /// `None` when nothing exists at `location`.
    fn existing_backend(&self, location: &Path) -> Result<Option<RedbBackend>, StoreError> {
        let mut databases = self.databases.lock().map_err(|_| StoreError::LockPoisoned)?;
        let db = match databases.get(location) {
            Some(db) => Arc::clone(db),
            None if !location.exists() => return Ok(None),
            None => {
                let db = Arc::new(Database::open(location).map_err(err)?);
                databases.insert(location.to_path_buf(), Arc::clone(&db));
                db
            }
        };
        Ok(Some(RedbBackend {
            db,
            location: location.to_path_buf(),
        }))
    }
}

impl StoreAdapter for RedbStore {
    type Handle = Session<RedbBackend>;
    type Error = StoreError;

    fn recorded_version(&self, location: &Path) -> Result<Option<SchemaVersion>, StoreError> {
        match self.existing_backend(location)? {
            Some(backend) => backend.load_marker(),
            None => Ok(None),
        }
    }

    fn probe_schema(&self, location: &Path, descriptor: &SchemaDescriptor) -> Result<(), StoreError> {
        match self.existing_backend(location)? {
            Some(backend) => Session::open(backend, descriptor).map(drop),
            None => Ok(()),
        }
    }

    fn open_under_schema(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
    ) -> Result<Self::Handle, StoreError> {
        Session::open(self.backend(location)?, descriptor)
    }
}

/// One open redb database file.
pub struct RedbBackend {
    db: Arc<Database>,
    location: PathBuf,
}

impl Backend for RedbBackend {
    fn location(&self) -> &Path {
        &self.location
    }

    fn load_marker(&self) -> Result<Option<SchemaVersion>, StoreError> {
        let txn = self.db.begin_read().map_err(err)?;
        let Some(table) = read_table(&txn, META_TABLE)? else {
            return Ok(None);
        };
        let stored = table
            .get(VERSION_KEY.as_bytes())
            .map_err(err)?
            .map(|guard| guard.value().to_vec());
        match stored {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| StoreError::Corrupt(format!("version marker: {e}")))?;
                codec::decode_version(text).map(Some)
            }
            None => Ok(None),
        }
    }

    fn record_types(&self) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().map_err(err)?;
        let Some(table) = read_table(&txn, RECORD_TABLE)? else {
            return Ok(Vec::new());
        };

        let mut types = BTreeSet::new();
        for item in table.iter().map_err(err)? {
            let (key_guard, _) = item.map_err(err)?;
            let (record_type, _) = parse_record_key(key_guard.value())?;
            types.insert(record_type.to_string());
        }
        Ok(types.into_iter().collect())
    }

    fn load_records(&self, record_type: &str) -> Result<Vec<Record>, StoreError> {
        let txn = self.db.begin_read().map_err(err)?;
        let Some(table) = read_table(&txn, RECORD_TABLE)? else {
            return Ok(Vec::new());
        };

        let prefix = record_key_prefix(record_type);
        let upper = record_key_prefix_upper(record_type);
        let range = table
            .range(prefix.as_slice()..upper.as_slice())
            .map_err(err)?;

        let mut records = Vec::new();
        for item in range {
            let (key_guard, value_guard) = item.map_err(err)?;
            let (_, id) = parse_record_key(key_guard.value())?;
            records.push(Record {
                record_type: record_type.to_string(),
                id,
                fields: codec::decode_fields(value_guard.value())?,
            });
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn load_record(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        let txn = self.db.begin_read().map_err(err)?;
        let Some(table) = read_table(&txn, RECORD_TABLE)? else {
            return Ok(None);
        };
        let stored = table
            .get(record_key(record_type, id).as_slice())
            .map_err(err)?
            .map(|guard| guard.value().to_vec());
        match stored {
            Some(bytes) => Ok(Some(Record {
                record_type: record_type.to_string(),
                id,
                fields: codec::decode_fields(&bytes)?,
            })),
            None => Ok(None),
        }
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(err)?;
        {
            let mut records = txn.open_table(RECORD_TABLE).map_err(err)?;
            for (record_type, id) in changes.deletes() {
                records
                    .remove(record_key(record_type, id).as_slice())
                    .map_err(err)?;
            }
            for record in changes.upserts() {
                let data = codec::encode_fields(&record.fields)?;
                records
                    .insert(record_key(&record.record_type, record.id).as_slice(), data.as_slice())
                    .map_err(err)?;
            }

            if let Some(version) = changes.marker() {
                let mut meta = txn.open_table(META_TABLE).map_err(err)?;
                meta.insert(
                    VERSION_KEY.as_bytes(),
                    codec::encode_version(version).as_bytes(),
                )
                .map_err(err)?;
            }
        }
        txn.commit().map_err(err)?;
        Ok(())
    }
}

// ── Key encoding helpers ────────────────────────────────────────────

/// Record key: `record_type \0 id`
fn record_key(record_type: &str, id: RecordId) -> Vec<u8> {
    let id = id.to_string();
    let mut k = Vec::with_capacity(record_type.len() + 1 + id.len());
    k.extend_from_slice(record_type.as_bytes());
    k.push(0);
    k.extend_from_slice(id.as_bytes());
    k
}

/// Lower bound for all keys of a record type.
fn record_key_prefix(record_type: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(record_type.len() + 1);
    k.extend_from_slice(record_type.as_bytes());
    k.push(0);
    k
}

/// Upper bound (exclusive) for all keys of a record type.
fn record_key_prefix_upper(record_type: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(record_type.len() + 1);
    k.extend_from_slice(record_type.as_bytes());
    k.push(1);
    k
}

fn parse_record_key(key: &[u8]) -> Result<(&str, RecordId), StoreError> {
    let corrupt = || StoreError::Corrupt(format!("malformed record key {key:?}"));
    let pos = key.iter().position(|&b| b == 0).ok_or_else(corrupt)?;
    let record_type = std::str::from_utf8(&key[..pos]).map_err(|_| corrupt())?;
    let id = std::str::from_utf8(&key[pos + 1..]).map_err(|_| corrupt())?;
    Ok((record_type, codec::decode_id(id)?))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use strata_migrate::{FieldDef, FieldType, RecordType, StoreHandle};

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(
            SchemaVersion::major(1),
            vec![
                RecordType::new("Todo").field(FieldDef::new("title", FieldType::Text)),
                RecordType::new("Tag").field(FieldDef::new("label", FieldType::Text)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn key_round_trip() {
        let id = RecordId::new_v4();
        let key = record_key("Todo", id);
        assert_eq!(parse_record_key(&key).unwrap(), ("Todo", id));
        assert!(parse_record_key(b"no-separator").is_err());
    }

    #[test]
    fn record_types_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.redb");
        let store = RedbStore::new();

        let mut handle = store.open_under_schema(&path, &schema()).unwrap();
        handle
            .insert(Record::new("Todo", RecordId::new_v4()).with("title", "a"))
            .unwrap();
        handle
            .insert(Record::new("Tag", RecordId::new_v4()).with("label", "b"))
            .unwrap();
        handle.save().unwrap();

        let backend = store.backend(&path).unwrap();
        assert_eq!(backend.load_records("Todo").unwrap().len(), 1);
        assert_eq!(backend.load_records("Tag").unwrap().len(), 1);
        assert_eq!(
            backend.record_types().unwrap(),
            vec!["Tag".to_string(), "Todo".to_string()]
        );
    }

    #[test]
    fn reading_a_missing_file_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.redb");
        let store = RedbStore::new();

        assert_eq!(store.recorded_version(&path).unwrap(), None);
        store.probe_schema(&path, &schema()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn fresh_file_without_tables_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.redb");
        let store = RedbStore::new();

        let backend = store.backend(&path).unwrap();
        assert_eq!(backend.load_marker().unwrap(), None);
        assert!(backend.record_types().unwrap().is_empty());
        assert_eq!(store.recorded_version(&path).unwrap(), None);
    }

    #[test]
    fn open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let rec = Record::new("Todo", RecordId::new_v4()).with("title", "persist");
        {
            let store = RedbStore::new();
            let mut handle = store.open_under_schema(&path, &schema()).unwrap();
            handle.insert(rec.clone()).unwrap();
            handle.save().unwrap();
        }
        // Reopen
        let store = RedbStore::new();
        assert_eq!(
            store.recorded_version(&path).unwrap(),
            Some(SchemaVersion::major(1))
        );
        let handle = store.open_under_schema(&path, &schema()).unwrap();
        assert_eq!(handle.get("Todo", rec.id).unwrap(), Some(rec));
    }
}
