use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use strata_migrate::{Record, RecordId, SchemaDescriptor, SchemaVersion, StoreAdapter};

use crate::error::StoreError;
use crate::session::{Backend, ChangeSet, Session};

/// In-memory store adapter.
///
/// Locations are plain keys into a shared map. Nothing touches disk, but a
/// committed location stays available to every clone of the store for as
/// long as one of them lives. Ideal for tests and prototyping.
///
/// # Example
///
/// ```
/// use std::path::Path;
///
/// use strata_migrate::{Record, RecordId, RecordType, SchemaDescriptor, SchemaVersion, StoreAdapter, StoreHandle};
/// use strata_store::MemoryStore;
///
/// let schema = SchemaDescriptor::new(SchemaVersion::major(1), vec![RecordType::new("Todo")]).unwrap();
/// let store = MemoryStore::new();
///
/// let mut handle = store.open_under_schema(Path::new("todos"), &schema).unwrap();
/// handle.insert(Record::new("Todo", RecordId::new_v4())).unwrap();
/// handle.save().unwrap();
///
/// assert_eq!(store.recorded_version(Path::new("todos")).unwrap(), Some(SchemaVersion::major(1)));
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    locations: Arc<Mutex<BTreeMap<PathBuf, MemoryDb>>>,
    reject_next_commit: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Default)]
struct MemoryDb {
    marker: Option<SchemaVersion>,
    records: BTreeMap<(String, RecordId), Record>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail without applying anything.
    pub fn reject_next_commit(&self) {
        self.reject_next_commit.store(true, Ordering::SeqCst);
    }

    /// Write records directly, bypassing schemas and the version marker.
    /// Used to stage legacy or hand-built fixtures.
    pub fn seed(
        &self,
        location: impl AsRef<Path>,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<(), StoreError> {
        let mut locations = self.lock()?;
        let db = locations.entry(location.as_ref().to_path_buf()).or_default();
        for record in records {
            db.records.insert((record.record_type.clone(), record.id), record);
        }
        Ok(())
    }

    /// Number of committed records at `location`.
    pub fn record_count(&self, location: impl AsRef<Path>) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .get(location.as_ref())
            .map_or(0, |db| db.records.len()))
    }

    pub fn backend(&self, location: &Path) -> MemoryBackend {
        MemoryBackend {
            store: self.clone(),
            location: location.to_path_buf(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<PathBuf, MemoryDb>>, StoreError> {
        self.locations.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn read<T>(&self, location: &Path, f: impl FnOnce(&MemoryDb) -> T) -> Result<Option<T>, StoreError> {
        Ok(self.lock()?.get(location).map(f))
    }
}

impl StoreAdapter for MemoryStore {
    type Handle = Session<MemoryBackend>;
    type Error = StoreError;

    fn recorded_version(&self, location: &Path) -> Result<Option<SchemaVersion>, StoreError> {
        self.backend(location).load_marker()
    }

    fn probe_schema(&self, location: &Path, descriptor: &SchemaDescriptor) -> Result<(), StoreError> {
        Session::open(self.backend(location), descriptor).map(drop)
    }

    fn open_under_schema(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
    ) -> Result<Self::Handle, StoreError> {
        Session::open(self.backend(location), descriptor)
    }
}

/// One location of a [`MemoryStore`].
pub struct MemoryBackend {
    store: MemoryStore,
    location: PathBuf,
}

impl Backend for MemoryBackend {
    fn location(&self) -> &Path {
        &self.location
    }

    fn load_marker(&self) -> Result<Option<SchemaVersion>, StoreError> {
        Ok(self.store.read(&self.location, |db| db.marker)?.flatten())
    }

    fn record_types(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .read(&self.location, |db| {
                let mut types: Vec<String> = db.records.keys().map(|(rt, _)| rt.clone()).collect();
                types.dedup();
                types
            })?
            .unwrap_or_default())
    }

    fn load_records(&self, record_type: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .store
            .read(&self.location, |db| {
                db.records
                    .iter()
                    .filter(|((rt, _), _)| rt == record_type)
                    .map(|(_, r)| r.clone())
                    .collect()
            })?
            .unwrap_or_default())
    }

    fn load_record(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self
            .store
            .read(&self.location, |db| {
                db.records.get(&(record_type.to_string(), id)).cloned()
            })?
            .flatten())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        if self.store.reject_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitRejected(format!(
                "injected failure at {}",
                self.location.display()
            )));
        }

        let mut locations = self.store.lock()?;
        let db = locations.entry(self.location.clone()).or_default();
        for (record_type, id) in changes.deletes() {
            db.records.remove(&(record_type.to_string(), id));
        }
        for record in changes.upserts() {
            db.records
                .insert((record.record_type.clone(), record.id), record.clone());
        }
        if let Some(marker) = changes.marker() {
            db.marker = Some(marker);
        }
        Ok(())
    }
}
