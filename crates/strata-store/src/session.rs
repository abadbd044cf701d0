//! The staged store handle shared by every adapter.
//!
//! A [`Session`] keeps all changes in a [`ChangeSet`] overlay on top of what
//! its [`Backend`] has persisted. Reads merge the two. Nothing reaches the
//! backend until [`StoreHandle::save`], which hands the whole change set to
//! [`Backend::commit`] to be applied in one transaction.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use strata_migrate::{
    reshape, ConformanceError, Filter, Record, RecordId, SchemaDescriptor, SchemaVersion,
    StoreHandle,
};

use crate::error::StoreError;

/// Storage primitives an adapter provides for one location.
pub trait Backend {
    /// The location this backend was opened for.
    fn location(&self) -> &Path;

    /// The persisted version marker, if any.
    fn load_marker(&self) -> Result<Option<SchemaVersion>, StoreError>;

    /// Names of every record type with at least one persisted record.
    fn record_types(&self) -> Result<Vec<String>, StoreError>;

    /// Persisted records of a type, ordered by identifier.
    fn load_records(&self, record_type: &str) -> Result<Vec<Record>, StoreError>;

    fn load_record(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError>;

    /// Apply every change and the marker atomically.
    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError>;
}

/// Changes staged by a [`Session`] and not yet committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    upserts: BTreeMap<(String, RecordId), Record>,
    deletes: BTreeSet<(String, RecordId)>,
    marker: Option<SchemaVersion>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.marker.is_none()
    }

    /// Records to insert or replace.
    pub fn upserts(&self) -> impl Iterator<Item = &Record> {
        self.upserts.values()
    }

    /// Records to remove, as `(record_type, id)`.
    pub fn deletes(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.deletes.iter().map(|(rt, id)| (rt.as_str(), *id))
    }

    /// Version marker to write, if one was staged.
    pub fn marker(&self) -> Option<SchemaVersion> {
        self.marker
    }

    /// Stage an insert or replacement.
    pub fn upsert(&mut self, record: Record) {
        let key = (record.record_type.clone(), record.id);
        self.deletes.remove(&key);
        self.upserts.insert(key, record);
    }

    /// Stage a removal.
    pub fn delete(&mut self, record_type: &str, id: RecordId) {
        let key = (record_type.to_string(), id);
        self.upserts.remove(&key);
        self.deletes.insert(key);
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A store handle bound to one schema, staging every change until saved.
pub struct Session<B: Backend> {
    backend: B,
    descriptor: SchemaDescriptor,
    changes: ChangeSet,
}

impl<B: Backend> Session<B> {
    /// Bind `backend` to `descriptor`.
    ///
    /// A marker for another version is a format mismatch. Without a marker,
    /// the persisted data must conform to `descriptor`, and the marker is
    /// staged.
    pub fn open(backend: B, descriptor: &SchemaDescriptor) -> Result<Self, StoreError> {
        let requested = descriptor.version();
        let mismatch = |reason: String| StoreError::FormatMismatch {
            location: backend.location().to_path_buf(),
            requested,
            reason,
        };

        let mut changes = ChangeSet::default();
        match backend.load_marker()? {
            Some(recorded) if recorded == requested => {}
            Some(recorded) => {
                return Err(mismatch(format!("store is recorded at schema {recorded}")));
            }
            None => {
                for record_type in backend.record_types()? {
                    if descriptor.record_type(&record_type).is_none() {
                        return Err(mismatch(format!(
                            "unversioned store holds `{record_type}` records, which schema {requested} does not declare"
                        )));
                    }
                    for record in backend.load_records(&record_type)? {
                        descriptor
                            .check(&record)
                            .map_err(|e| mismatch(format!("unversioned store does not conform: {e}")))?;
                    }
                }
                tracing::debug!(
                    location = %backend.location().display(),
                    version = %requested,
                    "stamping unversioned store"
                );
                changes.marker = Some(requested);
            }
        }

        Ok(Self {
            backend,
            descriptor: descriptor.clone(),
            changes,
        })
    }

    pub fn location(&self) -> &Path {
        self.backend.location()
    }

    /// Staged changes not yet committed.
    pub fn pending(&self) -> &ChangeSet {
        &self.changes
    }

    fn declared(&self, record_type: &str) -> Result<(), StoreError> {
        match self.descriptor.record_type(record_type) {
            Some(_) => Ok(()),
            None => Err(ConformanceError::UnknownRecordType {
                version: self.descriptor.version(),
                record_type: record_type.to_string(),
            }
            .into()),
        }
    }

    fn visible(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        let key = (record_type.to_string(), id);
        if let Some(record) = self.changes.upserts.get(&key) {
            return Ok(Some(record.clone()));
        }
        if self.changes.deletes.contains(&key) {
            return Ok(None);
        }
        self.backend.load_record(record_type, id)
    }
}

impl<B: Backend> StoreHandle for Session<B> {
    type Error = StoreError;

    fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    fn fetch(&self, record_type: &str, filter: Option<&Filter>) -> Result<Vec<Record>, StoreError> {
        self.declared(record_type)?;

        if let Some(Filter::Id(id)) = filter {
            return Ok(self.visible(record_type, *id)?.into_iter().collect());
        }

        let mut merged: BTreeMap<RecordId, Record> = self
            .backend
            .load_records(record_type)?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        for (rt, id) in &self.changes.deletes {
            if rt == record_type {
                merged.remove(id);
            }
        }
        for ((rt, id), record) in &self.changes.upserts {
            if rt == record_type {
                merged.insert(*id, record.clone());
            }
        }

        Ok(merged
            .into_values()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .collect())
    }

    fn get(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        self.declared(record_type)?;
        self.visible(record_type, id)
    }

    fn insert(&mut self, record: Record) -> Result<(), StoreError> {
        self.descriptor.check(&record)?;
        if self.visible(&record.record_type, record.id)?.is_some() {
            return Err(StoreError::DuplicateRecord {
                record_type: record.record_type,
                id: record.id,
            });
        }
        self.changes.upsert(record);
        Ok(())
    }

    fn update(&mut self, record: Record) -> Result<(), StoreError> {
        self.descriptor.check(&record)?;
        if self.visible(&record.record_type, record.id)?.is_none() {
            return Err(StoreError::MissingRecord {
                record_type: record.record_type,
                id: record.id,
            });
        }
        self.changes.upsert(record);
        Ok(())
    }

    fn delete(&mut self, record_type: &str, id: RecordId) -> Result<bool, StoreError> {
        self.declared(record_type)?;
        if self.visible(record_type, id)?.is_none() {
            return Ok(false);
        }
        self.changes.delete(record_type, id);
        Ok(true)
    }

    fn reopen_under(&mut self, to: &SchemaDescriptor) -> Result<(), StoreError> {
        let from = self.descriptor.clone();
        for from_type in from.record_types() {
            let records = self.fetch(&from_type.name, None)?;
            let count = records.len();
            match to.record_type(&from_type.name) {
                Some(to_type) => {
                    for record in records {
                        self.changes.upsert(reshape(record, from_type, to_type));
                    }
                    tracing::debug!(record_type = %from_type.name, records = count, "reshaped");
                }
                None => {
                    for record in records {
                        self.changes.delete(&from_type.name, record.id);
                    }
                    tracing::debug!(record_type = %from_type.name, records = count, "dropped");
                }
            }
        }
        self.descriptor = to.clone();
        Ok(())
    }

    fn verify(&self) -> Result<(), StoreError> {
        for record_type in self.descriptor.record_types() {
            for record in self.fetch(&record_type.name, None)? {
                record_type.check(&record)?;
            }
        }
        Ok(())
    }

    fn stage_version(&mut self, version: SchemaVersion) {
        self.changes.marker = Some(version);
    }

    fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if self.changes.is_empty() {
            return Ok(());
        }
        self.backend.commit(&self.changes)?;
        tracing::debug!(
            location = %self.backend.location().display(),
            upserts = self.changes.upserts.len(),
            deletes = self.changes.deletes.len(),
            marker = ?self.changes.marker,
            "changes committed"
        );
        self.changes.clear();
        Ok(())
    }

    fn rollback(&mut self) {
        self.changes.clear();
    }
}
