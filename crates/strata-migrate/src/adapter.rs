//! The boundary between the engine and a concrete persistent store.
//!
//! The engine never touches storage directly. It asks a [`StoreAdapter`] for
//! the recorded version of a location and for [`StoreHandle`]s bound to one
//! schema at a time. Every change made through a handle is staged until
//! [`StoreHandle::save`] commits it, records and version marker together, in
//! one transaction. Dropping a handle without saving discards the staged
//! changes.

use std::path::Path;

use crate::error::BoxError;
use crate::record::{Filter, Record, RecordId};
use crate::schema::SchemaDescriptor;
use crate::version::SchemaVersion;

/// Error type of a store adapter.
pub trait AdapterError: std::error::Error + Send + Sync + 'static {
    /// Whether the persisted data does not match the schema it was opened
    /// under. The engine answers these with its bounded format-recovery retry.
    fn is_format_mismatch(&self) -> bool {
        false
    }
}

/// Opens persistent stores under a given schema.
pub trait StoreAdapter {
    /// Handle type produced by [`open_under_schema`](Self::open_under_schema).
    type Handle: StoreHandle<Error = Self::Error>;
    /// Error type for this adapter.
    type Error: AdapterError;

    /// Version marker persisted at `location`, read without opening any schema.
    /// `None` when the location holds no marker or does not exist. Must not
    /// create or modify anything.
    fn recorded_version(&self, location: &Path) -> Result<Option<SchemaVersion>, Self::Error>;

    /// Whether [`open_under_schema`](Self::open_under_schema) would accept
    /// `location` under `descriptor`, answered with the same errors but
    /// without creating, stamping or otherwise modifying the location.
    fn probe_schema(&self, location: &Path, descriptor: &SchemaDescriptor) -> Result<(), Self::Error>;

    /// Open `location` under `descriptor`.
    ///
    /// Implementations must fail with a format mismatch when the recorded
    /// marker names a different version. When no marker exists, an empty
    /// location is accepted as fresh, and a populated one is accepted only if
    /// every record conforms to `descriptor`; in both cases the handle stages
    /// the marker for `descriptor`'s version.
    fn open_under_schema(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
    ) -> Result<Self::Handle, Self::Error>;
}

/// A connection to a store, bound to exactly one schema at a time.
pub trait StoreHandle {
    type Error: AdapterError;

    /// The schema this handle is currently bound to.
    fn descriptor(&self) -> &SchemaDescriptor;

    /// Fetch records of a type, ordered by identifier. Staged changes are
    /// visible to the handle that made them.
    fn fetch(&self, record_type: &str, filter: Option<&Filter>) -> Result<Vec<Record>, Self::Error>;

    /// Fetch a single record by identity.
    fn get(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, Self::Error> {
        Ok(self
            .fetch(record_type, Some(&Filter::Id(id)))?
            .into_iter()
            .next())
    }

    /// Stage a new record. Fails if the identity is taken or the record does
    /// not conform to the bound schema.
    fn insert(&mut self, record: Record) -> Result<(), Self::Error>;

    /// Stage a replacement for an existing record.
    fn update(&mut self, record: Record) -> Result<(), Self::Error>;

    /// Stage a deletion. Returns whether the record existed.
    fn delete(&mut self, record_type: &str, id: RecordId) -> Result<bool, Self::Error>;

    /// Materialize the change from the bound schema to `to` on the staged
    /// data, then rebind the handle to `to`.
    fn reopen_under(&mut self, to: &SchemaDescriptor) -> Result<(), Self::Error>;

    /// Check that every visible record conforms to the bound schema.
    fn verify(&self) -> Result<(), Self::Error>;

    /// Stage a new version marker, committed by the next [`save`](Self::save).
    fn stage_version(&mut self, version: SchemaVersion);

    /// Whether anything is staged.
    fn has_changes(&self) -> bool;

    /// Atomically commit every staged change and the staged marker.
    fn save(&mut self) -> Result<(), Self::Error>;

    /// Discard every staged change.
    fn rollback(&mut self);
}

/// Object-safe read access used by hook contexts.
pub trait RecordReader {
    fn bound_schema(&self) -> &SchemaDescriptor;
    fn read_records(&self, record_type: &str, filter: Option<&Filter>) -> Result<Vec<Record>, BoxError>;
}

/// Object-safe write access used by hook contexts.
pub trait RecordWriter: RecordReader {
    fn insert_record(&mut self, record: Record) -> Result<(), BoxError>;
    fn update_record(&mut self, record: Record) -> Result<(), BoxError>;
    fn delete_record(&mut self, record_type: &str, id: RecordId) -> Result<bool, BoxError>;
}

impl<H: StoreHandle> RecordReader for H {
    fn bound_schema(&self) -> &SchemaDescriptor {
        self.descriptor()
    }

    fn read_records(&self, record_type: &str, filter: Option<&Filter>) -> Result<Vec<Record>, BoxError> {
        self.fetch(record_type, filter).map_err(BoxError::from)
    }
}

impl<H: StoreHandle> RecordWriter for H {
    fn insert_record(&mut self, record: Record) -> Result<(), BoxError> {
        self.insert(record).map_err(BoxError::from)
    }

    fn update_record(&mut self, record: Record) -> Result<(), BoxError> {
        self.update(record).map_err(BoxError::from)
    }

    fn delete_record(&mut self, record_type: &str, id: RecordId) -> Result<bool, BoxError> {
        self.delete(record_type, id).map_err(BoxError::from)
    }
}
