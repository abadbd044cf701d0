//! Store access handed to migration hooks.
//!
//! A [`ReadContext`] is bound to the stage's source schema and only reads.
//! A [`WriteContext`] is bound to the target schema. Writes are staged on
//! the stage's handle and committed by the engine together with the new
//! version marker once the hook returns.

use crate::adapter::{RecordReader, RecordWriter};
use crate::error::{HookError, HookResult};
use crate::record::{Filter, Record, RecordId};
use crate::schema::SchemaDescriptor;
use crate::version::SchemaVersion;

/// Read-only view of the store under the stage's `from` schema.
pub struct ReadContext<'a> {
    reader: &'a dyn RecordReader,
    to: SchemaVersion,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(reader: &'a dyn RecordReader, to: SchemaVersion) -> Self {
        Self { reader, to }
    }

    /// Schema the store is currently opened under.
    pub fn schema(&self) -> &SchemaDescriptor {
        self.reader.bound_schema()
    }

    pub fn from_version(&self) -> SchemaVersion {
        self.reader.bound_schema().version()
    }

    pub fn to_version(&self) -> SchemaVersion {
        self.to
    }

    /// All records of a type, ordered by identifier.
    pub fn fetch(&self, record_type: &str) -> HookResult<Vec<Record>> {
        read(self.reader, record_type, None)
    }

    pub fn fetch_where(&self, record_type: &str, filter: &Filter) -> HookResult<Vec<Record>> {
        read(self.reader, record_type, Some(filter))
    }

    /// The first record of a type, or `None` when there is none.
    pub fn first(&self, record_type: &str) -> HookResult<Option<Record>> {
        Ok(self.fetch(record_type)?.into_iter().next())
    }

    pub fn get(&self, record_type: &str, id: RecordId) -> HookResult<Option<Record>> {
        Ok(self
            .fetch_where(record_type, &Filter::Id(id))?
            .into_iter()
            .next())
    }

    pub fn count(&self, record_type: &str) -> HookResult<usize> {
        Ok(self.fetch(record_type)?.len())
    }
}

/// Read-write view of the store under the stage's `to` schema.
pub struct WriteContext<'a> {
    writer: &'a mut dyn RecordWriter,
    from: SchemaVersion,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(writer: &'a mut dyn RecordWriter, from: SchemaVersion) -> Self {
        Self { writer, from }
    }

    /// Schema the store is currently opened under.
    pub fn schema(&self) -> &SchemaDescriptor {
        self.writer.bound_schema()
    }

    pub fn from_version(&self) -> SchemaVersion {
        self.from
    }

    pub fn to_version(&self) -> SchemaVersion {
        self.writer.bound_schema().version()
    }

    pub fn fetch(&self, record_type: &str) -> HookResult<Vec<Record>> {
        read(&*self.writer, record_type, None)
    }

    pub fn fetch_where(&self, record_type: &str, filter: &Filter) -> HookResult<Vec<Record>> {
        read(&*self.writer, record_type, Some(filter))
    }

    /// The first record of a type, or `None` when there is none.
    pub fn first(&self, record_type: &str) -> HookResult<Option<Record>> {
        Ok(self.fetch(record_type)?.into_iter().next())
    }

    pub fn get(&self, record_type: &str, id: RecordId) -> HookResult<Option<Record>> {
        Ok(self
            .fetch_where(record_type, &Filter::Id(id))?
            .into_iter()
            .next())
    }

    /// Like [`get`](Self::get), but a missing record is an error.
    pub fn require(&self, record_type: &str, id: RecordId) -> HookResult<Record> {
        self.get(record_type, id)?
            .ok_or_else(|| HookError::MissingRecord {
                record_type: record_type.to_string(),
                id,
            })
    }

    pub fn insert(&mut self, record: Record) -> HookResult<()> {
        self.writer.insert_record(record).map_err(HookError::Store)
    }

    pub fn update(&mut self, record: Record) -> HookResult<()> {
        self.writer.update_record(record).map_err(HookError::Store)
    }

    pub fn delete(&mut self, record_type: &str, id: RecordId) -> HookResult<bool> {
        self.writer
            .delete_record(record_type, id)
            .map_err(HookError::Store)
    }
}

fn read<R: RecordReader + ?Sized>(
    reader: &R,
    record_type: &str,
    filter: Option<&Filter>,
) -> HookResult<Vec<Record>> {
    reader
        .read_records(record_type, filter)
        .map_err(HookError::Store)
}
