use std::collections::BTreeMap;

use crate::record::{RecordId, Value};

/// Data carried from the will phase of a stage to the did phase of the
/// same stage invocation.
///
/// Once the store is reopened under the target schema, fields of the old
/// shape are gone. Anything the did phase needs from them (renamed values,
/// inputs to derived fields) must be captured here first. The backup is
/// returned by value from the will phase and moved into the did phase, so it
/// cannot outlive or leak across stage invocations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationBackup {
    fields: BTreeMap<(String, RecordId), BTreeMap<String, Value>>,
    values: BTreeMap<String, Value>,
}

impl MigrationBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.values.is_empty()
    }

    /// Stash `value` for `field` of one record.
    pub fn stash_field(
        &mut self,
        record_type: &str,
        id: RecordId,
        field: impl Into<String>,
        value: Value,
    ) {
        self.fields
            .entry((record_type.to_string(), id))
            .or_default()
            .insert(field.into(), value);
    }

    /// Stashed value for `field` of one record.
    pub fn field(&self, record_type: &str, id: RecordId, field: &str) -> Option<&Value> {
        self.fields
            .get(&(record_type.to_string(), id))
            .and_then(|m| m.get(field))
    }

    /// Remove and return the stashed value for `field` of one record.
    pub fn take_field(&mut self, record_type: &str, id: RecordId, field: &str) -> Option<Value> {
        let key = (record_type.to_string(), id);
        let entry = self.fields.get_mut(&key)?;
        let value = entry.remove(field);
        if entry.is_empty() {
            self.fields.remove(&key);
        }
        value
    }

    /// Identities of every record of `record_type` with stashed fields.
    pub fn stashed_ids(&self, record_type: &str) -> Vec<RecordId> {
        self.fields
            .keys()
            .filter(|(rt, _)| rt == record_type)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Store a free-form named value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Fold `other` into `self`. Entries in `other` win on conflict.
    pub fn merge(&mut self, other: MigrationBackup) {
        for (key, fields) in other.fields {
            self.fields.entry(key).or_default().extend(fields);
        }
        self.values.extend(other.values);
    }
}
