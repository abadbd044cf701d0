//! Schema-free reads of a store location, for tooling.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use strata_migrate::{Record, SchemaVersion};

use crate::error::StoreError;
use crate::session::Backend;

/// What a location holds, read without opening any schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub location: PathBuf,
    pub version: Option<SchemaVersion>,
    /// Committed record count per record type.
    pub record_counts: BTreeMap<String, usize>,
}

impl StoreSummary {
    pub fn total_records(&self) -> usize {
        self.record_counts.values().sum()
    }
}

pub fn summarize<B: Backend>(backend: &B) -> Result<StoreSummary, StoreError> {
    let mut record_counts = BTreeMap::new();
    for record_type in backend.record_types()? {
        let count = backend.load_records(&record_type)?.len();
        record_counts.insert(record_type, count);
    }
    Ok(StoreSummary {
        location: backend.location().to_path_buf(),
        version: backend.load_marker()?,
        record_counts,
    })
}

/// Committed records of one type, or of every type when `record_type` is
/// `None`, ordered by type then identifier.
pub fn dump<B: Backend>(backend: &B, record_type: Option<&str>) -> Result<Vec<Record>, StoreError> {
    match record_type {
        Some(record_type) => backend.load_records(record_type),
        None => {
            let mut records = Vec::new();
            for record_type in backend.record_types()? {
                records.extend(backend.load_records(&record_type)?);
            }
            Ok(records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::path::Path;
    use strata_migrate::RecordId;

    #[test]
    fn summary_counts_by_type() {
        let store = MemoryStore::new();
        store
            .seed(
                "legacy",
                [
                    Record::new("Todo", RecordId::new_v4()),
                    Record::new("Todo", RecordId::new_v4()),
                    Record::new("Setting", RecordId::new_v4()),
                ],
            )
            .unwrap();

        let backend = store.backend(Path::new("legacy"));
        let summary = summarize(&backend).unwrap();
        assert_eq!(summary.version, None);
        assert_eq!(summary.record_counts.get("Todo"), Some(&2));
        assert_eq!(summary.record_counts.get("Setting"), Some(&1));
        assert_eq!(summary.total_records(), 3);

        assert_eq!(dump(&backend, None).unwrap().len(), 3);
        assert_eq!(dump(&backend, Some("Setting")).unwrap().len(), 1);
        assert!(dump(&backend, Some("Missing")).unwrap().is_empty());
    }
}
