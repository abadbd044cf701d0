use std::path::PathBuf;

use strata_migrate::{AdapterError, ConformanceError, RecordId, SchemaVersion};

/// Error type shared by every adapter in this crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persisted data cannot be opened under the requested schema.
    #[error("store at {} cannot be opened under schema {requested}: {reason}", .location.display())]
    FormatMismatch {
        location: PathBuf,
        requested: SchemaVersion,
        reason: String,
    },

    /// A record does not fit the schema the handle is bound to.
    #[error(transparent)]
    Conformance(#[from] ConformanceError),

    #[error("record {record_type}/{id} already exists")]
    DuplicateRecord { record_type: String, id: RecordId },

    #[error("record {record_type}/{id} does not exist")]
    MissingRecord { record_type: String, id: RecordId },

    /// Persisted bytes could not be decoded (or a record could not be
    /// encoded).
    #[error("codec error: {0}")]
    Codec(String),

    /// A stored key or marker is malformed.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// A commit was refused by the backend.
    #[error("commit rejected: {0}")]
    CommitRejected(String),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "redb")]
    #[error("redb error: {0}")]
    Redb(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl AdapterError for StoreError {
    fn is_format_mismatch(&self) -> bool {
        matches!(self, Self::FormatMismatch { .. })
    }
}
