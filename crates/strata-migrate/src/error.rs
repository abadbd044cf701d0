use std::path::PathBuf;

use crate::record::RecordId;
use crate::schema::{ConformanceError, SchemaError};
use crate::version::SchemaVersion;

/// Type-erased error crossing the store-adapter boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by the engine's public API.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A version is not part of the schema registry.
    #[error("schema version {0} is not registered")]
    UnknownVersion(SchemaVersion),

    /// The plan cannot carry the store from one version to the other.
    #[error("no migration path from {from} to {to}: {reason}")]
    NoPathFound {
        from: SchemaVersion,
        to: SchemaVersion,
        reason: String,
    },

    /// A stage failed. The store's recorded version is `left_at`.
    #[error("migration stage {index} ({from} -> {to}) failed, store left at {left_at}: {source}")]
    StageFailed {
        index: usize,
        from: SchemaVersion,
        to: SchemaVersion,
        left_at: SchemaVersion,
        #[source]
        source: StageError,
    },

    /// The persisted data does not match the schema it was opened under.
    #[error("store at {} does not match the requested schema: {source}", .location.display())]
    StoreFormat {
        location: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The store adapter failed outside of a stage.
    #[error("store error: {0}")]
    Store(#[source] BoxError),

    /// The plan's schemas and stages do not form one linear path.
    #[error("invalid migration plan `{plan}`: {reason}")]
    InvalidPlan { plan: String, reason: String },

    /// A schema or registry declaration is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Why a single stage failed.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("could not open store under schema {version}: {source}")]
    Open {
        version: SchemaVersion,
        #[source]
        source: BoxError,
    },

    #[error("willMigrate hook failed: {0}")]
    WillMigrate(#[source] HookError),

    #[error("could not materialize schema {version}: {source}")]
    Materialize {
        version: SchemaVersion,
        #[source]
        source: BoxError,
    },

    #[error("didMigrate hook failed: {0}")]
    DidMigrate(#[source] HookError),

    #[error("migrated data does not conform to schema {version}: {source}")]
    Conformance {
        version: SchemaVersion,
        #[source]
        source: BoxError,
    },

    #[error("could not commit stage: {0}")]
    Commit(#[source] BoxError),
}

/// Error raised inside a migration hook.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A store operation issued by the hook failed.
    #[error("store operation failed: {0}")]
    Store(#[source] BoxError),

    /// The hook expected a record that does not exist.
    #[error("record {record_type}/{id} not found")]
    MissingRecord { record_type: String, id: RecordId },

    /// A record written by the hook does not fit the target schema.
    #[error(transparent)]
    Conformance(#[from] ConformanceError),

    /// Hook-defined failure.
    #[error("{0}")]
    Failed(String),
}

impl HookError {
    /// Hook-defined failure with a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type returned by migration hooks.
pub type HookResult<T> = Result<T, HookError>;
