//! # strata-migrate
//!
//! Versioned schema migrations for embedded, file-backed record stores.
//!
//! An application declares every schema its store has ever had in a
//! [`SchemaRegistry`], and the directed steps between adjacent versions as
//! [`MigrationStage`]s grouped into an upgrade or downgrade [`MigrationPlan`].
//! The [`MigrationEngine`] then opens a store at any registered version,
//! replaying whatever stages lie between the store's recorded version and
//! the requested one.
//!
//! ## How It Works
//!
//! 1. The store's **version marker** is read before any schema is opened.
//! 2. If it differs from the target, the plan is **sliced** to the stages in
//!    between.
//! 3. Each stage opens the store under its source schema, runs the
//!    **will phase** (capturing a [`MigrationBackup`]), reopens under the
//!    target schema, runs the **did phase** with that backup, and commits
//!    records and marker in **one transaction**.
//! 4. A failing stage leaves the store at its source version. The next open
//!    resumes from the last committed stage.
//!
//! ## Key Concepts
//!
//! - **Explicit mappings**: renames and derived fields are declared per
//!   stage, never inferred by name.
//! - **Stage-scoped backups**: the will phase returns the backup by value
//!   and the did phase consumes it. Nothing is shared between stages.
//! - **Pluggable storage**: the engine talks to a [`StoreAdapter`]. See the
//!   `strata-store` crate for in-memory, SQLite and redb adapters.

mod adapter;
mod backup;
mod context;
mod engine;
mod error;
mod plan;
mod record;
mod registry;
mod schema;
mod stage;
mod version;

pub use adapter::{AdapterError, RecordReader, RecordWriter, StoreAdapter, StoreHandle};
pub use backup::MigrationBackup;
pub use context::{ReadContext, WriteContext};
pub use engine::{AppliedStage, EngineConfig, FallbackPolicy, MigrationEngine, MigrationReport};
pub use error::{BoxError, HookError, HookResult, MigrationError, StageError};
pub use plan::{Direction, MigrationPlan, ResolvedPath};
pub use record::{FieldType, Filter, Record, RecordId, Value};
pub use registry::SchemaRegistry;
pub use schema::{
    reshape, ConformanceError, FieldDef, RecordType, SchemaDescriptor, SchemaError,
    DEFAULT_IDENTITY_FIELD,
};
pub use stage::{
    hook_failure, DidMigrate, FieldAssignment, FieldRename, MigrationStage, StageBuilder,
    WillMigrate,
};
pub use version::{ParseVersionError, SchemaVersion};
