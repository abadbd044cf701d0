//! # strata-store
//!
//! Store adapters for [`strata-migrate`](strata_migrate).
//!
//! Every adapter stores records and a schema version marker per location
//! and hands out [`Session`] handles: bound to one schema, staging every
//! change, committing records and marker together in one transaction.
//!
//! ## Quick Start
//!
//! ```
//! use std::path::Path;
//!
//! use strata_migrate::{FieldDef, FieldType, Record, RecordId, RecordType, SchemaDescriptor, SchemaVersion, StoreAdapter, StoreHandle};
//! use strata_store::MemoryStore;
//!
//! let schema = SchemaDescriptor::new(
//!     SchemaVersion::major(1),
//!     vec![RecordType::new("Setting").field(FieldDef::new("notificationEnabled", FieldType::Bool))],
//! )
//! .unwrap();
//!
//! let store = MemoryStore::new();
//! let mut handle = store.open_under_schema(Path::new("settings"), &schema).unwrap();
//! let id = RecordId::new_v4();
//! handle.insert(Record::new("Setting", id).with("notificationEnabled", true)).unwrap();
//! handle.save().unwrap();
//!
//! let fetched = handle.get("Setting", id).unwrap().unwrap();
//! assert_eq!(fetched.get_bool("notificationEnabled"), Some(true));
//! ```
//!
//! ## Adapters
//!
//! | Adapter | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryStore`] | *(always available)* | Testing, prototyping |
//! | `SqliteStore` | `sqlite` (default) | Application stores on disk |
//! | `RedbStore` | `redb` | Pure-Rust builds without C deps |

mod codec;
mod error;
pub mod inspect;
mod memory;
#[cfg(feature = "redb")]
mod redb;
mod session;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use codec::VERSION_KEY;
pub use error::StoreError;
pub use inspect::StoreSummary;
pub use memory::{MemoryBackend, MemoryStore};
#[cfg(feature = "redb")]
pub use redb::{RedbBackend, RedbStore};
pub use session::{Backend, ChangeSet, Session};
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteBackend, SqliteConfig, SqliteStore, Synchronous};
