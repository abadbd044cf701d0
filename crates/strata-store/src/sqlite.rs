//! SQLite store adapter using rusqlite.
//!
//! This is the primary adapter for file-backed application stores. Each
//! location is one database file holding two tables: `strata_records` for
//! record payloads and `strata_meta` for the version marker. Uses WAL mode
//! by default.
//!
//! Reading the version marker or probing a schema never creates the file or
//! its tables: both go through a read-only connection, and a missing file or
//! a file without strata tables simply has no marker.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use strata_migrate::StoreAdapter;
//! use strata_store::SqliteStore;
//!
//! let store = SqliteStore::new();
//! let version = store.recorded_version(Path::new("app.db")).unwrap();
//! println!("store is at {version:?}");
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use strata_migrate::{Record, RecordId, SchemaDescriptor, SchemaVersion, StoreAdapter};

use crate::codec::{self, VERSION_KEY};
use crate::error::StoreError;
use crate::session::{Backend, ChangeSet, Session};

/// SQLite configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
    /// Durability level. Defaults to NORMAL.
    pub synchronous: Synchronous,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
            synchronous: Synchronous::Normal,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Write-Ahead Logging — allows concurrent reads during writes.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal (fastest, no crash recovery).
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

/// SQLite `synchronous` pragma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronous {
    Off,
    Normal,
    Full,
}

impl Synchronous {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

/// SQLite store adapter. Every location is a database file path.
#[derive(Debug, Clone, Default)]
pub struct SqliteStore {
    config: SqliteConfig,
}

impl SqliteStore {
    /// Adapter with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SqliteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Open (or create) the database file at `location`.
    pub fn backend(&self, location: &Path) -> Result<SqliteBackend, StoreError> {
        let conn = Connection::open(location)?;
        init_connection(&conn, &self.config)?;
        create_schema(&conn)?;
        Ok(SqliteBackend {
            conn: Mutex::new(conn),
            location: location.to_path_buf(),
            tables: true,
        })
    }

    /// Open an existing database file without writing to it. Fails if the
    /// file does not exist. Files without strata tables read as empty and
    /// unversioned.
    pub fn read_only_backend(&self, location: &Path) -> Result<SqliteBackend, StoreError> {
        let conn = Connection::open_with_flags(
            location,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(u64::from(self.config.busy_timeout_ms)))?;
        let tables = has_table(&conn, "strata_records")? && has_table(&conn, "strata_meta")?;
        Ok(SqliteBackend {
            conn: Mutex::new(conn),
            location: location.to_path_buf(),
            tables,
        })
    }
}

impl StoreAdapter for SqliteStore {
    type Handle = Session<SqliteBackend>;
    type Error = StoreError;

    fn recorded_version(&self, location: &Path) -> Result<Option<SchemaVersion>, StoreError> {
        if !location.exists() {
            return Ok(None);
        }
        self.read_only_backend(location)?.load_marker()
    }

    fn probe_schema(&self, location: &Path, descriptor: &SchemaDescriptor) -> Result<(), StoreError> {
        if !location.exists() {
            return Ok(());
        }
        Session::open(self.read_only_backend(location)?, descriptor).map(drop)
    }

    fn open_under_schema(
        &self,
        location: &Path,
        descriptor: &SchemaDescriptor,
    ) -> Result<Self::Handle, StoreError> {
        Session::open(self.backend(location)?, descriptor)
    }
}

fn init_connection(conn: &Connection, config: &SqliteConfig) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = {};
         PRAGMA busy_timeout = {};
         PRAGMA synchronous = {};",
        config.journal_mode.as_str(),
        config.busy_timeout_ms,
        config.synchronous.as_str(),
    ))?;
    Ok(())
}

fn has_table(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS strata_records (
            record_type TEXT NOT NULL,
            id          TEXT NOT NULL,
            data        BLOB NOT NULL,
            PRIMARY KEY (record_type, id)
        );

        CREATE TABLE IF NOT EXISTS strata_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// One open SQLite database file.
///
/// Wraps a `rusqlite::Connection` behind a `Mutex` for safe shared access.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    location: PathBuf,
    /// Whether the strata tables exist. Always true for writable backends.
    tables: bool,
}

impl SqliteBackend {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Get the current journal mode.
    pub fn journal_mode(&self) -> Result<String, StoreError> {
        let conn = self.lock()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode)
    }
}

fn decode_row(record_type: &str, id: &str, data: &[u8]) -> Result<Record, StoreError> {
    Ok(Record {
        record_type: record_type.to_string(),
        id: codec::decode_id(id)?,
        fields: codec::decode_fields(data)?,
    })
}

impl Backend for SqliteBackend {
    fn location(&self) -> &Path {
        &self.location
    }

    fn load_marker(&self) -> Result<Option<SchemaVersion>, StoreError> {
        if !self.tables {
            return Ok(None);
        }
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM strata_meta WHERE key = ?1",
                params![VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        value.as_deref().map(codec::decode_version).transpose()
    }

    fn record_types(&self) -> Result<Vec<String>, StoreError> {
        if !self.tables {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT record_type FROM strata_records ORDER BY record_type")?;
        let types = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(types)
    }

    fn load_records(&self, record_type: &str) -> Result<Vec<Record>, StoreError> {
        if !self.tables {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, data FROM strata_records WHERE record_type = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![record_type], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|(id, data)| decode_row(record_type, id, data))
            .collect()
    }

    fn load_record(&self, record_type: &str, id: RecordId) -> Result<Option<Record>, StoreError> {
        if !self.tables {
            return Ok(None);
        }
        let conn = self.lock()?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM strata_records WHERE record_type = ?1 AND id = ?2",
                params![record_type, id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(Record {
                record_type: record_type.to_string(),
                id,
                fields: codec::decode_fields(&data)?,
            })),
            None => Ok(None),
        }
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut delete =
                tx.prepare("DELETE FROM strata_records WHERE record_type = ?1 AND id = ?2")?;
            for (record_type, id) in changes.deletes() {
                delete.execute(params![record_type, id.to_string()])?;
            }

            let mut upsert = tx.prepare(
                "INSERT INTO strata_records (record_type, id, data)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_type, id)
                 DO UPDATE SET data = excluded.data",
            )?;
            for record in changes.upserts() {
                let data = codec::encode_fields(&record.fields)?;
                upsert.execute(params![record.record_type, record.id.to_string(), data])?;
            }

            if let Some(version) = changes.marker() {
                tx.execute(
                    "INSERT INTO strata_meta (key, value)
                     VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![VERSION_KEY, codec::encode_version(version)],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
