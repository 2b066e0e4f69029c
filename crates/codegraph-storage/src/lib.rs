//! codegraph-storage: SQLite graph store for codegraph.
//!
//! Uses rusqlite with bundled SQLite, WAL mode, and embedded migrations.
//! File-backed stores keep a second connection for readers so queries see
//! the last committed state while an indexing transaction is open.

use codegraph_core::{CodegraphError, StorageConfig};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

mod backend;
mod graph_persistence;
mod migrations;
mod transaction;

pub use transaction::SqliteTransaction;

type Slot = Mutex<Option<Connection>>;

/// SQLite-backed graph store.
///
/// Connections live in `Mutex<Option<_>>` slots so the store is `Send + Sync`
/// and can be closed explicitly.
pub struct Storage {
    writer: Slot,
    /// `None` for in-memory databases, which cannot be shared.
    reader: Option<Slot>,
}

impl Storage {
    /// Open (or create) a graph database at the given path with default tuning.
    pub fn open(path: &Path) -> Result<Self, CodegraphError> {
        Self::open_with_config(path, &StorageConfig::default())
    }

    /// Open (or create) a graph database with explicit tuning.
    pub fn open_with_config(path: &Path, config: &StorageConfig) -> Result<Self, CodegraphError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CodegraphError::StoreUnavailable(format!("{}: {e}", parent.display()))
            })?;
        }

        let writer = open_connection(path, config)?;
        migrations::run_migrations(&writer)?;
        let reader = open_connection(path, config)?;

        tracing::debug!("Opened graph store at {}", path.display());
        Ok(Self {
            writer: Mutex::new(Some(writer)),
            reader: Some(Mutex::new(Some(reader))),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, CodegraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CodegraphError::StoreUnavailable(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(map_sqlite)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            writer: Mutex::new(Some(conn)),
            reader: None,
        })
    }

    /// Check a storage configuration without opening the database.
    pub fn validate_config(config: &StorageConfig) -> Result<(), CodegraphError> {
        if config.db_path.trim().is_empty() {
            return Err(CodegraphError::Config("storage.db_path is empty".into()));
        }
        if config.cache_size_mb == 0 {
            return Err(CodegraphError::Config(
                "storage.cache_size_mb must be positive".into(),
            ));
        }
        let path = Path::new(&config.db_path);
        if path.is_dir() {
            return Err(CodegraphError::Config(format!(
                "storage.db_path {} is a directory",
                config.db_path
            )));
        }
        Ok(())
    }

    /// Close both connections. Later operations fail with `StoreUnavailable`.
    pub fn close(&self) -> Result<(), CodegraphError> {
        let slots = std::iter::once(&self.writer).chain(self.reader.iter());
        for slot in slots {
            let taken = lock(slot)?.take();
            if let Some(conn) = taken {
                conn.close().map_err(|(_, e)| map_sqlite(e))?;
            }
        }
        tracing::debug!("Closed graph store");
        Ok(())
    }

    /// Lock the write connection.
    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Option<Connection>>, CodegraphError> {
        lock(&self.writer)
    }

    /// Lock the read connection (the writer for in-memory stores).
    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Option<Connection>>, CodegraphError> {
        lock(self.reader.as_ref().unwrap_or(&self.writer))
    }
}

fn lock(slot: &Slot) -> Result<MutexGuard<'_, Option<Connection>>, CodegraphError> {
    slot.lock()
        .map_err(|e| CodegraphError::LockPoisoned(format!("storage: {e}")))
}

/// The live connection in a locked slot.
pub(crate) fn live(slot: &Option<Connection>) -> Result<&Connection, CodegraphError> {
    slot.as_ref()
        .ok_or_else(|| CodegraphError::StoreUnavailable("store is closed".into()))
}

fn open_connection(path: &Path, config: &StorageConfig) -> Result<Connection, CodegraphError> {
    let conn = Connection::open(path)
        .map_err(|e| CodegraphError::StoreUnavailable(format!("{}: {e}", path.display())))?;

    // WAL mode for concurrent reads
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(map_sqlite)?;
    // Negative cache_size is in KiB
    conn.pragma_update(None, "cache_size", -(i64::from(config.cache_size_mb) * 1000))
        .map_err(map_sqlite)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(map_sqlite)?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(map_sqlite)?;
    conn.pragma_update(None, "temp_store", "MEMORY")
        .map_err(map_sqlite)?;
    conn.busy_timeout(std::time::Duration::from_secs(config.busy_timeout_secs))
        .map_err(map_sqlite)?;
    Ok(conn)
}

/// Map a SQLite error onto the codegraph taxonomy.
///
/// Lock contention is a `StoreConflict`, an unreachable database file is
/// `StoreUnavailable`, everything else is a plain `Storage` error.
pub(crate) fn map_sqlite(e: rusqlite::Error) -> CodegraphError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            CodegraphError::StoreConflict(e.to_string())
        }
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::ReadOnly) => {
            CodegraphError::StoreUnavailable(e.to_string())
        }
        _ => CodegraphError::Storage(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::GraphStore;

    #[test]
    fn open_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let storage = Storage::open(&path).unwrap();
        assert!(path.exists());
        assert!(storage.is_connected());
        assert_eq!(storage.backend_type(), "sqlite");
    }

    #[test]
    fn reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        drop(Storage::open(&path).unwrap());
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.stats().unwrap().node_count, 0);
    }

    #[test]
    fn closed_store_is_unavailable() {
        let storage = Storage::open_in_memory().unwrap();
        storage.close().unwrap();
        assert!(!storage.is_connected());
        let err = storage.stats().unwrap_err();
        assert!(matches!(err, CodegraphError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        // Closing twice is harmless.
        storage.close().unwrap();
    }

    #[test]
    fn validate_config_rejects_bad_values() {
        let mut config = StorageConfig::default();
        assert!(Storage::validate_config(&config).is_ok());

        config.cache_size_mb = 0;
        assert!(Storage::validate_config(&config).unwrap_err().is_fatal());

        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        assert!(Storage::validate_config(&config).is_err());
    }

    #[test]
    fn busy_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(map_sqlite(err), CodegraphError::StoreConflict(_)));

        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(map_sqlite(err), CodegraphError::Storage(_)));
    }
}
