//! SQLite-backed storage with ordered schema migrations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::error::StorageError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One step in a storage scope's schema history.
///
/// Migrations are applied in list order and each runs in its own
/// transaction. Versions must be strictly increasing.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Schema version this migration produces.
    pub version: u32,
    /// Short human-readable label, recorded alongside the version.
    pub name: &'static str,
    /// SQL executed as a batch.
    pub sql: &'static str,
}

/// A connection to one cache database file.
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Storage {
    /// Opens (creating if needed) the database at `path` and applies any
    /// pending migrations.
    pub fn open(path: &Path, migrations: &[Migration]) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut storage = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        storage.migrate(migrations)?;
        debug!(path = %path.display(), "opened cache storage");
        Ok(storage)
    }

    /// Opens a private in-memory database with `migrations` applied.
    pub fn open_in_memory(migrations: &[Migration]) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let mut storage = Self { conn, path: None };
        storage.migrate(migrations)?;
        Ok(storage)
    }

    /// The database file, or `None` for in-memory storage.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs `f` inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front. The transaction commits when `f`
    /// returns `Ok` and rolls back otherwise.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Runs read-only `f` inside a deferred transaction, giving it a
    /// consistent view of the database.
    pub fn read<T, F>(&mut self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// The highest migration version recorded in the database.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&mut self, migrations: &[Migration]) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )?;

        let supported = migrations.last().map_or(0, |m| m.version);
        let found = self.schema_version()?;
        if found > supported {
            return Err(StorageError::SchemaTooNew { supported, found });
        }

        for migration in migrations {
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)?;
            // Another process may have applied it since we last looked.
            let applied: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
                params![migration.version],
                |row| row.get(0),
            )?;
            if applied {
                continue;
            }
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, Utc::now()],
            )?;
            tx.commit()?;
            info!(
                version = migration.version,
                name = migration.name,
                "applied cache migration"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.path).finish()
    }
}
