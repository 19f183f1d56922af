//! Error types for cache storage operations.

use std::path::PathBuf;

/// Errors that can occur while reading or writing cache storage.
///
/// A cache miss is never an error: `load_*` operations return `Ok(None)`
/// for absent or inactive records.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The underlying SQLite operation failed.
    #[error("cache storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred while preparing the storage location.
    #[error("cache storage I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The storage file was written by a newer schema than this build knows.
    #[error("cache schema version {found} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Highest migration version this build knows.
        supported: u32,
        /// Highest migration version recorded in the file.
        found: u32,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value in {table}: {value:?}")]
    Corrupt {
        /// The table holding the value.
        table: &'static str,
        /// The offending stored text.
        value: String,
    },

    /// A path could not be stored because it is not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}
