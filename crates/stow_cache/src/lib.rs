//! Differential cache storage.
//!
//! Two SQLite databases hold cached build metadata: a per-project one with
//! package configuration caches ([`ProjectStorage`]) and a per-user one with
//! precompiled packages, Docker executable checks and the upgrade check log
//! ([`UserStorage`]). Collections are stored as child rows and saved
//! differentially, so re-saving a record rewrites only what changed.

#![warn(missing_docs)]

pub mod diff;
pub mod error;
pub mod project;
pub mod storage;
pub mod user;

use std::path::Path;

pub use diff::{update_list, update_set, ChildTable, WriteStats};
pub use error::StorageError;
pub use project::{CachePkgSrc, ConfigCache, ConfigCacheKey, ConfigCacheType, ProjectStorage};
pub use storage::{Migration, Storage};
pub use user::{PrecompiledCache, PrecompiledCacheKey, UserStorage};

pub(crate) fn path_text(path: &Path) -> Result<&str, StorageError> {
    path.to_str()
        .ok_or_else(|| StorageError::NonUtf8Path(path.to_path_buf()))
}
