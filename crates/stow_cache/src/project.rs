//! Per-project storage: the package configuration cache.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

use crate::diff::{load_list, load_set, update_list, update_set, ChildTable, WriteStats};
use crate::error::StorageError;
use crate::storage::{Migration, Storage};
use crate::path_text;

const DIR_OPTIONS: ChildTable = ChildTable::new("config_cache_dir_option");
const NO_DIR_OPTIONS: ChildTable = ChildTable::new("config_cache_no_dir_option");
const DEPS: ChildTable = ChildTable::new("config_cache_dep");
const COMPONENTS: ChildTable = ChildTable::new("config_cache_component");

/// Schema history of the project database.
pub const PROJECT_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "config cache",
        sql: "
            CREATE TABLE config_cache (
                id INTEGER PRIMARY KEY,
                directory TEXT NOT NULL,
                cache_type TEXT NOT NULL,
                pkg_src TEXT NOT NULL,
                active INTEGER NOT NULL,
                UNIQUE (directory, cache_type)
            );
            CREATE TABLE config_cache_dir_option (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES config_cache(id) ON DELETE CASCADE,
                idx INTEGER NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (parent_id, idx)
            );
            CREATE TABLE config_cache_no_dir_option (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES config_cache(id) ON DELETE CASCADE,
                idx INTEGER NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (parent_id, idx)
            );
            CREATE TABLE config_cache_dep (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES config_cache(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                UNIQUE (parent_id, value)
            );
            CREATE TABLE config_cache_component (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES config_cache(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                UNIQUE (parent_id, value)
            );
        ",
    },
    Migration {
        version: 2,
        name: "config cache haddock and PATH",
        sql: "
            ALTER TABLE config_cache ADD COLUMN haddock INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE config_cache ADD COLUMN path_env_var TEXT NOT NULL DEFAULT '';
        ",
    },
];

/// Which configuration a cache record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigCacheType {
    /// The package's own configure step.
    Config,
    /// Flags of an installed library, by its installed package id.
    FlagLibrary(String),
    /// Flags of an installed executable, by its package identifier.
    FlagExecutable(String),
}

impl fmt::Display for ConfigCacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => f.write_str("config"),
            Self::FlagLibrary(id) => write!(f, "flag-library:{id}"),
            Self::FlagExecutable(id) => write!(f, "flag-executable:{id}"),
        }
    }
}

/// Identifies one configuration cache record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigCacheKey {
    /// The package's build directory.
    pub directory: PathBuf,
    /// Which configuration is cached.
    pub cache_type: ConfigCacheType,
}

impl ConfigCacheKey {
    /// The key for a package's configure step in `directory`.
    pub fn config(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            cache_type: ConfigCacheType::Config,
        }
    }
}

/// Where the configured package's source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePkgSrc {
    /// The package index.
    Upstream,
    /// A local directory.
    Local(PathBuf),
}

impl CachePkgSrc {
    fn encode(&self) -> Result<String, StorageError> {
        Ok(match self {
            Self::Upstream => "upstream".to_string(),
            Self::Local(dir) => format!("local:{}", path_text(dir)?),
        })
    }

    fn decode(text: &str) -> Result<Self, StorageError> {
        if text == "upstream" {
            return Ok(Self::Upstream);
        }
        match text.strip_prefix("local:") {
            Some(dir) => Ok(Self::Local(PathBuf::from(dir))),
            None => Err(StorageError::Corrupt {
                table: "config_cache",
                value: text.to_string(),
            }),
        }
    }
}

/// The inputs a package was last configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCache {
    /// Configure options that depend on the build directory.
    pub dir_opts: Vec<String>,
    /// Configure options independent of the build directory.
    pub no_dir_opts: Vec<String>,
    /// Installed package ids the configuration depends on.
    pub deps: BTreeSet<String>,
    /// Components that were configured.
    pub components: BTreeSet<String>,
    /// Where the source came from.
    pub pkg_src: CachePkgSrc,
    /// Whether documentation was requested.
    pub haddock: bool,
    /// The `PATH` seen at configure time.
    pub path_env_var: String,
}

struct ConfigCacheRow {
    id: i64,
    pkg_src: String,
    active: bool,
    haddock: bool,
    path_env_var: String,
}

/// The database kept inside each project's work directory.
#[derive(Debug)]
pub struct ProjectStorage {
    storage: Storage,
}

impl ProjectStorage {
    /// Opens the project database at `path`, creating and migrating it as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            storage: Storage::open(path, PROJECT_MIGRATIONS)?,
        })
    }

    /// Opens a throwaway in-memory project database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            storage: Storage::open_in_memory(PROJECT_MIGRATIONS)?,
        })
    }

    /// Loads the active record for `key`.
    ///
    /// Returns `None` when no record exists or the record was deactivated.
    pub fn load_config_cache(
        &mut self,
        key: &ConfigCacheKey,
    ) -> Result<Option<ConfigCache>, StorageError> {
        let directory = path_text(&key.directory)?;
        let cache_type = key.cache_type.to_string();
        self.storage.read(|tx| {
            let row = match find_row(tx, directory, &cache_type)? {
                Some(row) if row.active => row,
                _ => return Ok(None),
            };
            Ok(Some(ConfigCache {
                dir_opts: load_list(tx, DIR_OPTIONS, row.id)?,
                no_dir_opts: load_list(tx, NO_DIR_OPTIONS, row.id)?,
                deps: load_set(tx, DEPS, row.id)?,
                components: load_set(tx, COMPONENTS, row.id)?,
                pkg_src: CachePkgSrc::decode(&row.pkg_src)?,
                haddock: row.haddock,
                path_env_var: row.path_env_var,
            }))
        })
    }

    /// Stores `cache` under `key` and marks the record active.
    ///
    /// Only the child rows that changed since the last save are rewritten;
    /// the returned stats count them.
    pub fn save_config_cache(
        &mut self,
        key: &ConfigCacheKey,
        cache: &ConfigCache,
    ) -> Result<WriteStats, StorageError> {
        let directory = path_text(&key.directory)?;
        let cache_type = key.cache_type.to_string();
        let pkg_src = cache.pkg_src.encode()?;
        let stats = self.storage.transaction(|tx| {
            let (id, old) = match find_row(tx, directory, &cache_type)? {
                Some(row) => {
                    tx.execute(
                        "UPDATE config_cache
                         SET pkg_src = ?2, active = 1, haddock = ?3, path_env_var = ?4
                         WHERE id = ?1",
                        params![row.id, pkg_src, cache.haddock, cache.path_env_var],
                    )?;
                    let old = StoredChildren::load(tx, row.id)?;
                    (row.id, old)
                }
                None => {
                    tx.execute(
                        "INSERT INTO config_cache
                         (directory, cache_type, pkg_src, active, haddock, path_env_var)
                         VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                        params![directory, cache_type, pkg_src, cache.haddock, cache.path_env_var],
                    )?;
                    (tx.last_insert_rowid(), StoredChildren::default())
                }
            };

            let mut stats = WriteStats::default();
            stats += update_list(tx, DIR_OPTIONS, id, &old.dir_opts, &cache.dir_opts)?;
            stats += update_list(tx, NO_DIR_OPTIONS, id, &old.no_dir_opts, &cache.no_dir_opts)?;
            stats += update_set(tx, DEPS, id, &old.deps, &cache.deps)?;
            stats += update_set(tx, COMPONENTS, id, &old.components, &cache.components)?;
            Ok(stats)
        })?;
        debug!(
            directory,
            cache_type = %cache_type,
            deleted = stats.deleted,
            inserted = stats.inserted,
            "saved config cache"
        );
        Ok(stats)
    }

    /// Marks the record for `key` inactive without deleting its rows.
    ///
    /// Unknown keys are ignored.
    pub fn deactivate_config_cache(&mut self, key: &ConfigCacheKey) -> Result<(), StorageError> {
        let directory = path_text(&key.directory)?;
        let cache_type = key.cache_type.to_string();
        self.storage.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE config_cache SET active = 0 WHERE directory = ?1 AND cache_type = ?2",
                params![directory, cache_type],
            )?;
            debug!(directory, cache_type = %cache_type, changed, "deactivated config cache");
            Ok(())
        })
    }

    #[cfg(test)]
    fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[derive(Default)]
struct StoredChildren {
    dir_opts: Vec<String>,
    no_dir_opts: Vec<String>,
    deps: BTreeSet<String>,
    components: BTreeSet<String>,
}

impl StoredChildren {
    fn load(tx: &Transaction<'_>, id: i64) -> rusqlite::Result<Self> {
        Ok(Self {
            dir_opts: load_list(tx, DIR_OPTIONS, id)?,
            no_dir_opts: load_list(tx, NO_DIR_OPTIONS, id)?,
            deps: load_set(tx, DEPS, id)?,
            components: load_set(tx, COMPONENTS, id)?,
        })
    }
}

fn find_row(
    tx: &Transaction<'_>,
    directory: &str,
    cache_type: &str,
) -> rusqlite::Result<Option<ConfigCacheRow>> {
    tx.query_row(
        "SELECT id, pkg_src, active, haddock, path_env_var FROM config_cache
         WHERE directory = ?1 AND cache_type = ?2",
        params![directory, cache_type],
        |row| {
            Ok(ConfigCacheRow {
                id: row.get(0)?,
                pkg_src: row.get(1)?,
                active: row.get(2)?,
                haddock: row.get(3)?,
                path_env_var: row.get(4)?,
            })
        },
    )
    .optional()
}
