//! Per-user storage: precompiled packages, Docker executable checks, and
//! the upgrade check log.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use stow_common::ContentHash;
use tracing::debug;

use crate::diff::{load_set, update_set, ChildTable, WriteStats};
use crate::error::StorageError;
use crate::path_text;
use crate::storage::{Migration, Storage};

const SUB_LIBS: ChildTable = ChildTable::new("precompiled_cache_sub_lib");
const EXES: ChildTable = ChildTable::new("precompiled_cache_exe");

/// Schema history of the user database.
pub const USER_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "precompiled and docker caches",
        sql: "
            CREATE TABLE precompiled_cache (
                id INTEGER PRIMARY KEY,
                platform_ghc_dir TEXT NOT NULL,
                compiler TEXT NOT NULL,
                cabal_version TEXT NOT NULL,
                package_key TEXT NOT NULL,
                options_hash TEXT NOT NULL,
                library TEXT,
                UNIQUE (platform_ghc_dir, compiler, cabal_version, package_key, options_hash)
            );
            CREATE TABLE precompiled_cache_sub_lib (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES precompiled_cache(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                UNIQUE (parent_id, value)
            );
            CREATE TABLE precompiled_cache_exe (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES precompiled_cache(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                UNIQUE (parent_id, value)
            );
            CREATE TABLE docker_image_exe_cache (
                id INTEGER PRIMARY KEY,
                image_hash TEXT NOT NULL,
                exe_path TEXT NOT NULL,
                exe_timestamp TEXT NOT NULL,
                compatible INTEGER NOT NULL,
                UNIQUE (image_hash, exe_path, exe_timestamp)
            );
        ",
    },
    Migration {
        version: 2,
        name: "upgrade check log",
        sql: "
            CREATE TABLE last_performed (
                id INTEGER PRIMARY KEY,
                action TEXT NOT NULL,
                at TEXT NOT NULL
            );
            CREATE INDEX last_performed_action ON last_performed (action, id);
        ",
    },
];

const UPGRADE_CHECK: &str = "upgrade-check";

/// Identifies a package build that can be reused across projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrecompiledCacheKey {
    /// Per-platform, per-compiler install root.
    pub platform_ghc_dir: PathBuf,
    /// Compiler descriptor text, e.g. `ghc-9.4.7`.
    pub compiler: String,
    /// Version of the build library used.
    pub cabal_version: String,
    /// Package identity, including its dependency hash.
    pub package_key: String,
    /// Digest of the configure options, see [`PrecompiledCacheKey::options_hash_of`].
    pub options_hash: String,
}

impl PrecompiledCacheKey {
    /// Hex SHA-256 of the newline-joined configure options.
    pub fn options_hash_of(options: &[String]) -> String {
        ContentHash::of(options.join("\n").as_bytes()).to_string()
    }
}

/// What a precompiled package build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecompiledCache {
    /// Registration file of the main library, if it has one.
    pub library: Option<PathBuf>,
    /// Registration files of internal libraries.
    pub sub_libs: BTreeSet<PathBuf>,
    /// Installed executables.
    pub exes: BTreeSet<PathBuf>,
}

/// The database shared by every project of one user.
#[derive(Debug)]
pub struct UserStorage {
    storage: Storage,
}

impl UserStorage {
    /// Opens the user database at `path`, creating and migrating it as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            storage: Storage::open(path, USER_MIGRATIONS)?,
        })
    }

    /// Opens a throwaway in-memory user database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            storage: Storage::open_in_memory(USER_MIGRATIONS)?,
        })
    }

    /// Loads the precompiled record for `key`, if one was saved.
    pub fn load_precompiled_cache(
        &mut self,
        key: &PrecompiledCacheKey,
    ) -> Result<Option<PrecompiledCache>, StorageError> {
        let platform_ghc_dir = path_text(&key.platform_ghc_dir)?;
        self.storage.read(|tx| {
            let Some((id, library)) = find_precompiled(tx, platform_ghc_dir, key)? else {
                return Ok(None);
            };
            Ok(Some(PrecompiledCache {
                library: library.map(PathBuf::from),
                sub_libs: to_paths(load_set(tx, SUB_LIBS, id)?),
                exes: to_paths(load_set(tx, EXES, id)?),
            }))
        })
    }

    /// Stores `cache` under `key`, rewriting only changed child rows.
    pub fn save_precompiled_cache(
        &mut self,
        key: &PrecompiledCacheKey,
        cache: &PrecompiledCache,
    ) -> Result<WriteStats, StorageError> {
        let platform_ghc_dir = path_text(&key.platform_ghc_dir)?;
        let library = cache.library.as_deref().map(path_text).transpose()?;
        let sub_libs = to_texts(&cache.sub_libs)?;
        let exes = to_texts(&cache.exes)?;

        let stats = self.storage.transaction(|tx| {
            let (id, old_sub_libs, old_exes) = match find_precompiled(tx, platform_ghc_dir, key)? {
                Some((id, _)) => {
                    tx.execute(
                        "UPDATE precompiled_cache SET library = ?2 WHERE id = ?1",
                        params![id, library],
                    )?;
                    (id, load_set::<String>(tx, SUB_LIBS, id)?, load_set::<String>(tx, EXES, id)?)
                }
                None => {
                    tx.execute(
                        "INSERT INTO precompiled_cache
                         (platform_ghc_dir, compiler, cabal_version, package_key, options_hash, library)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            platform_ghc_dir,
                            key.compiler,
                            key.cabal_version,
                            key.package_key,
                            key.options_hash,
                            library
                        ],
                    )?;
                    (tx.last_insert_rowid(), BTreeSet::new(), BTreeSet::new())
                }
            };

            let mut stats = update_set(tx, SUB_LIBS, id, &old_sub_libs, &sub_libs)?;
            stats += update_set(tx, EXES, id, &old_exes, &exes)?;
            Ok(stats)
        })?;
        debug!(
            package = %key.package_key,
            deleted = stats.deleted,
            inserted = stats.inserted,
            "saved precompiled cache"
        );
        Ok(stats)
    }

    /// Whether the executable at `exe_path`, last modified at `exe_timestamp`,
    /// was found to run inside the image `image_hash`.
    pub fn load_docker_image_exe_cache(
        &mut self,
        image_hash: &str,
        exe_path: &Path,
        exe_timestamp: DateTime<Utc>,
    ) -> Result<Option<bool>, StorageError> {
        let exe_path = path_text(exe_path)?;
        self.storage.read(|tx| {
            Ok(tx
                .query_row(
                    "SELECT compatible FROM docker_image_exe_cache
                     WHERE image_hash = ?1 AND exe_path = ?2 AND exe_timestamp = ?3",
                    params![image_hash, exe_path, exe_timestamp],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Records whether an executable is compatible with a Docker image.
    ///
    /// Saving the same triple again overwrites the previous answer.
    pub fn save_docker_image_exe_cache(
        &mut self,
        image_hash: &str,
        exe_path: &Path,
        exe_timestamp: DateTime<Utc>,
        compatible: bool,
    ) -> Result<(), StorageError> {
        let exe_path = path_text(exe_path)?;
        self.storage.transaction(|tx| {
            tx.execute(
                "INSERT INTO docker_image_exe_cache (image_hash, exe_path, exe_timestamp, compatible)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (image_hash, exe_path, exe_timestamp)
                 DO UPDATE SET compatible = excluded.compatible",
                params![image_hash, exe_path, exe_timestamp, compatible],
            )?;
            Ok(())
        })
    }

    /// Appends an upgrade check performed at `at`.
    pub fn record_upgrade_check(&mut self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.storage.transaction(|tx| {
            tx.execute(
                "INSERT INTO last_performed (action, at) VALUES (?1, ?2)",
                params![UPGRADE_CHECK, at],
            )?;
            Ok(())
        })
    }

    /// The most recently recorded upgrade check.
    pub fn last_upgrade_check(&mut self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.storage.read(|tx| {
            Ok(tx
                .query_row(
                    "SELECT at FROM last_performed WHERE action = ?1 ORDER BY id DESC LIMIT 1",
                    params![UPGRADE_CHECK],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Every recorded upgrade check, oldest first.
    pub fn upgrade_checks(&mut self) -> Result<Vec<DateTime<Utc>>, StorageError> {
        self.storage.read(|tx| {
            let mut stmt =
                tx.prepare("SELECT at FROM last_performed WHERE action = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![UPGRADE_CHECK], |row| row.get(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

fn find_precompiled(
    tx: &Transaction<'_>,
    platform_ghc_dir: &str,
    key: &PrecompiledCacheKey,
) -> rusqlite::Result<Option<(i64, Option<String>)>> {
    tx.query_row(
        "SELECT id, library FROM precompiled_cache
         WHERE platform_ghc_dir = ?1 AND compiler = ?2 AND cabal_version = ?3
           AND package_key = ?4 AND options_hash = ?5",
        params![
            platform_ghc_dir,
            key.compiler,
            key.cabal_version,
            key.package_key,
            key.options_hash
        ],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

fn to_texts(paths: &BTreeSet<PathBuf>) -> Result<BTreeSet<String>, StorageError> {
    paths
        .iter()
        .map(|p| path_text(p).map(str::to_string))
        .collect()
}

fn to_paths(texts: BTreeSet<String>) -> BTreeSet<PathBuf> {
    texts.into_iter().map(PathBuf::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> PrecompiledCacheKey {
        PrecompiledCacheKey {
            platform_ghc_dir: PathBuf::from("/home/dev/.stow/precompiled/x86_64-linux/ghc-9.4.7"),
            compiler: "ghc-9.4.7".to_string(),
            cabal_version: "3.8.1.0".to_string(),
            package_key: "text-2.0.2-7f3a".to_string(),
            options_hash: PrecompiledCacheKey::options_hash_of(&["--enable-shared".to_string()]),
        }
    }

    fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    fn sample() -> PrecompiledCache {
        PrecompiledCache {
            library: Some(PathBuf::from("/db/text-2.0.2.conf")),
            sub_libs: paths(&["/db/z-text-internal.conf"]),
            exes: paths(&["/bin/text-bench", "/bin/text-demo"]),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn precompiled_save_then_load() {
        let mut storage = UserStorage::open_in_memory().unwrap();
        assert_eq!(storage.load_precompiled_cache(&key()).unwrap(), None);
        let stats = storage.save_precompiled_cache(&key(), &sample()).unwrap();
        assert_eq!(stats, WriteStats { deleted: 0, inserted: 3 });
        assert_eq!(storage.load_precompiled_cache(&key()).unwrap(), Some(sample()));
    }

    #[test]
    fn precompiled_resave_writes_only_changes() {
        let mut storage = UserStorage::open_in_memory().unwrap();
        storage.save_precompiled_cache(&key(), &sample()).unwrap();

        let mut cache = sample();
        cache.library = None;
        cache.exes = paths(&["/bin/text-demo", "/bin/text-tool"]);
        let stats = storage.save_precompiled_cache(&key(), &cache).unwrap();
        assert_eq!(stats, WriteStats { deleted: 1, inserted: 1 });
        assert_eq!(storage.load_precompiled_cache(&key()).unwrap(), Some(cache));
    }

    #[test]
    fn precompiled_key_fields_all_matter() {
        let mut storage = UserStorage::open_in_memory().unwrap();
        storage.save_precompiled_cache(&key(), &sample()).unwrap();
        let other = PrecompiledCacheKey {
            options_hash: PrecompiledCacheKey::options_hash_of(&[]),
            ..key()
        };
        assert_eq!(storage.load_precompiled_cache(&other).unwrap(), None);
    }

    #[test]
    fn options_hash_is_order_sensitive() {
        let a = PrecompiledCacheKey::options_hash_of(&["-O1".to_string(), "-g".to_string()]);
        let b = PrecompiledCacheKey::options_hash_of(&["-g".to_string(), "-O1".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(
            PrecompiledCacheKey::options_hash_of(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn docker_cache_upserts() {
        let mut storage = UserStorage::open_in_memory().unwrap();
        let exe = Path::new("/home/dev/.local/bin/stow");
        assert_eq!(
            storage.load_docker_image_exe_cache("sha256:abc", exe, at(0)).unwrap(),
            None
        );
        storage.save_docker_image_exe_cache("sha256:abc", exe, at(0), false).unwrap();
        storage.save_docker_image_exe_cache("sha256:abc", exe, at(0), true).unwrap();
        assert_eq!(
            storage.load_docker_image_exe_cache("sha256:abc", exe, at(0)).unwrap(),
            Some(true)
        );
        assert_eq!(
            storage.load_docker_image_exe_cache("sha256:abc", exe, at(1)).unwrap(),
            None
        );
    }

    #[test]
    fn upgrade_checks_append() {
        let mut storage = UserStorage::open_in_memory().unwrap();
        assert_eq!(storage.last_upgrade_check().unwrap(), None);
        storage.record_upgrade_check(at(10)).unwrap();
        storage.record_upgrade_check(at(20)).unwrap();
        assert_eq!(storage.last_upgrade_check().unwrap(), Some(at(20)));
        assert_eq!(storage.upgrade_checks().unwrap(), [at(10), at(20)]);
    }

    #[test]
    fn user_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stow.sqlite3");
        {
            let mut storage = UserStorage::open(&path).unwrap();
            storage.save_precompiled_cache(&key(), &sample()).unwrap();
            storage.record_upgrade_check(at(5)).unwrap();
        }
        let mut storage = UserStorage::open(&path).unwrap();
        assert_eq!(storage.load_precompiled_cache(&key()).unwrap(), Some(sample()));
        assert_eq!(storage.last_upgrade_check().unwrap(), Some(at(5)));
    }
}
