//! On-disk content-addressed blob storage.
//!
//! Blobs live at `<root>/<first two hex chars>/<hash>-<size>`. The key is
//! derived from the content, so writing the same bytes twice is a no-op and
//! every read can be verified against the key it was requested by.

use std::io::Write;
use std::path::{Path, PathBuf};

use stow_common::{BlobKey, SafeRelPath};
use tracing::{debug, warn};

use crate::error::BlobStoreError;
use crate::tree::Tree;

/// Content-addressed store for file blobs and encoded trees.
///
/// Reads are fail-safe: a missing, unreadable, or corrupted blob is a miss,
/// never an error.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Returns the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path a blob with the given key is stored at.
    pub fn blob_path(&self, key: &BlobKey) -> PathBuf {
        let hex = key.hash.to_string();
        self.root.join(&hex[..2]).join(format!("{hex}-{}", key.size))
    }

    /// Stores a blob and returns its key.
    ///
    /// The content is written to a temporary file in the same directory
    /// and renamed into place, so a reader never sees a partial blob. An
    /// existing file is kept only if it still matches the key; a corrupt
    /// one is replaced.
    pub fn put(&self, data: &[u8]) -> Result<BlobKey, BlobStoreError> {
        let key = BlobKey::of(data);
        let path = self.blob_path(&key);
        match std::fs::read(&path) {
            Ok(existing) if key.matches(&existing) => {
                debug!(%key, "blob already stored");
                return Ok(key);
            }
            Ok(_) => warn!(%key, path = %path.display(), "replacing corrupt blob"),
            Err(_) => {}
        }

        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| BlobStoreError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let tmp = dir.join(format!(".tmp-{}-{}", key.hash, std::process::id()));
        if let Err(e) = write_then_rename(&tmp, &path, data) {
            // Best effort.
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        debug!(%key, "stored blob");
        Ok(key)
    }

    /// Reads a blob, verifying it against its key.
    ///
    /// Returns `None` if the blob is absent or its content no longer
    /// matches the key's hash and size.
    pub fn get(&self, key: &BlobKey) -> Option<Vec<u8>> {
        let path = self.blob_path(key);
        let data = std::fs::read(&path).ok()?;
        if !key.matches(&data) {
            warn!(%key, path = %path.display(), "blob content does not match its key");
            return None;
        }
        Some(data)
    }

    /// Returns `true` if a blob with this key is present on disk.
    ///
    /// Existence only; the content is not verified.
    pub fn contains(&self, key: &BlobKey) -> bool {
        self.blob_path(key).is_file()
    }

    /// Encodes a tree and stores it as a blob, returning the tree's key.
    pub fn put_tree(&self, tree: &Tree) -> Result<BlobKey, BlobStoreError> {
        self.put(&tree.encode())
    }

    /// Loads and decodes a tree stored under `key`.
    ///
    /// A blob that verifies but does not decode as a tree is a miss.
    pub fn get_tree(&self, key: &BlobKey) -> Option<Tree> {
        let bytes = self.get(key)?;
        match Tree::decode(&bytes) {
            Ok(tree) => Some(tree),
            Err(e) => {
                warn!(%key, error = %e, "blob is not a valid tree");
                None
            }
        }
    }

    /// Checks that every file a tree references is present and intact.
    ///
    /// Returns the paths whose blobs are missing or corrupt, in tree order.
    pub fn verify_tree(&self, tree: &Tree) -> Vec<SafeRelPath> {
        tree.iter()
            .filter(|(_, entry)| self.get(&entry.key).is_none())
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> Result<(), BlobStoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| BlobStoreError::Io { path, source }
    };
    let mut file = std::fs::File::create(tmp).map_err(io_err(tmp))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(io_err(tmp))?;
    drop(file);
    std::fs::rename(tmp, path).map_err(io_err(path))
}
