//! Immutable directory trees keyed by safe relative paths.

use std::collections::btree_map;
use std::collections::BTreeMap;

use stow_common::{BlobKey, SafeRelPath};

/// Whether a tree entry should be materialized with the executable bit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum FileType {
    /// A regular file.
    Normal,
    /// A file with the executable bit set.
    Executable,
}

impl FileType {
    /// The one-byte tag used in the binary tree encoding.
    pub fn tag(self) -> u8 {
        match self {
            FileType::Normal => b'N',
            FileType::Executable => b'X',
        }
    }

    /// Maps an encoding tag back to a file type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'N' => Some(FileType::Normal),
            b'X' => Some(FileType::Executable),
            _ => None,
        }
    }
}

/// One file inside a [`Tree`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TreeEntry {
    /// Address of the file content.
    pub key: BlobKey,
    /// How the file is materialized.
    pub file_type: FileType,
}

impl TreeEntry {
    /// Creates an entry for a regular file.
    pub fn normal(key: BlobKey) -> Self {
        Self {
            key,
            file_type: FileType::Normal,
        }
    }

    /// Creates an entry for an executable file.
    pub fn executable(key: BlobKey) -> Self {
        Self {
            key,
            file_type: FileType::Executable,
        }
    }
}

/// A content-addressable directory: a map from relative path to file entry.
///
/// Entries are kept sorted, so iteration and encoding never depend on the
/// order in which entries were inserted.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Tree {
    entries: BTreeMap<SafeRelPath, TreeEntry>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the one previously stored at `path`.
    pub fn insert(&mut self, path: SafeRelPath, entry: TreeEntry) -> Option<TreeEntry> {
        self.entries.insert(path, entry)
    }

    /// Removes the entry at `path`.
    pub fn remove(&mut self, path: &SafeRelPath) -> Option<TreeEntry> {
        self.entries.remove(path)
    }

    /// Looks up the entry at `path`.
    pub fn get(&self, path: &SafeRelPath) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    /// Iterates entries in canonical (sorted) order.
    pub fn iter(&self) -> btree_map::Iter<'_, SafeRelPath, TreeEntry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Computes the blob key of this tree's canonical encoding.
    ///
    /// Equal trees always produce equal keys.
    pub fn key(&self) -> BlobKey {
        BlobKey::of(&self.encode())
    }
}

impl FromIterator<(SafeRelPath, TreeEntry)> for Tree {
    fn from_iter<I: IntoIterator<Item = (SafeRelPath, TreeEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = (&'a SafeRelPath, &'a TreeEntry);
    type IntoIter = btree_map::Iter<'a, SafeRelPath, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
