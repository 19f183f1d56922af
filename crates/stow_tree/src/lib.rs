//! Content-addressed directory trees and blob storage.
//!
//! A [`Tree`] maps safe relative paths to blob keys. Its canonical binary
//! encoding is unique per logical tree, which lets a tree be stored and
//! addressed as a blob itself. [`BlobStore`] keeps both file blobs and
//! encoded trees on disk, verifying content against its key on every read.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod store;
pub mod tree;

pub use codec::{TREE_FORMAT_VERSION, TREE_MAGIC};
pub use error::{BlobStoreError, DecodeError};
pub use store::BlobStore;
pub use tree::{FileType, Tree, TreeEntry};
