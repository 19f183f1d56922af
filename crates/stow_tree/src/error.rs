//! Error types for tree decoding and blob storage.

use std::path::PathBuf;

/// Reasons a byte sequence is not a valid encoded tree.
///
/// Every variant carries the byte offset at which decoding stopped, so
/// integrity tooling can report where an encoding went wrong.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input does not start with the tree magic bytes.
    #[error("not a tree encoding: bad magic bytes")]
    BadMagic,

    /// The format version is not one this decoder understands.
    #[error("unsupported tree format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// The version this decoder implements.
        expected: u8,
        /// The version found in the input.
        found: u8,
    },

    /// The input ended in the middle of a field.
    #[error("tree encoding truncated at byte {offset}")]
    Truncated {
        /// Offset of the incomplete field.
        offset: usize,
    },

    /// A length or size varint was too long or not minimally encoded.
    #[error("malformed varint at byte {offset}")]
    BadVarint {
        /// Offset of the first byte of the varint.
        offset: usize,
    },

    /// A path was not valid UTF-8 or did not parse as a safe relative path.
    #[error("invalid entry path at byte {offset}: {reason}")]
    BadPath {
        /// Offset of the path bytes.
        offset: usize,
        /// Description of the problem.
        reason: String,
    },

    /// A file-type tag byte was not recognized.
    #[error("unknown file type tag 0x{tag:02x} at byte {offset}")]
    UnknownFileType {
        /// Offset of the tag byte.
        offset: usize,
        /// The unrecognized tag.
        tag: u8,
    },

    /// The same path appeared twice.
    #[error("duplicate entry '{path}' at byte {offset}")]
    DuplicateKey {
        /// Offset of the duplicate entry.
        offset: usize,
        /// The repeated path.
        path: String,
    },

    /// Entries were not in canonical order.
    #[error("entry '{path}' at byte {offset} is out of canonical order")]
    Unsorted {
        /// Offset of the misplaced entry.
        offset: usize,
        /// The misplaced path.
        path: String,
    },

    /// Bytes remained after the last declared entry.
    #[error("{count} trailing bytes after tree at byte {offset}")]
    TrailingBytes {
        /// Offset of the first trailing byte.
        offset: usize,
        /// Number of trailing bytes.
        count: usize,
    },
}

/// Errors that can occur while writing to the blob store.
///
/// Reads are fail-safe and never produce this error: a missing or corrupt
/// blob is reported as an absent value.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// An I/O error occurred while writing a blob.
    #[error("blob store I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
