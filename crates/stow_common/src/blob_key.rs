//! Blob addressing: content hash plus exact byte length.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::ContentHash;

/// The address of a stored blob.
///
/// `size` is always the exact length of the bytes that hash to `hash`.
/// Carrying the size lets readers reject truncated or padded content before
/// hashing it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct BlobKey {
    /// SHA-256 of the blob content.
    pub hash: ContentHash,
    /// Length of the blob content in bytes.
    pub size: u64,
}

impl BlobKey {
    /// Computes the key of a byte slice.
    pub fn of(data: &[u8]) -> Self {
        Self {
            hash: ContentHash::of(data),
            size: data.len() as u64,
        }
    }

    /// Returns `true` if `data` is exactly the blob this key addresses.
    ///
    /// The size is compared first so that mismatched lengths never pay for
    /// a hash.
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.size && ContentHash::of(data) == self.hash
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.hash, self.size)
    }
}
