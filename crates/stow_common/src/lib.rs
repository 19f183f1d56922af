//! Foundational content-addressing types shared across the stow workspace.
//!
//! This crate provides the SHA-256 [`ContentHash`], the [`BlobKey`] addressing
//! unit (hash plus size), and [`SafeRelPath`], the validated relative path used
//! as a key inside content-addressed trees.

#![warn(missing_docs)]

pub mod blob_key;
pub mod hash;
pub mod rel_path;

pub use blob_key::BlobKey;
pub use hash::{ContentHash, HASH_LEN};
pub use rel_path::SafeRelPath;
