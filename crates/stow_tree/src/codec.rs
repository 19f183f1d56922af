//! Canonical binary encoding of [`Tree`] values.
//!
//! Layout:
//!
//! ```text
//! magic "STRE" | version u8 | count varint
//! count × ( path_len varint | path utf-8 | tag u8 | hash [u8; 32] | size varint )
//! ```
//!
//! Entries appear in sorted path order and varints are minimal unsigned
//! LEB128, so each logical tree has exactly one encoding. The decoder
//! enforces both properties.

use stow_common::{BlobKey, ContentHash, SafeRelPath, HASH_LEN};

use crate::error::DecodeError;
use crate::tree::{FileType, Tree, TreeEntry};

/// Magic bytes identifying an encoded tree.
pub const TREE_MAGIC: [u8; 4] = *b"STRE";

/// Current tree format version. Increment on any change to the layout.
pub const TREE_FORMAT_VERSION: u8 = 1;

/// Longest possible LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

impl Tree {
    /// Serializes the tree into its canonical byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.len() * (HASH_LEN + 24));
        out.extend_from_slice(&TREE_MAGIC);
        out.push(TREE_FORMAT_VERSION);
        write_varint(&mut out, self.len() as u64);
        for (path, entry) in self {
            let rendered = path.render();
            write_varint(&mut out, rendered.len() as u64);
            out.extend_from_slice(rendered.as_bytes());
            out.push(entry.file_type.tag());
            out.extend_from_slice(entry.key.hash.as_bytes());
            write_varint(&mut out, entry.key.size);
        }
        out
    }

    /// Parses a canonical tree encoding.
    ///
    /// Rejects anything [`Tree::encode`] could not have produced: wrong
    /// magic or version, truncation, unknown tags, duplicate or unsorted
    /// paths, non-minimal varints, and trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Tree, DecodeError> {
        let mut reader = Reader::new(bytes);

        let magic = reader.take(TREE_MAGIC.len())?;
        if magic != TREE_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = reader.byte()?;
        if version != TREE_FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                expected: TREE_FORMAT_VERSION,
                found: version,
            });
        }

        let count = reader.varint()?;
        let mut tree = Tree::new();
        let mut previous: Option<SafeRelPath> = None;

        for _ in 0..count {
            let entry_offset = reader.pos;
            let path = reader.path()?;

            if let Some(prev) = &previous {
                if path == *prev {
                    return Err(DecodeError::DuplicateKey {
                        offset: entry_offset,
                        path: path.render(),
                    });
                }
                if path < *prev {
                    return Err(DecodeError::Unsorted {
                        offset: entry_offset,
                        path: path.render(),
                    });
                }
            }

            let tag_offset = reader.pos;
            let tag = reader.byte()?;
            let file_type = FileType::from_tag(tag).ok_or(DecodeError::UnknownFileType {
                offset: tag_offset,
                tag,
            })?;

            let mut digest = [0u8; HASH_LEN];
            digest.copy_from_slice(reader.take(HASH_LEN)?);
            let size = reader.varint()?;

            let key = BlobKey {
                hash: ContentHash::from_digest_bytes(digest),
                size,
            };
            tree.insert(path.clone(), TreeEntry { key, file_type });
            previous = Some(path);
        }

        let remaining = bytes.len() - reader.pos;
        if remaining != 0 {
            return Err(DecodeError::TrailingBytes {
                offset: reader.pos,
                count: remaining,
            });
        }
        Ok(tree)
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Bounds-checked cursor over the encoded bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.byte()?;
            let payload = u64::from(byte & 0x7f);
            // The tenth byte may only contribute the top bit of a u64.
            if i == MAX_VARINT_LEN - 1 && payload > 1 {
                return Err(DecodeError::BadVarint { offset: start });
            }
            value |= payload << (7 * i);
            if byte & 0x80 == 0 {
                if byte == 0 && i > 0 {
                    return Err(DecodeError::BadVarint { offset: start });
                }
                return Ok(value);
            }
        }
        Err(DecodeError::BadVarint { offset: start })
    }

    fn path(&mut self) -> Result<SafeRelPath, DecodeError> {
        let len_offset = self.pos;
        let len = usize::try_from(self.varint()?)
            .map_err(|_| DecodeError::Truncated { offset: len_offset })?;
        let offset = self.pos;
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|e| DecodeError::BadPath {
            offset,
            reason: e.to_string(),
        })?;
        let path = SafeRelPath::parse(text).ok_or_else(|| DecodeError::BadPath {
            offset,
            reason: format!("'{}' is not a safe relative path", text.escape_debug()),
        })?;
        if path.render() != text {
            return Err(DecodeError::BadPath {
                offset,
                reason: format!("'{}' is not in canonical form", text.escape_debug()),
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> SafeRelPath {
        SafeRelPath::parse(s).unwrap()
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        tree.insert(path("README.md"), TreeEntry::normal(BlobKey::of(b"readme")));
        tree.insert(path("bin/setup"), TreeEntry::executable(BlobKey::of(b"#!/bin/sh")));
        tree.insert(path("src/Lib.hs"), TreeEntry::normal(BlobKey::of(b"module Lib")));
        tree
    }

    /// Hand-builds an encoding from raw entries, bypassing `Tree`'s sorting.
    fn raw_encoding(entries: &[(&str, u8, BlobKey)]) -> Vec<u8> {
        let mut out = TREE_MAGIC.to_vec();
        out.push(TREE_FORMAT_VERSION);
        write_varint(&mut out, entries.len() as u64);
        for (p, tag, key) in entries {
            write_varint(&mut out, p.len() as u64);
            out.extend_from_slice(p.as_bytes());
            out.push(*tag);
            out.extend_from_slice(key.hash.as_bytes());
            write_varint(&mut out, key.size);
        }
        out
    }

    #[test]
    fn roundtrip_sample() {
        let tree = sample_tree();
        assert_eq!(Tree::decode(&tree.encode()), Ok(tree));
    }

    #[test]
    fn roundtrip_empty() {
        let tree = Tree::new();
        let bytes = tree.encode();
        assert_eq!(bytes, [b'S', b'T', b'R', b'E', 1, 0]);
        assert_eq!(Tree::decode(&bytes), Ok(tree));
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(sample_tree().encode(), sample_tree().encode());
    }

    #[test]
    fn varint_encoding() {
        let mut out = Vec::new();
        write_varint(&mut out, 300);
        assert_eq!(out, [0xac, 0x02]);
        let mut reader = Reader::new(&out);
        assert_eq!(reader.varint(), Ok(300));
    }

    #[test]
    fn varint_max_value() {
        let mut out = Vec::new();
        write_varint(&mut out, u64::MAX);
        assert_eq!(out.len(), MAX_VARINT_LEN);
        assert_eq!(Reader::new(&out).varint(), Ok(u64::MAX));
    }

    #[test]
    fn rejects_non_minimal_varint() {
        // 0x80 0x00 encodes zero in two bytes.
        assert_eq!(
            Reader::new(&[0x80, 0x00]).varint(),
            Err(DecodeError::BadVarint { offset: 0 })
        );
    }

    #[test]
    fn rejects_overlong_varint() {
        let bytes = [0xff; 11];
        assert!(matches!(
            Reader::new(&bytes).varint(),
            Err(DecodeError::BadVarint { .. })
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_tree().encode();
        bytes[0] = b'X';
        assert_eq!(Tree::decode(&bytes), Err(DecodeError::BadMagic));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = sample_tree().encode();
        bytes[4] = 9;
        assert_eq!(
            Tree::decode(&bytes),
            Err(DecodeError::UnsupportedVersion {
                expected: TREE_FORMAT_VERSION,
                found: 9
            })
        );
    }

    #[test]
    fn rejects_every_truncation() {
        let bytes = sample_tree().encode();
        for len in 0..bytes.len() {
            assert!(
                Tree::decode(&bytes[..len]).is_err(),
                "prefix of length {len} should not decode"
            );
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample_tree().encode();
        let end = bytes.len();
        bytes.extend_from_slice(b"junk");
        assert_eq!(
            Tree::decode(&bytes),
            Err(DecodeError::TrailingBytes {
                offset: end,
                count: 4
            })
        );
    }

    #[test]
    fn rejects_unknown_file_type() {
        let key = BlobKey::of(b"a");
        let bytes = raw_encoding(&[("a", b'L', key)]);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(DecodeError::UnknownFileType { tag: b'L', .. })
        ));
    }

    #[test]
    fn rejects_duplicate_key() {
        let key = BlobKey::of(b"a");
        let bytes = raw_encoding(&[("a", b'N', key), ("a", b'X', key)]);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(DecodeError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn rejects_unsorted_entries() {
        let key = BlobKey::of(b"a");
        let bytes = raw_encoding(&[("b", b'N', key), ("a", b'N', key)]);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(DecodeError::Unsorted { .. })
        ));
    }

    #[test]
    fn rejects_unsafe_and_non_canonical_paths() {
        let key = BlobKey::of(b"a");
        for bad in ["../etc", "/abs", "./a", "a//b"] {
            let bytes = raw_encoding(&[(bad, b'N', key)]);
            assert!(
                matches!(Tree::decode(&bytes), Err(DecodeError::BadPath { .. })),
                "path {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_invalid_utf8_path() {
        let key = BlobKey::of(b"a");
        let mut bytes = TREE_MAGIC.to_vec();
        bytes.push(TREE_FORMAT_VERSION);
        bytes.push(1);
        bytes.push(2);
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.push(b'N');
        bytes.extend_from_slice(key.hash.as_bytes());
        bytes.push(1);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(DecodeError::BadPath { .. })
        ));
    }

    #[test]
    fn huge_declared_count_is_truncation_not_allocation() {
        let mut bytes = TREE_MAGIC.to_vec();
        bytes.push(TREE_FORMAT_VERSION);
        write_varint(&mut bytes, u64::MAX);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn tree_key_changes_with_content() {
        let mut tree = sample_tree();
        let before = tree.key();
        tree.insert(path("extra"), TreeEntry::normal(BlobKey::of(b"extra")));
        assert_ne!(before, tree.key());
    }
}
